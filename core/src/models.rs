use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, VariantNames};

// --- Enumerations ---

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
    Other,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    VeryActive,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GoalType {
    LoseWeight,
    GainWeight,
    Maintain,
    MuscleGain,
    HealthManagement,
}

impl GoalType {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::LoseWeight => "Lose Weight",
            Self::GainWeight => "Gain Weight",
            Self::Maintain => "Maintain Weight",
            Self::MuscleGain => "Muscle Gain",
            Self::HealthManagement => "Health Management",
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DietaryType {
    #[default]
    None,
    Vegetarian,
    Vegan,
    Keto,
    Paleo,
    Mediterranean,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Mild,
    #[default]
    Moderate,
    Severe,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    // Models tend to echo the "snacks" wording from the distribution rule.
    #[serde(alias = "snacks")]
    #[strum(serialize = "snack", serialize = "snacks", to_string = "snack")]
    Snack,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
    VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IngredientCategory {
    Protein,
    Carbs,
    Vegetables,
    Fruits,
    Dairy,
    Fats,
    Grains,
    Nuts,
    Other,
}

/// Parse a snake_case enum value, producing a message that lists the valid choices.
pub fn parse_choice<T>(field: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr + VariantNames,
{
    match value.parse::<T>() {
        Ok(v) => Ok(v),
        Err(_) => bail!(
            "Invalid {field} '{value}'. Must be one of: {}",
            T::VARIANTS.join(", ")
        ),
    }
}

// --- Accounts ---

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip)]
    pub is_active: bool,
    pub created_at: String,
}

/// A user row together with its stored password hash, used only for login.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
}

// --- Profiles ---

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub user: i64,
    pub email: String,
    pub age: i64,
    pub weight: f64,
    pub height: f64,
    pub sex: Sex,
    pub activity_level: ActivityLevel,
    pub bmi: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Body mass index from kilograms and centimetres.
#[must_use]
pub fn bmi(weight_kg: f64, height_cm: f64) -> f64 {
    let height_m = height_cm / 100.0;
    weight_kg / (height_m * height_m)
}

#[derive(Debug, Clone)]
pub struct NewProfile {
    pub age: i64,
    pub weight: f64,
    pub height: f64,
    pub sex: Sex,
    pub activity_level: ActivityLevel,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfile {
    pub age: Option<i64>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub sex: Option<Sex>,
    pub activity_level: Option<ActivityLevel>,
}

// --- Medical conditions ---

#[derive(Debug, Clone, Serialize)]
pub struct MedicalCondition {
    pub id: i64,
    pub user: i64,
    pub condition_name: String,
    pub severity: Severity,
    pub notes: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewMedicalCondition {
    pub condition_name: String,
    pub severity: Severity,
    pub notes: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateMedicalCondition {
    pub condition_name: Option<String>,
    pub severity: Option<Severity>,
    pub notes: Option<String>,
}

// --- Preferences ---

#[derive(Debug, Clone, Serialize)]
pub struct Preferences {
    pub user: i64,
    pub dietary_type: DietaryType,
    pub allergies: Vec<String>,
    pub disliked_foods: Vec<String>,
    pub preferred_cuisines: Vec<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePreferences {
    pub dietary_type: Option<DietaryType>,
    pub allergies: Option<Vec<String>>,
    pub disliked_foods: Option<Vec<String>>,
    pub preferred_cuisines: Option<Vec<String>>,
}

// --- Diet goals ---

#[derive(Debug, Clone, Serialize)]
pub struct DietGoal {
    pub id: i64,
    pub user: i64,
    pub goal_type: GoalType,
    pub goal_type_display: &'static str,
    pub target_weight: Option<f64>,
    pub target_date: Option<String>,
    pub calorie_target: i64,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewDietGoal {
    pub goal_type: GoalType,
    pub target_weight: Option<f64>,
    pub target_date: Option<chrono::NaiveDate>,
    pub calorie_target: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdateDietGoal {
    pub goal_type: Option<GoalType>,
    pub target_weight: Option<Option<f64>>,
    pub target_date: Option<Option<chrono::NaiveDate>>,
    pub calorie_target: Option<i64>,
    pub is_active: Option<bool>,
}

// --- Ingredients ---

#[derive(Debug, Clone, Serialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub category: IngredientCategory,
    pub calories_per_100g: f64,
    pub protein_per_100g: f64,
    pub carbs_per_100g: f64,
    pub fat_per_100g: f64,
    pub fiber_per_100g: f64,
    pub image_url: String,
    pub is_vegetarian: bool,
    pub is_vegan: bool,
    pub common_allergens: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewIngredient {
    pub name: String,
    pub category: IngredientCategory,
    pub calories_per_100g: f64,
    pub protein_per_100g: f64,
    pub carbs_per_100g: f64,
    pub fat_per_100g: f64,
    pub fiber_per_100g: f64,
    pub image_url: String,
    pub is_vegetarian: bool,
    pub is_vegan: bool,
    pub common_allergens: Vec<String>,
}

/// Validate catalog data: name must not be empty, macros must not be negative.
pub fn validate_ingredient(ingredient: &NewIngredient) -> Result<()> {
    if ingredient.name.trim().is_empty() {
        bail!("Ingredient name must not be empty");
    }
    let macros = [
        ("calories_per_100g", ingredient.calories_per_100g),
        ("protein_per_100g", ingredient.protein_per_100g),
        ("carbs_per_100g", ingredient.carbs_per_100g),
        ("fat_per_100g", ingredient.fat_per_100g),
        ("fiber_per_100g", ingredient.fiber_per_100g),
    ];
    for (field, value) in macros {
        if value < 0.0 {
            bail!("{field} must not be negative");
        }
    }
    Ok(())
}

// --- Diet plans ---

/// Daily calorie and macro targets, in kcal and grams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutritionTargets {
    pub calories: i64,
    pub protein: i64,
    pub carbs: i64,
    pub fat: i64,
}

impl NutritionTargets {
    /// Targets stored on plans created without the AI pipeline.
    pub const PLACEHOLDER: Self = Self {
        calories: 2000,
        protein: 150,
        carbs: 200,
        fat: 65,
    };
}

#[derive(Debug, Clone, Serialize)]
pub struct DietPlan {
    pub id: i64,
    pub user: i64,
    pub goal: Option<i64>,
    pub plan_name: String,
    pub ai_description: String,
    pub total_calories: i64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub is_favorite: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DietPlanDetail {
    #[serde(flatten)]
    pub plan: DietPlan,
    pub items: Vec<DietPlanItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DietPlanItem {
    pub id: i64,
    pub ingredient: Ingredient,
    pub quantity_grams: f64,
    pub meal_type: MealType,
    pub ai_description: String,
    pub preparation_notes: String,
    pub order_index: i64,
    // Derived from the ingredient's per-100g values on every read
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

#[derive(Debug, Clone)]
pub struct NewDietPlan {
    pub goal: Option<i64>,
    pub plan_name: String,
    pub ai_description: String,
    pub targets: NutritionTargets,
}

#[derive(Debug, Clone)]
pub struct NewDietPlanItem {
    pub ingredient_id: i64,
    pub quantity_grams: f64,
    pub meal_type: MealType,
    pub ai_description: String,
    pub order_index: i64,
}

#[derive(Debug, Clone, Default)]
#[allow(clippy::option_option)]
pub struct UpdateDietPlan {
    pub goal: Option<Option<i64>>,
    pub plan_name: Option<String>,
    pub ai_description: Option<String>,
    pub is_favorite: Option<bool>,
}

/// Scale a per-100g nutrient value to a quantity in grams.
#[must_use]
pub fn scale_per_100g(per_100g: f64, quantity_grams: f64) -> f64 {
    per_100g * quantity_grams / 100.0
}
