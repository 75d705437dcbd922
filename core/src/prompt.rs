//! Prompt templates for the text generation model.

use std::fmt::Write as _;
use std::io;

use serde::Serialize;
use serde_json::{Value, json};

use crate::models::{Ingredient, NutritionTargets, Profile};
use crate::nutrition::BodyMetrics;

/// A medical condition as the model sees it, and as it reports extracted ones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionSummary {
    pub name: String,
    pub severity: String,
}

const DEFAULT_SEVERITY: &str = "moderate";

impl ConditionSummary {
    /// Read one extracted condition: an object with a `name` and an optional
    /// `severity`, or a bare name. Entries without a usable name are dropped.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let (name, severity) = match value {
            Value::Object(_) => (
                scalar_string(value.get("name"))?,
                scalar_string(value.get("severity")),
            ),
            other => (scalar_string(Some(other))?, None),
        };
        Some(Self {
            name,
            severity: severity.unwrap_or_else(|| DEFAULT_SEVERITY.to_string()),
        })
    }
}

/// A JSON scalar as text. Nulls, blanks and containers count as absent.
#[must_use]
pub fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `json.dumps` layout: `", "` between items and `": "` after keys.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn spaced_json<T: Serialize + ?Sized>(value: &T) -> String {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    if value.serialize(&mut ser).is_err() {
        return String::new();
    }
    String::from_utf8(out).unwrap_or_default()
}

/// Fully resolved inputs for one plan generation.
///
/// Categorical fields stay as free text because they may come straight from
/// model output; the calculator applies its own fallbacks to unknown values.
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    pub age: f64,
    pub weight_kg: f64,
    pub height_cm: f64,
    pub sex: Option<String>,
    pub activity_level: Option<String>,
    pub goal_type: Option<String>,
    pub medical_conditions: Vec<ConditionSummary>,
    pub dietary_type: Option<String>,
    pub allergies: Vec<String>,
}

impl PlanContext {
    #[must_use]
    pub fn metrics(&self) -> BodyMetrics {
        BodyMetrics {
            age: self.age,
            weight_kg: self.weight_kg,
            height_cm: self.height_cm,
            sex: self.sex.as_deref().and_then(|s| s.parse().ok()),
            activity_level: self.activity_level.as_deref().and_then(|s| s.parse().ok()),
            goal: self.goal_type.as_deref().and_then(|s| s.parse().ok()),
        }
    }
}

fn or_unspecified(value: Option<&str>) -> &str {
    value.unwrap_or("not specified")
}

/// Render the meal plan instruction.
#[must_use]
pub fn build_plan_prompt(
    context: &PlanContext,
    targets: &NutritionTargets,
    ingredients: &[Ingredient],
) -> String {
    let ingredient_list: Vec<serde_json::Value> = ingredients
        .iter()
        .map(|ing| {
            json!({
                "id": ing.id,
                "name": ing.name,
                "category": ing.category,
                "calories_per_100g": ing.calories_per_100g,
                "protein_per_100g": ing.protein_per_100g,
                "carbs_per_100g": ing.carbs_per_100g,
                "fat_per_100g": ing.fat_per_100g,
            })
        })
        .collect();
    let conditions = spaced_json(&context.medical_conditions);
    let allergies = spaced_json(&context.allergies);
    let ingredient_list = serde_json::Value::Array(ingredient_list);

    format!(
        r#"You are a professional nutritionist AI. Create a personalized daily meal plan.

User Profile:
- Age: {age}
- Weight: {weight} kg
- Height: {height} cm
- Sex: {sex}
- Activity Level: {activity}
- Goal: {goal}
- Medical Conditions: {conditions}
- Dietary Type: {dietary}
- Allergies: {allergies}

Nutritional Targets:
- Calories: {calories} kcal
- Protein: {protein}g
- Carbs: {carbs}g
- Fat: {fat}g

Available Ingredients (first 100):
{ingredient_list:#}

Create a meal plan with breakfast, lunch, dinner, and 1-2 snacks. Return ONLY a JSON object:
{{
    "plan_name": "<creative plan name>",
    "description": "<personalized description explaining why this plan suits the user>",
    "meals": [
        {{
            "meal_type": "breakfast",
            "ingredient_id": <id from list>,
            "quantity_grams": <amount in grams>,
            "description": "<why this food is good for this meal>",
            "order_index": 0
        }},
        ...
    ]
}}

Rules:
1. Use ONLY ingredient IDs from the provided list
2. Total calories should be within 50 kcal of target
3. Distribute meals appropriately (breakfast 25%, lunch 35%, dinner 30%, snacks 10%)
4. Consider medical conditions (e.g., low sodium for hypertension, low sugar for diabetes)
5. Ensure variety in ingredients
6. Return ONLY valid JSON
"#,
        age = context.age,
        weight = context.weight_kg,
        height = context.height_cm,
        sex = or_unspecified(context.sex.as_deref()),
        activity = or_unspecified(context.activity_level.as_deref()),
        goal = or_unspecified(context.goal_type.as_deref()),
        dietary = context.dietary_type.as_deref().unwrap_or("none"),
        calories = targets.calories,
        protein = targets.protein,
        carbs = targets.carbs,
        fat = targets.fat,
    )
}

/// Render the instruction that extracts structured fields from free text.
/// A stored profile, when present, is shown to the model as context only.
#[must_use]
pub fn build_intake_prompt(input: &str, profile: Option<&Profile>) -> String {
    let profile_context = match profile {
        Some(p) => {
            let mut out = String::from("Current user profile:\n");
            let _ = writeln!(out, "- Age: {}", p.age);
            let _ = writeln!(out, "- Weight: {} kg", p.weight);
            let _ = writeln!(out, "- Height: {} cm", p.height);
            let _ = writeln!(out, "- Sex: {}", p.sex);
            let _ = writeln!(out, "- Activity Level: {}", p.activity_level);
            out
        }
        None => "No existing profile found.".to_string(),
    };

    format!(
        r#"You are a nutrition AI assistant. Parse the following user input and extract structured information.

{profile_context}

User Input: "{input}"

Extract and return ONLY a JSON object with the following structure (use null for missing values):
{{
    "age": <number or null>,
    "weight": <number in kg or null>,
    "height": <number in cm or null>,
    "sex": "<male/female/other or null>",
    "activityLevel": "<sedentary/light/moderate/active/very_active or null>",
    "goalType": "<lose_weight/gain_weight/maintain/muscle_gain/health_management>",
    "medicalConditions": [
        {{"name": "<condition name>", "severity": "moderate"}}
    ],
    "preferences": {{
        "dietaryType": "<vegetarian/vegan/keto/paleo/mediterranean/none or null>",
        "allergies": ["<allergy1>", "<allergy2>"]
    }}
}}

Rules:
1. Only include fields that are explicitly mentioned in the user input
2. For goalType, infer from phrases like "lose weight", "gain muscle", "maintain", etc.
3. For activityLevel, infer from phrases like "sedentary", "exercise 5 times a week", etc.
4. Extract any medical conditions mentioned
5. Extract dietary preferences (vegetarian, vegan, etc.) and allergies
6. Return ONLY valid JSON, no additional text
"#
    )
}
