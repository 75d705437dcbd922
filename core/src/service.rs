use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::{GeneratorHandle, parse_json_response};
use crate::catalog::filter_ingredients;
use crate::db::Database;
use crate::error::PipelineError;
use crate::models::{DietPlanDetail, Ingredient, MealType, NewDietPlan, NewDietPlanItem};
use crate::nutrition::calculate_targets;
use crate::prompt::{
    ConditionSummary, PlanContext, build_intake_prompt, build_plan_prompt, scalar_string,
};

/// Fields extracted from free-text intake. Every field is optional and none
/// is validated; missing ones are filled from stored data when planning.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeParams {
    pub age: Option<f64>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub sex: Option<String>,
    pub activity_level: Option<String>,
    pub goal_type: Option<String>,
    pub medical_conditions: Option<Vec<ConditionSummary>>,
    pub preferences: Option<IntakePreferences>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakePreferences {
    pub dietary_type: Option<String>,
    pub allergies: Option<Vec<String>>,
}

impl IntakeParams {
    /// Read whatever the model extracted. Nulls and values of the wrong shape
    /// count as absent, and numbers sent as strings are accepted.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        Self {
            age: loose_number(value.get("age")),
            weight: loose_number(value.get("weight")),
            height: loose_number(value.get("height")),
            sex: scalar_string(value.get("sex")),
            activity_level: scalar_string(value.get("activityLevel")),
            goal_type: scalar_string(value.get("goalType")),
            medical_conditions: value
                .get("medicalConditions")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(ConditionSummary::from_value).collect()),
            preferences: value
                .get("preferences")
                .filter(|p| p.is_object())
                .map(IntakePreferences::from_value),
        }
    }
}

impl IntakePreferences {
    fn from_value(value: &Value) -> Self {
        let allergies = match value.get("allergies") {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|item| scalar_string(Some(item)))
                    .collect(),
            ),
            other => scalar_string(other).map(|single| vec![single]),
        };
        Self {
            dietary_type: scalar_string(value.get("dietaryType")),
            allergies,
        }
    }
}

fn loose_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct PlanReply {
    plan_name: String,
    #[serde(default)]
    description: String,
    meals: Vec<MealReply>,
}

#[derive(Debug, Deserialize)]
struct MealReply {
    meal_type: MealType,
    ingredient_id: i64,
    quantity_grams: f64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    order_index: i64,
}

/// Everything read from storage before the model is called.
struct ResolvedRequest {
    context: PlanContext,
    goal_id: Option<i64>,
    catalog: Vec<Ingredient>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Runs the diet plan pipeline: context resolution, target calculation,
/// ingredient filtering, prompting, reply parsing and storage.
pub struct DietPlanner {
    db: Arc<Mutex<Database>>,
    generator: Arc<GeneratorHandle>,
}

impl DietPlanner {
    pub fn new(db: Arc<Mutex<Database>>, generator: Arc<GeneratorHandle>) -> Self {
        Self { db, generator }
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the model to extract structured fields from `input`. The reply's
    /// JSON object is returned as-is; see [`IntakeParams::from_value`].
    pub async fn parse_intake(&self, user_id: i64, input: &str) -> Result<Value, PipelineError> {
        if input.trim().is_empty() {
            return Err(PipelineError::Validation("Input text is required".into()));
        }
        let profile = self.db().get_profile(user_id)?;
        let prompt = build_intake_prompt(input, profile.as_ref());

        let generator = self.generator.get()?;
        let reply = generator.generate(&prompt).await?;
        let intake: Value = parse_json_response(&reply)?;
        tracing::debug!(user_id, %intake, "intake parsed");
        Ok(intake)
    }

    /// Build and store a plan for the user from explicit parameters, falling
    /// back to stored profile, conditions, preferences and active goal.
    pub async fn generate_plan(
        &self,
        user_id: i64,
        params: IntakeParams,
    ) -> Result<DietPlanDetail, PipelineError> {
        let ResolvedRequest {
            context,
            goal_id,
            catalog,
        } = self.resolve(user_id, params)?;

        let targets = calculate_targets(&context.metrics()).targets;
        let dietary_type = context.dietary_type.as_deref().and_then(|s| s.parse().ok());
        let ingredients = filter_ingredients(&catalog, dietary_type, &context.allergies);
        tracing::info!(
            user_id,
            calories = targets.calories,
            ingredients = ingredients.len(),
            "requesting meal plan"
        );
        let prompt = build_plan_prompt(&context, &targets, &ingredients);

        let generator = self.generator.get()?;
        let reply = generator.generate(&prompt).await?;
        let reply: PlanReply = parse_json_response(&reply)?;

        let plan = NewDietPlan {
            goal: goal_id,
            plan_name: reply.plan_name,
            ai_description: reply.description,
            targets,
        };
        let items: Vec<NewDietPlanItem> = reply
            .meals
            .into_iter()
            .map(|meal| NewDietPlanItem {
                ingredient_id: meal.ingredient_id,
                quantity_grams: meal.quantity_grams,
                meal_type: meal.meal_type,
                ai_description: meal.description,
                order_index: meal.order_index,
            })
            .collect();

        self.db().create_plan_with_items(user_id, &plan, &items)
    }

    /// Extract parameters from free text, then generate a plan from them.
    pub async fn generate_from_text(
        &self,
        user_id: i64,
        input: &str,
    ) -> Result<DietPlanDetail, PipelineError> {
        let intake = self.parse_intake(user_id, input).await?;
        self.generate_plan(user_id, IntakeParams::from_value(&intake)).await
    }

    #[allow(clippy::cast_precision_loss)]
    fn resolve(&self, user_id: i64, params: IntakeParams) -> Result<ResolvedRequest, PipelineError> {
        let db = self.db();
        let profile = db.get_profile(user_id)?;
        let active_goal = db.get_active_goal(user_id)?;
        let preferences = db.get_preferences(user_id)?;

        let age = params.age.or(profile.as_ref().map(|p| p.age as f64));
        let weight = params.weight.or(profile.as_ref().map(|p| p.weight));
        let height = params.height.or(profile.as_ref().map(|p| p.height));
        let (Some(age), Some(weight_kg), Some(height_cm)) = (age, weight, height) else {
            let missing: Vec<&str> = [("age", age), ("weight", weight), ("height", height)]
                .into_iter()
                .filter(|(_, v)| v.is_none())
                .map(|(name, _)| name)
                .collect();
            return Err(PipelineError::Validation(format!(
                "Missing required fields: {}. Provide them or create a profile first.",
                missing.join(", ")
            )));
        };

        let sex = non_empty(params.sex).or_else(|| profile.as_ref().map(|p| p.sex.to_string()));
        let activity_level = non_empty(params.activity_level)
            .or_else(|| profile.as_ref().map(|p| p.activity_level.to_string()));
        let goal_type = non_empty(params.goal_type)
            .or_else(|| active_goal.as_ref().map(|g| g.goal_type.to_string()));

        let medical_conditions = match params.medical_conditions {
            Some(conditions) if !conditions.is_empty() => conditions,
            _ => db
                .list_conditions(user_id)?
                .into_iter()
                .map(|c| ConditionSummary {
                    name: c.condition_name,
                    severity: c.severity.to_string(),
                })
                .collect(),
        };

        let intake_prefs = params.preferences.unwrap_or_default();
        let dietary_type = non_empty(intake_prefs.dietary_type)
            .or_else(|| preferences.as_ref().map(|p| p.dietary_type.to_string()));
        let allergies = match intake_prefs.allergies {
            Some(allergies) if !allergies.is_empty() => allergies,
            _ => preferences.map(|p| p.allergies).unwrap_or_default(),
        };

        let goal_id = active_goal
            .filter(|g| goal_type.as_deref() == Some(g.goal_type.as_ref()))
            .map(|g| g.id);
        let catalog = db.all_ingredients()?;

        Ok(ResolvedRequest {
            context: PlanContext {
                age,
                weight_kg,
                height_cm,
                sex,
                activity_level,
                goal_type,
                medical_conditions,
                dietary_type,
                allergies,
            },
            goal_id,
            catalog,
        })
    }
}
