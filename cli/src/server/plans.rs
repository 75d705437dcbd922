use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use validator::Validate;

use super::{ApiError, AppState, AuthUser, bad_request, deserialize_some};
use nutrifit_core::error::PipelineError;
use nutrifit_core::models::{
    DietPlan, DietPlanDetail, Ingredient, IngredientCategory, NewDietPlan, NutritionTargets,
    UpdateDietPlan, parse_choice,
};

#[derive(Deserialize)]
pub(super) struct IngredientQuery {
    search: Option<String>,
    category: Option<String>,
}

#[derive(Deserialize, Validate)]
#[allow(clippy::option_option)]
pub(super) struct UpdatePlanRequest {
    #[serde(default, deserialize_with = "deserialize_some")]
    goal: Option<Option<i64>>,
    #[validate(length(min = 1, max = 200, message = "Plan name must be 1-200 characters"))]
    plan_name: Option<String>,
    ai_description: Option<String>,
    is_favorite: Option<bool>,
}

#[derive(Deserialize, Validate)]
pub(super) struct GenerateRequest {
    #[validate(length(min = 1, max = 200, message = "Plan name must be 1-200 characters"))]
    plan_name: Option<String>,
    ai_description: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct NaturalLanguageRequest {
    #[serde(default)]
    input: String,
}

// --- Ingredients ---

pub(super) async fn list_ingredients(
    State(state): State<AppState>,
    Query(query): Query<IngredientQuery>,
) -> Result<Json<Vec<Ingredient>>, ApiError> {
    let category = query
        .category
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(|c| parse_choice::<IngredientCategory>("category", c))
        .transpose()
        .map_err(bad_request)?;
    let ingredients = state
        .db()
        .list_ingredients(query.search.as_deref(), category)?;
    Ok(Json(ingredients))
}

pub(super) async fn get_ingredient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Ingredient>, ApiError> {
    state
        .db()
        .get_ingredient(id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Ingredient {id} not found")))
}

// --- Diet plans ---

fn plan_not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Diet plan {id} not found"))
}

pub(super) async fn list_plans(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<Vec<DietPlan>>, ApiError> {
    Ok(Json(state.db().list_plans(user_id)?))
}

pub(super) async fn get_plan(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<DietPlanDetail>, ApiError> {
    state
        .db()
        .get_plan(user_id, id)?
        .map(Json)
        .ok_or_else(|| plan_not_found(id))
}

/// Serves both PUT and PATCH; the AI-authored items and totals are read-only.
pub(super) async fn update_plan(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePlanRequest>,
) -> Result<Json<DietPlanDetail>, ApiError> {
    req.validate()?;

    let db = state.db();
    if let Some(Some(goal_id)) = req.goal {
        if db.get_goal(user_id, goal_id)?.is_none() {
            return Err(ApiError::BadRequest(format!(
                "Diet goal {goal_id} not found"
            )));
        }
    }
    let update = UpdateDietPlan {
        goal: req.goal,
        plan_name: req.plan_name,
        ai_description: req.ai_description,
        is_favorite: req.is_favorite,
    };
    db.update_plan(user_id, id, &update)?
        .map(Json)
        .ok_or_else(|| plan_not_found(id))
}

pub(super) async fn delete_plan(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.db().delete_plan(user_id, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(plan_not_found(id))
    }
}

/// Store an empty plan with fixed placeholder targets. No model call.
pub(super) async fn generate_plan(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<DietPlanDetail>), ApiError> {
    req.validate()?;
    let plan = NewDietPlan {
        goal: None,
        plan_name: req.plan_name.unwrap_or_else(|| "My Diet Plan".to_string()),
        ai_description: req.ai_description.unwrap_or_default(),
        targets: NutritionTargets::PLACEHOLDER,
    };
    let detail = state.db().insert_plan(user_id, &plan)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub(super) async fn generate_from_nl(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<NaturalLanguageRequest>,
) -> Result<(StatusCode, Json<DietPlanDetail>), ApiError> {
    let detail = state
        .planner
        .generate_from_text(user_id, &req.input)
        .await?;
    tracing::info!(user_id, plan_id = detail.plan.id, "diet plan generated");
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Replies `{success, data}` on success and `{success: false, error}` with
/// 400 on any pipeline failure.
pub(super) async fn parse_natural_language(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<NaturalLanguageRequest>,
) -> Result<Response, ApiError> {
    match state.planner.parse_intake(user_id, &req.input).await {
        Ok(data) => Ok(Json(serde_json::json!({
            "success": true,
            "data": data,
        }))
        .into_response()),
        Err(PipelineError::Internal(err)) => Err(ApiError::Internal(err)),
        Err(err) => {
            tracing::warn!(user_id, error = %err, "intake parsing failed");
            Ok((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "success": false,
                    "error": err.to_string(),
                })),
            )
                .into_response())
        }
    }
}
