use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use super::{ApiError, AppState, AuthUser, bad_request, deserialize_some};
use nutrifit_core::models::{
    ActivityLevel, DietGoal, DietaryType, GoalType, MedicalCondition, NewDietGoal,
    NewMedicalCondition, NewProfile, Preferences, Profile, Severity, Sex, UpdateDietGoal,
    UpdateMedicalCondition, UpdatePreferences, UpdateProfile, parse_choice,
};

// --- Request types ---

#[derive(Deserialize, Validate)]
pub(super) struct ProfileRequest {
    #[validate(range(min = 1, max = 150, message = "Age must be between 1 and 150"))]
    age: i64,
    #[validate(range(
        exclusive_min = 0.0,
        exclusive_max = 1000.0,
        message = "Weight must be between 0 and 1000 kg"
    ))]
    weight: f64,
    #[validate(range(
        exclusive_min = 0.0,
        exclusive_max = 1000.0,
        message = "Height must be between 0 and 1000 cm"
    ))]
    height: f64,
    sex: String,
    activity_level: String,
}

impl ProfileRequest {
    fn into_new(self) -> Result<NewProfile, ApiError> {
        self.validate()?;
        Ok(NewProfile {
            age: self.age,
            weight: self.weight,
            height: self.height,
            sex: parse_choice::<Sex>("sex", &self.sex).map_err(bad_request)?,
            activity_level: parse_choice::<ActivityLevel>("activity_level", &self.activity_level)
                .map_err(bad_request)?,
        })
    }
}

#[derive(Deserialize, Validate)]
pub(super) struct ProfilePatch {
    #[validate(range(min = 1, max = 150, message = "Age must be between 1 and 150"))]
    age: Option<i64>,
    #[validate(range(
        exclusive_min = 0.0,
        exclusive_max = 1000.0,
        message = "Weight must be between 0 and 1000 kg"
    ))]
    weight: Option<f64>,
    #[validate(range(
        exclusive_min = 0.0,
        exclusive_max = 1000.0,
        message = "Height must be between 0 and 1000 cm"
    ))]
    height: Option<f64>,
    sex: Option<String>,
    activity_level: Option<String>,
}

#[derive(Deserialize, Validate)]
pub(super) struct ConditionRequest {
    #[validate(length(min = 1, max = 200, message = "Condition name must be 1-200 characters"))]
    condition_name: String,
    severity: Option<String>,
    #[serde(default)]
    notes: String,
}

#[derive(Deserialize, Validate)]
pub(super) struct ConditionPatch {
    #[validate(length(min = 1, max = 200, message = "Condition name must be 1-200 characters"))]
    condition_name: Option<String>,
    severity: Option<String>,
    notes: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct PreferencesRequest {
    dietary_type: Option<String>,
    allergies: Option<Vec<String>>,
    disliked_foods: Option<Vec<String>>,
    preferred_cuisines: Option<Vec<String>>,
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize, Validate)]
pub(super) struct GoalRequest {
    goal_type: String,
    #[validate(range(exclusive_min = 0.0, message = "Target weight must be positive"))]
    target_weight: Option<f64>,
    target_date: Option<String>,
    #[validate(range(min = 1, message = "Calorie target must be positive"))]
    calorie_target: i64,
    #[serde(default = "default_active")]
    is_active: bool,
}

#[derive(Deserialize, Validate)]
#[allow(clippy::option_option)]
pub(super) struct GoalPatch {
    goal_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    #[validate(range(exclusive_min = 0.0, message = "Target weight must be positive"))]
    target_weight: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    target_date: Option<Option<String>>,
    #[validate(range(min = 1, message = "Calorie target must be positive"))]
    calorie_target: Option<i64>,
    is_active: Option<bool>,
}

fn parse_date(value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!("Invalid target_date '{value}'. Use YYYY-MM-DD"))
    })
}

fn parse_severity(value: Option<&str>) -> Result<Option<Severity>, ApiError> {
    value
        .map(|s| parse_choice::<Severity>("severity", s))
        .transpose()
        .map_err(bad_request)
}

// --- Profiles ---

pub(super) async fn list_profiles(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<Vec<Profile>>, ApiError> {
    let profile = state.db().get_profile(user_id)?;
    Ok(Json(profile.into_iter().collect()))
}

pub(super) async fn create_profile(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<ProfileRequest>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    let new = req.into_new()?;

    let db = state.db();
    if db.get_profile(user_id)?.is_some() {
        return Err(ApiError::BadRequest(
            "Profile already exists for this user".to_string(),
        ));
    }
    let profile = db.create_profile(user_id, &new)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub(super) async fn get_my_profile(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<Profile>, ApiError> {
    state
        .db()
        .get_profile(user_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))
}

fn apply_profile_update(
    state: &AppState,
    user_id: i64,
    update: &UpdateProfile,
) -> Result<Json<Profile>, ApiError> {
    state
        .db()
        .update_profile(user_id, update)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))
}

pub(super) async fn replace_my_profile(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<ProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    let new = req.into_new()?;
    let update = UpdateProfile {
        age: Some(new.age),
        weight: Some(new.weight),
        height: Some(new.height),
        sex: Some(new.sex),
        activity_level: Some(new.activity_level),
    };
    apply_profile_update(&state, user_id, &update)
}

pub(super) async fn update_my_profile(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<ProfilePatch>,
) -> Result<Json<Profile>, ApiError> {
    req.validate()?;
    let update = UpdateProfile {
        age: req.age,
        weight: req.weight,
        height: req.height,
        sex: req
            .sex
            .as_deref()
            .map(|s| parse_choice::<Sex>("sex", s))
            .transpose()
            .map_err(bad_request)?,
        activity_level: req
            .activity_level
            .as_deref()
            .map(|s| parse_choice::<ActivityLevel>("activity_level", s))
            .transpose()
            .map_err(bad_request)?,
    };
    apply_profile_update(&state, user_id, &update)
}

// --- Medical conditions ---

fn condition_not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Medical condition {id} not found"))
}

fn duplicate_condition(name: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "A medical condition named '{name}' already exists for this user"
    ))
}

pub(super) async fn list_conditions(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<Vec<MedicalCondition>>, ApiError> {
    Ok(Json(state.db().list_conditions(user_id)?))
}

pub(super) async fn create_condition(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<ConditionRequest>,
) -> Result<(StatusCode, Json<MedicalCondition>), ApiError> {
    req.validate()?;
    let severity = parse_severity(req.severity.as_deref())?.unwrap_or_default();

    let db = state.db();
    if db.condition_name_taken(user_id, &req.condition_name, None)? {
        return Err(duplicate_condition(&req.condition_name));
    }
    let condition = db.create_condition(
        user_id,
        &NewMedicalCondition {
            condition_name: req.condition_name,
            severity,
            notes: req.notes,
        },
    )?;
    Ok((StatusCode::CREATED, Json(condition)))
}

pub(super) async fn get_condition(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<MedicalCondition>, ApiError> {
    state
        .db()
        .get_condition(user_id, id)?
        .map(Json)
        .ok_or_else(|| condition_not_found(id))
}

fn apply_condition_update(
    state: &AppState,
    user_id: i64,
    id: i64,
    update: &UpdateMedicalCondition,
) -> Result<Json<MedicalCondition>, ApiError> {
    let db = state.db();
    if let Some(ref name) = update.condition_name {
        if db.condition_name_taken(user_id, name, Some(id))? {
            return Err(duplicate_condition(name));
        }
    }
    db.update_condition(user_id, id, update)?
        .map(Json)
        .ok_or_else(|| condition_not_found(id))
}

pub(super) async fn replace_condition(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<ConditionRequest>,
) -> Result<Json<MedicalCondition>, ApiError> {
    req.validate()?;
    let update = UpdateMedicalCondition {
        severity: Some(parse_severity(req.severity.as_deref())?.unwrap_or_default()),
        condition_name: Some(req.condition_name),
        notes: Some(req.notes),
    };
    apply_condition_update(&state, user_id, id, &update)
}

pub(super) async fn update_condition(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<ConditionPatch>,
) -> Result<Json<MedicalCondition>, ApiError> {
    req.validate()?;
    let update = UpdateMedicalCondition {
        severity: parse_severity(req.severity.as_deref())?,
        condition_name: req.condition_name,
        notes: req.notes,
    };
    apply_condition_update(&state, user_id, id, &update)
}

pub(super) async fn delete_condition(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.db().delete_condition(user_id, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(condition_not_found(id))
    }
}

// --- Preferences ---

pub(super) async fn get_preferences(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<Preferences>, ApiError> {
    Ok(Json(state.db().get_or_create_preferences(user_id)?))
}

/// Serves both PUT and PATCH: every preference has a default, so omitted
/// fields simply keep their stored value.
pub(super) async fn update_preferences(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<PreferencesRequest>,
) -> Result<Json<Preferences>, ApiError> {
    let update = UpdatePreferences {
        dietary_type: req
            .dietary_type
            .as_deref()
            .map(|s| parse_choice::<DietaryType>("dietary_type", s))
            .transpose()
            .map_err(bad_request)?,
        allergies: req.allergies,
        disliked_foods: req.disliked_foods,
        preferred_cuisines: req.preferred_cuisines,
    };
    Ok(Json(state.db().update_preferences(user_id, &update)?))
}

// --- Diet goals ---

fn goal_not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Diet goal {id} not found"))
}

impl GoalRequest {
    fn into_new(self) -> Result<NewDietGoal, ApiError> {
        self.validate()?;
        Ok(NewDietGoal {
            goal_type: parse_choice::<GoalType>("goal_type", &self.goal_type)
                .map_err(bad_request)?,
            target_weight: self.target_weight,
            target_date: self.target_date.as_deref().map(parse_date).transpose()?,
            calorie_target: self.calorie_target,
            is_active: self.is_active,
        })
    }
}

pub(super) async fn list_goals(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<Vec<DietGoal>>, ApiError> {
    Ok(Json(state.db().list_goals(user_id)?))
}

pub(super) async fn create_goal(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<GoalRequest>,
) -> Result<(StatusCode, Json<DietGoal>), ApiError> {
    let new = req.into_new()?;
    let goal = state.db().create_goal(user_id, &new)?;
    Ok((StatusCode::CREATED, Json(goal)))
}

pub(super) async fn get_goal(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<Json<DietGoal>, ApiError> {
    state
        .db()
        .get_goal(user_id, id)?
        .map(Json)
        .ok_or_else(|| goal_not_found(id))
}

pub(super) async fn replace_goal(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<GoalRequest>,
) -> Result<Json<DietGoal>, ApiError> {
    let new = req.into_new()?;
    let update = UpdateDietGoal {
        goal_type: Some(new.goal_type),
        target_weight: Some(new.target_weight),
        target_date: Some(new.target_date),
        calorie_target: Some(new.calorie_target),
        is_active: Some(new.is_active),
    };
    state
        .db()
        .update_goal(user_id, id, &update)?
        .map(Json)
        .ok_or_else(|| goal_not_found(id))
}

pub(super) async fn update_goal(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(req): Json<GoalPatch>,
) -> Result<Json<DietGoal>, ApiError> {
    req.validate()?;
    let target_date = match req.target_date {
        Some(Some(ref d)) => Some(Some(parse_date(d)?)),
        Some(None) => Some(None),
        None => None,
    };
    let update = UpdateDietGoal {
        goal_type: req
            .goal_type
            .as_deref()
            .map(|s| parse_choice::<GoalType>("goal_type", s))
            .transpose()
            .map_err(bad_request)?,
        target_weight: req.target_weight,
        target_date,
        calorie_target: req.calorie_target,
        is_active: req.is_active,
    };
    state
        .db()
        .update_goal(user_id, id, &update)?
        .map(Json)
        .ok_or_else(|| goal_not_found(id))
}

pub(super) async fn delete_goal(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.db().delete_goal(user_id, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(goal_not_found(id))
    }
}
