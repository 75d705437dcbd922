use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use validator::ValidationErrors;

use crate::auth::{self, TokenKind};
use nutrifit_core::ai::GeneratorHandle;
use nutrifit_core::db::Database;
use nutrifit_core::error::PipelineError;
use nutrifit_core::service::DietPlanner;

mod accounts;
mod plans;
mod profiles;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
pub(crate) struct AppState {
    db: Arc<Mutex<Database>>,
    planner: Arc<DietPlanner>,
    jwt_secret: Arc<str>,
}

impl AppState {
    pub(crate) fn new(db: Database, generator: GeneratorHandle, jwt_secret: &str) -> Self {
        let db = Arc::new(Mutex::new(db));
        let planner = DietPlanner::new(Arc::clone(&db), Arc::new(generator));
        Self {
            db,
            planner: Arc::new(planner),
            jwt_secret: Arc::from(jwt_secret),
        }
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The authenticated user's id, inserted by [`require_auth`].
#[derive(Clone, Copy)]
pub(crate) struct AuthUser(pub i64);

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[allow(clippy::needless_pass_by_value)]
fn bad_request(err: anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err}"))
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

pub(crate) enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(&'static str),
    Validation(ValidationErrors),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
            Self::Validation(errors) => {
                let fields: BTreeMap<String, Vec<String>> = errors
                    .field_errors()
                    .into_iter()
                    .map(|(field, errs)| {
                        let messages = errs
                            .iter()
                            .map(|e| {
                                e.message
                                    .as_ref()
                                    .map_or_else(|| e.code.to_string(), ToString::to_string)
                            })
                            .collect();
                        (field.to_string(), messages)
                    })
                    .collect();
                tracing::debug!(?fields, "request validation failed");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "Validation failed",
                        "fields": fields,
                    })),
                )
                    .into_response();
            }
            Self::Internal(err) => {
                tracing::error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Internal(err) => Self::Internal(err),
            other => {
                tracing::warn!(error = %other, "diet plan pipeline failed");
                Self::BadRequest(other.to_string())
            }
        }
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let user_id = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| auth::validate_token(token, &state.jwt_secret, TokenKind::Access).ok());

    let Some(user_id) = user_id else {
        return ApiError::Unauthorized("Invalid or missing access token").into_response();
    };

    let user = state.db().get_user(user_id);
    match user {
        Ok(Some(user)) if user.is_active => {}
        Ok(_) => return ApiError::Unauthorized("Invalid or missing access token").into_response(),
        Err(e) => return ApiError::Internal(e).into_response(),
    }

    request.extensions_mut().insert(AuthUser(user_id));
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/me", get(accounts::me))
        .route(
            "/api/profiles/",
            get(profiles::list_profiles).post(profiles::create_profile),
        )
        .route(
            "/api/profiles/me/",
            get(profiles::get_my_profile)
                .put(profiles::replace_my_profile)
                .patch(profiles::update_my_profile),
        )
        .route(
            "/api/medical-conditions/",
            get(profiles::list_conditions).post(profiles::create_condition),
        )
        .route(
            "/api/medical-conditions/{id}/",
            get(profiles::get_condition)
                .put(profiles::replace_condition)
                .patch(profiles::update_condition)
                .delete(profiles::delete_condition),
        )
        .route(
            "/api/preferences/",
            get(profiles::get_preferences)
                .put(profiles::update_preferences)
                .patch(profiles::update_preferences),
        )
        .route(
            "/api/diet-goals/",
            get(profiles::list_goals).post(profiles::create_goal),
        )
        .route(
            "/api/diet-goals/{id}/",
            get(profiles::get_goal)
                .put(profiles::replace_goal)
                .patch(profiles::update_goal)
                .delete(profiles::delete_goal),
        )
        .route("/api/ingredients/", get(plans::list_ingredients))
        .route("/api/ingredients/{id}/", get(plans::get_ingredient))
        .route("/api/diet-plans/", get(plans::list_plans))
        .route(
            "/api/diet-plans/{id}/",
            get(plans::get_plan)
                .put(plans::update_plan)
                .patch(plans::update_plan)
                .delete(plans::delete_plan),
        )
        .route("/api/diet-plans/generate/", post(plans::generate_plan))
        .route(
            "/api/diet-plans/generate-from-nl/",
            post(plans::generate_from_nl),
        )
        .route(
            "/api/parse-natural-language/",
            post(plans::parse_natural_language),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        // Routes added after the auth layer are public
        .route("/api/register", post(accounts::register))
        .route("/api/login", post(accounts::login))
        .route("/api/token/refresh", post(accounts::refresh_token))
        .route("/api/health", get(accounts::health))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    db: Database,
    generator: GeneratorHandle,
    jwt_secret: &str,
    port: u16,
    bind: &str,
) -> anyhow::Result<()> {
    let app = build_router(AppState::new(db, generator, jwt_secret));

    if bind != "127.0.0.1" && bind != "localhost" {
        tracing::warn!(bind, "listening on a non-loopback address");
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    tracing::info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use axum::body::Body;
    use axum::http::Method;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn auth_missing_token_returns_401() {
        let (state, _) = test_state(&[]);
        let (status, json) = call(&state, Method::GET, "/api/diet-plans/", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid or missing access token");
    }

    #[tokio::test]
    async fn auth_garbage_token_returns_401() {
        let (state, _) = test_state(&[]);
        let (status, _) = call(
            &state,
            Method::GET,
            "/api/diet-plans/",
            Some("not-a-jwt"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_refresh_token_is_not_an_access_token() {
        let (state, _) = test_state(&[]);
        let (user_id, _) = create_user(&state, "a@example.com");
        let pair = auth::issue_token_pair(user_id, SECRET).unwrap();
        let (status, _) = call(
            &state,
            Method::GET,
            "/api/me",
            Some(pair.refresh.as_str()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_inactive_user_returns_401() {
        let (state, _) = test_state(&[]);
        let (user_id, token) = create_user(&state, "a@example.com");
        state.db().set_user_active(user_id, false).unwrap();
        let (status, _) = call(&state, Method::GET, "/api/me", Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_valid_token_succeeds() {
        let (state, _) = test_state(&[]);
        let (_, token) = create_user(&state, "a@example.com");
        let (status, json) = call(&state, Method::GET, "/api/me", Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["email"], "a@example.com");
    }

    #[tokio::test]
    async fn health_is_public() {
        let (state, _) = test_state(&[]);
        let (status, json) = call(&state, Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn security_headers_present() {
        let (state, _) = test_state(&[]);
        let response = build_router(state)
            .oneshot(
                axum::http::Request::get("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let (state, _) = test_state(&[]);
        let response = build_router(state)
            .oneshot(
                axum::http::Request::get("/api/diet-plans/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let (state, _) = test_state(&[]);
        let big_body = vec![b' '; BODY_LIMIT + 1];
        let response = build_router(state)
            .oneshot(
                axum::http::Request::post("/api/register")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/user/nutrifit.db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn pipeline_errors_map_to_400_except_internal() {
        let response =
            ApiError::from(PipelineError::IngredientNotFound(9)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Ingredient 9 not found in catalog");

        let response =
            ApiError::from(PipelineError::Internal(anyhow::anyhow!("db gone"))).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
