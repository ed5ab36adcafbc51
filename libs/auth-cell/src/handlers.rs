use std::sync::Arc;

use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AuthError, LoginRequest, RegisterRequest};
use crate::services::AuthService;

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(fields) => AppError::InvalidFields(fields),
            AuthError::InvalidCredentials => AppError::Auth("Invalid login credentials".to_string()),
            AuthError::AlreadyRegistered => AppError::Conflict("User already registered".to_string()),
            AuthError::ProfileNotFound => AppError::NotFound("User profile not found".to_string()),
            AuthError::Rejected(msg) => AppError::BadRequest(msg),
            AuthError::Timeout => AppError::Timeout("Authentication service timed out, please retry".to_string()),
            AuthError::Unavailable(msg) => AppError::ExternalService(msg),
        }
    }
}

#[axum::debug_handler]
pub async fn register(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let auth_service = AuthService::new(&config);
    let record = auth_service.register(request).await?;

    Ok((StatusCode::CREATED, Json(json!(record))))
}

#[axum::debug_handler]
pub async fn login(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let auth_service = AuthService::new(&config);
    let session = auth_service.login(request).await?;

    Ok(Json(json!(session)))
}

#[axum::debug_handler]
pub async fn me(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    debug!("Getting profile for user: {}", user.id);

    let auth_service = AuthService::new(&config);
    let record = auth_service.current_user(&user, auth.token()).await?;

    Ok(Json(json!(record)))
}
