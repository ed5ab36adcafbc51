use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient, SupabaseError};
use shared_models::auth::{Session, User, UserRecord};

use crate::models::{AuthError, LoginRequest, RegisterRequest};

const USERS: &str = "/rest/v1/users";

pub struct AuthService {
    supabase: SupabaseClient,
}

impl AuthService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Create the auth identity, assign its role in `app_metadata`, then
    /// create the matching `users` row.
    pub async fn register(&self, request: RegisterRequest) -> Result<UserRecord, AuthError> {
        let role = request.validate().map_err(AuthError::Validation)?;
        if !self.supabase.can_assign_roles() {
            warn!("Registration attempted without a service role key");
            return Err(AuthError::Unavailable("Registration is not configured".to_string()));
        }
        debug!("Registering {} as {}", request.email, role);

        let profile = json!({
            "first_name": request.profile.first_name,
            "last_name": request.profile.last_name,
        });
        let signup = self.supabase
            .sign_up(&request.email, &request.password, profile)
            .await
            .map_err(map_signup_error)?;

        // With email confirmation on, GoTrue returns the bare user; otherwise
        // a session wrapping it.
        let auth_user = signup.get("user").unwrap_or(&signup);
        let user_id = auth_user
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::Unavailable("Sign-up response carried no user id".to_string()))?;
        let access_token = signup.get("access_token").and_then(Value::as_str);

        self.supabase
            .update_app_metadata(user_id, json!({ "role": role }))
            .await
            .map_err(map_error)?;

        let row = json!({
            "id": user_id,
            "email": request.email,
            "role": role,
            "profile": request.profile,
        });

        let rows: Vec<Value> = self.supabase
            .request_with_headers(Method::POST, USERS, access_token, Some(row), Some(return_representation()))
            .await
            .map_err(map_error)?;

        let record = first_record(rows)?;
        info!("Registered user {} ({})", record.id, record.role);
        Ok(record)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<Session, AuthError> {
        debug!("Signing in {}", request.email);

        let response = self.supabase
            .sign_in_with_password(&request.email, &request.password)
            .await
            .map_err(|e| match e.downcast_ref::<SupabaseError>() {
                Some(SupabaseError::Unauthorized(_)) => AuthError::InvalidCredentials,
                Some(SupabaseError::Api { status, .. }) if *status < 500 => AuthError::InvalidCredentials,
                _ => map_error(e),
            })?;

        session_from_token_response(&response, Utc::now())
    }

    /// The `users` row of an authenticated caller.
    pub async fn current_user(&self, user: &User, auth_token: &str) -> Result<UserRecord, AuthError> {
        let path = format!("{}?select=*&id=eq.{}", USERS, user.id);

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(map_error)?;

        first_record(rows)
    }
}

/// Build a session from a GoTrue password-grant response.
pub fn session_from_token_response(response: &Value, now: DateTime<Utc>) -> Result<Session, AuthError> {
    let malformed = |what: &str| AuthError::Unavailable(format!("Token response missing {}", what));

    let access_token = response
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("access_token"))?;
    let auth_user = response.get("user").ok_or_else(|| malformed("user"))?;
    let id = auth_user
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("user id"))?;

    let user = User {
        id: id.to_string(),
        email: auth_user.get("email").and_then(Value::as_str).map(str::to_string),
        role: auth_user.get("role").and_then(Value::as_str).map(str::to_string),
        app_metadata: auth_user.get("app_metadata").cloned(),
        created_at: auth_user
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    };

    Ok(Session {
        access_token: access_token.to_string(),
        refresh_token: response.get("refresh_token").and_then(Value::as_str).map(str::to_string),
        expires_at: response
            .get("expires_in")
            .and_then(Value::as_i64)
            .map(|secs| now + Duration::seconds(secs)),
        user,
    })
}

fn first_record(rows: Vec<Value>) -> Result<UserRecord, AuthError> {
    let row = rows.into_iter().next().ok_or(AuthError::ProfileNotFound)?;
    serde_json::from_value(row).map_err(|e| {
        warn!("Malformed user row: {}", e);
        AuthError::Unavailable(format!("Malformed user row: {}", e))
    })
}

fn map_signup_error(err: anyhow::Error) -> AuthError {
    match err.downcast_ref::<SupabaseError>() {
        Some(SupabaseError::Conflict(_)) => AuthError::AlreadyRegistered,
        Some(SupabaseError::Api { status: 422, message }) if message.contains("already") => AuthError::AlreadyRegistered,
        _ => map_error(err),
    }
}

fn map_error(err: anyhow::Error) -> AuthError {
    match err.downcast_ref::<SupabaseError>() {
        Some(SupabaseError::Timeout) => AuthError::Timeout,
        Some(SupabaseError::Conflict(_)) => AuthError::AlreadyRegistered,
        Some(SupabaseError::Unauthorized(msg)) => AuthError::Rejected(msg.clone()),
        Some(SupabaseError::Api { status, message }) if *status < 500 => AuthError::Rejected(message.clone()),
        _ => AuthError::Unavailable(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::auth::UserRole;
    use shared_utils::test_utils::MockSupabaseResponses;

    #[test]
    fn test_session_from_token_response() {
        let now = Utc::now();
        let response = MockSupabaseResponses::session_response("user-123", "jane@example.com");

        let session = session_from_token_response(&response, now).unwrap();

        assert_eq!(session.access_token, "access-token-from-gotrue");
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-token-from-gotrue"));
        assert_eq!(session.expires_at, Some(now + Duration::seconds(3600)));
        assert_eq!(session.user.id, "user-123");
        assert_eq!(session.user.user_role(), Some(UserRole::Patient));
        assert!(!session.is_expired(now));
    }

    #[test]
    fn test_token_response_without_token_rejected() {
        let response = json!({ "user": { "id": "user-123" } });
        assert!(matches!(
            session_from_token_response(&response, Utc::now()),
            Err(AuthError::Unavailable(_))
        ));
    }
}
