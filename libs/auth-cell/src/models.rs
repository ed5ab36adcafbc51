use serde::{Deserialize, Serialize};

use shared_models::auth::{UserProfile, UserRole};
use shared_models::error::FieldError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub profile: UserProfile,
}

fn default_role() -> String {
    UserRole::Patient.to_string()
}

impl RegisterRequest {
    /// Field errors for every invalid input; admins cannot self-register.
    pub fn validate(&self) -> Result<UserRole, Vec<FieldError>> {
        let mut errors = Vec::new();

        if !looks_like_email(&self.email) {
            errors.push(FieldError::new("email", "Please enter a valid email"));
        }
        if self.password.chars().count() < 8 {
            errors.push(FieldError::new("password", "Password must be at least 8 characters"));
        }
        let role = match UserRole::parse(&self.role) {
            Some(role @ (UserRole::Patient | UserRole::Doctor)) => Some(role),
            _ => {
                errors.push(FieldError::new("role", "Role must be patient or doctor"));
                None
            }
        };
        if self.profile.first_name.trim().is_empty() {
            errors.push(FieldError::new("profile.first_name", "First name is required"));
        }
        if self.profile.last_name.trim().is_empty() {
            errors.push(FieldError::new("profile.last_name", "Last name is required"));
        }

        match role {
            Some(role) if errors.is_empty() => Ok(role),
            _ => Err(errors),
        }
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("User already registered")]
    AlreadyRegistered,

    #[error("User profile not found")]
    ProfileNotFound,

    #[error("Authentication service rejected the request: {0}")]
    Rejected(String),

    #[error("Authentication service timed out")]
    Timeout,

    #[error("Authentication service unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str, role: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            role: role.to_string(),
            profile: UserProfile {
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_valid_registration() {
        assert_eq!(request("jane@example.com", "longenough", "doctor").validate(), Ok(UserRole::Doctor));
    }

    #[test]
    fn test_every_invalid_field_reported() {
        let mut req = request("not-an-email", "short", "admin");
        req.profile.first_name.clear();

        let errors = req.validate().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "password", "role", "profile.first_name"]);
    }

    #[test]
    fn test_role_defaults_to_patient() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "jane@example.com",
            "password": "longenough",
            "profile": {"first_name": "Jane", "last_name": "Doe"}
        })).unwrap();
        assert_eq!(req.validate(), Ok(UserRole::Patient));
    }
}
