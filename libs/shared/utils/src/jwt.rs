use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use chrono::{Utc, TimeZone};
use tracing::debug;
use shared_models::auth::{JwtClaims, User};

type HmacSha256 = Hmac<Sha256>;

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let header_b64 = parts[0];
    let claims_b64 = parts[1];
    let signature_b64 = parts[2];

    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
        debug!("Failed to decode signature: {}", e);
        "Invalid signature encoding".to_string()
    })?;

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(format!("{}.{}", header_b64, claims_b64).as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_json = URL_SAFE_NO_PAD.decode(claims_b64)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| "Invalid claims encoding".to_string())?;

    let claims: JwtClaims = serde_json::from_str(&claims_json).map_err(|e| {
        debug!("Failed to parse claims: {}", e);
        "Invalid claims format".to_string()
    })?;

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    let created_at = claims.iat
        .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single());

    let user = User {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
        app_metadata: claims.app_metadata,
        created_at,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{JwtTestUtils, TestUser};
    use assert_matches::assert_matches;
    use serde_json::json;
    use shared_models::auth::UserRole;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn test_valid_token_roundtrips_identity() {
        let user = TestUser::doctor("doc@example.com");
        let token = JwtTestUtils::create_test_token(&user, SECRET, Some(1));

        let validated = validate_token(&token, SECRET).unwrap();
        assert_eq!(validated.id, user.id);
        assert_eq!(validated.email.as_deref(), Some("doc@example.com"));
        assert_eq!(validated.role.as_deref(), Some("doctor"));
    }

    #[test]
    fn test_role_comes_from_app_metadata() {
        let user = TestUser::new("doc@example.com", "authenticated");
        let token = JwtTestUtils::create_token_with_metadata(
            &user,
            SECRET,
            json!({ "provider": "email", "role": "doctor" }),
            json!({}),
        );

        let validated = validate_token(&token, SECRET).unwrap();
        assert_eq!(validated.user_role(), Some(UserRole::Doctor));
    }

    #[test]
    fn test_user_metadata_cannot_grant_admin() {
        let user = TestUser::new("mallory@example.com", "authenticated");
        let token = JwtTestUtils::create_token_with_metadata(
            &user,
            SECRET,
            json!({ "provider": "email", "role": "patient" }),
            json!({ "role": "admin" }),
        );

        let validated = validate_token(&token, SECRET).unwrap();
        assert!(!validated.is_admin());
        assert_eq!(validated.user_role(), Some(UserRole::Patient));

        let no_app_role = JwtTestUtils::create_token_with_metadata(&user, SECRET, json!({}), json!({ "role": "admin" }));
        assert_eq!(validate_token(&no_app_role, SECRET).unwrap().user_role(), None);
    }

    #[test]
    fn test_expired_token_rejected() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_expired_token(&user, SECRET);
        assert_matches!(validate_token(&token, SECRET), Err(msg) if msg == "Token expired");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_invalid_signature_token(&user);
        assert_matches!(validate_token(&token, SECRET), Err(msg) if msg == "Invalid token signature");
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert!(validate_token("not-a-token", SECRET).is_err());
        assert!(validate_token(&JwtTestUtils::create_malformed_token(), SECRET).is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_test_token(&user, SECRET, Some(1));
        assert_matches!(validate_token(&token, ""), Err(_));
    }
}
