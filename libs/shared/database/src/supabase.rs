use std::time::Duration;

use anyhow::{Result, anyhow};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Failure classes callers care about. Returned inside `anyhow::Error`;
/// use `downcast_ref::<SupabaseError>()` to branch on them.
#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.store_timeout_seconds.max(1)))
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build HTTP client with timeout, using defaults: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            service_role_key: config.supabase_service_role_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap> {
        self.headers_with_key(&self.anon_key, auth_token)
    }

    fn headers_with_key(&self, api_key: &str, auth_token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(api_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: Option<HeaderMap>)
                                         -> Result<T>
    where T: DeserializeOwned {
        let headers = self.get_headers(auth_token)?;
        self.send(method, path, headers, body, extra_headers).await
    }

    async fn send<T>(&self, method: Method, path: &str, mut headers: HeaderMap,
                     body: Option<Value>, extra_headers: Option<HeaderMap>)
                     -> Result<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await.map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => SupabaseError::Unauthorized(error_text),
                404 => SupabaseError::NotFound(error_text),
                409 => SupabaseError::Conflict(error_text),
                code => SupabaseError::Api { status: code, message: error_text },
            }.into());
        }

        let data = response.json::<T>().await.map_err(classify_transport_error)?;
        Ok(data)
    }

    /// Create an auth identity through GoTrue.
    pub async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<Value> {
        self.request(
            Method::POST,
            "/auth/v1/signup",
            None,
            Some(json!({
                "email": email,
                "password": password,
                "data": metadata
            })),
        ).await
    }

    /// Password grant; the response carries access and refresh tokens.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Value> {
        self.request(
            Method::POST,
            "/auth/v1/token?grant_type=password",
            None,
            Some(json!({
                "email": email,
                "password": password
            })),
        ).await
    }

    pub fn can_assign_roles(&self) -> bool {
        !self.service_role_key.is_empty()
    }

    /// Set `app_metadata` on an auth user through the GoTrue admin API.
    /// Needs the service role key; the result is embedded in every access
    /// token issued afterwards and cannot be changed by the user.
    pub async fn update_app_metadata(&self, user_id: &str, app_metadata: Value) -> Result<Value> {
        if self.service_role_key.is_empty() {
            return Err(anyhow!("Service role key is not configured"));
        }

        let headers = self.headers_with_key(&self.service_role_key, Some(&self.service_role_key))?;
        self.send(
            Method::PUT,
            &format!("/auth/v1/admin/users/{}", user_id),
            headers,
            Some(json!({ "app_metadata": app_metadata })),
            None,
        ).await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

/// Headers asking PostgREST to echo the written rows back.
pub fn return_representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

fn classify_transport_error(e: reqwest::Error) -> anyhow::Error {
    if e.is_timeout() {
        SupabaseError::Timeout.into()
    } else if e.is_decode() {
        anyhow!("Failed to decode response: {}", e)
    } else {
        SupabaseError::Transport(e.to_string()).into()
    }
}
