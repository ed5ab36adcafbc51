use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Server-only key; used to assign application roles at registration
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub port: u16,
    /// Upper bound for a single call to the appointment store
    pub store_timeout_seconds: u64,
    pub clinic: ClinicSettings,
}

/// Working window, fee schedule and availability policy of the clinic.
#[derive(Debug, Clone, PartialEq)]
pub struct ClinicSettings {
    pub start_hour: u32,
    pub end_hour: u32,
    pub slot_minutes: u32,
    pub base_fee: f64,
    pub video_surcharge: f64,
    pub currency: String,
    /// "exact" or "overlap"
    pub availability_policy: String,
}

impl Default for ClinicSettings {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 17,
            slot_minutes: 30,
            base_fee: 150.0,
            video_surcharge: 5.0,
            currency: "USD".to_string(),
            availability_policy: "exact".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = ClinicSettings::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, registration will be unavailable");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            port: parse_or("PORT", 3000),
            store_timeout_seconds: parse_or("STORE_TIMEOUT_SECONDS", 10),
            clinic: ClinicSettings {
                start_hour: parse_or("CLINIC_START_HOUR", defaults.start_hour),
                end_hour: parse_or("CLINIC_END_HOUR", defaults.end_hour),
                slot_minutes: parse_or("CLINIC_SLOT_MINUTES", defaults.slot_minutes),
                base_fee: parse_or("CLINIC_BASE_FEE", defaults.base_fee),
                video_surcharge: parse_or("CLINIC_VIDEO_SURCHARGE", defaults.video_surcharge),
                currency: env::var("CLINIC_CURRENCY").unwrap_or(defaults.currency),
                availability_policy: env::var("CLINIC_AVAILABILITY_POLICY")
                    .unwrap_or(defaults.availability_policy),
            },
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_clinic_settings() {
        let settings = ClinicSettings::default();
        assert_eq!(settings.start_hour, 9);
        assert_eq!(settings.end_hour, 17);
        assert_eq!(settings.slot_minutes, 30);
        assert_eq!(settings.base_fee + settings.video_surcharge, 155.0);
    }

    #[test]
    fn test_parse_or_falls_back_on_missing_key() {
        let value: u32 = parse_or("TELEHEALTH_TEST_UNSET_KEY", 42);
        assert_eq!(value, 42);
    }
}
