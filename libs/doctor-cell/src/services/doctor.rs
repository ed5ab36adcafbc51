use std::collections::BTreeSet;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{Doctor, DoctorError, DoctorSearchQuery};

const USERS: &str = "/rest/v1/users";

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Doctors matching `query`, ordered by last name. The specialty filter
    /// is pushed down to PostgREST; the free-text search runs here.
    pub async fn list_doctors(
        &self,
        query: &DoctorSearchQuery,
        auth_token: Option<&str>,
    ) -> Result<Vec<Doctor>, DoctorError> {
        let mut path = format!("{}?select=*&role=eq.doctor", USERS);
        if let Some(specialty) = query.specialty.as_deref().filter(|s| !s.is_empty()) {
            path.push_str(&format!("&profile->>specialty=eq.{}", urlencoding::encode(specialty)));
        }
        debug!("Listing doctors: {}", path);

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(map_error)?;

        let mut doctors: Vec<Doctor> = parse_rows(rows)?
            .into_iter()
            .filter(|d| query.matches(d))
            .collect();
        doctors.sort_by(|a, b| {
            a.profile.last_name
                .cmp(&b.profile.last_name)
                .then_with(|| a.profile.first_name.cmp(&b.profile.first_name))
        });

        debug!("Found {} doctors", doctors.len());
        Ok(doctors)
    }

    pub async fn get_doctor(&self, doctor_id: Uuid, auth_token: Option<&str>) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor profile: {}", doctor_id);

        let path = format!("{}?select=*&id=eq.{}&role=eq.doctor", USERS, doctor_id);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(map_error)?;

        parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or(DoctorError::NotFound)
    }

    /// Distinct specialties, sorted.
    pub async fn list_specialties(&self, auth_token: Option<&str>) -> Result<Vec<String>, DoctorError> {
        let doctors = self.list_doctors(&DoctorSearchQuery::default(), auth_token).await?;

        Ok(doctors
            .into_iter()
            .map(|d| d.profile.specialty)
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }
}

fn parse_rows(rows: Vec<Value>) -> Result<Vec<Doctor>, DoctorError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<Doctor>, _>>()
        .map_err(|e| {
            warn!("Malformed doctor row: {}", e);
            DoctorError::Unavailable(format!("Malformed doctor row: {}", e))
        })
}

fn map_error(err: anyhow::Error) -> DoctorError {
    match err.downcast_ref::<SupabaseError>() {
        Some(SupabaseError::Timeout) => DoctorError::Timeout,
        Some(SupabaseError::NotFound(_)) => DoctorError::NotFound,
        _ => DoctorError::Unavailable(err.to_string()),
    }
}
