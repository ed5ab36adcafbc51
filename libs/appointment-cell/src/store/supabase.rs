use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient, SupabaseError};

use crate::models::{Appointment, AppointmentDraft, AppointmentFilter, AppointmentPatch, AppointmentStatus};
use super::{AppointmentStore, StoreError};

const TABLE: &str = "/rest/v1/appointments";

/// Appointment store backed by the Supabase `appointments` table. Requests
/// run with the caller's token so row-level security applies.
pub struct SupabaseAppointmentStore {
    supabase: SupabaseClient,
    auth_token: String,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig, auth_token: &str) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            auth_token: auth_token.to_string(),
        }
    }

    fn list_path(filter: &AppointmentFilter) -> String {
        let mut path = format!("{}?select=*", TABLE);

        if let Some(user_id) = filter.participant_id {
            path.push_str(&format!("&or=(patient_id.eq.{},doctor_id.eq.{})", user_id, user_id));
        }
        if let Some(status) = filter.status {
            path.push_str(&format!("&status=eq.{}", urlencoding::encode(&status.to_string())));
        }
        if let Some(doctor_id) = filter.doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", doctor_id));
        }
        if let Some(date) = filter.date {
            path.push_str(&format!("&date=eq.{}", date));
        }

        path.push_str("&order=date.asc,start_time.asc");
        path
    }

    fn parse_rows(rows: Vec<Value>) -> Result<Vec<Appointment>, StoreError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| StoreError::Unavailable(format!("Malformed appointment row: {}", e)))
    }

    fn first_row(rows: Vec<Value>) -> Result<Appointment, StoreError> {
        Self::parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)
    }

    async fn slot_taken(&self, draft: &AppointmentDraft) -> Result<bool, StoreError> {
        let path = format!(
            "{}?select=id&doctor_id=eq.{}&date=eq.{}&start_time=eq.{}&status=neq.{}",
            TABLE,
            draft.doctor_id,
            draft.date,
            draft.start_time.format("%H:%M"),
            AppointmentStatus::Cancelled,
        );

        let existing: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(map_error)?;

        Ok(!existing.is_empty())
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let path = Self::list_path(filter);
        debug!("Listing appointments: {}", path);

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(map_error)?;

        Self::parse_rows(rows)
    }

    async fn get(&self, id: Uuid) -> Result<Appointment, StoreError> {
        let path = format!("{}?id=eq.{}", TABLE, id);

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(&self.auth_token), None)
            .await
            .map_err(map_error)?;

        Self::first_row(rows)
    }

    async fn create(&self, draft: AppointmentDraft) -> Result<Appointment, StoreError> {
        // Check-then-insert; a partial unique index on the table closes the
        // remaining race and surfaces here as a 409.
        if self.slot_taken(&draft).await? {
            warn!("Slot {} {} already booked for doctor {}", draft.date, draft.start_time, draft.doctor_id);
            return Err(StoreError::SlotTaken);
        }

        let body = serde_json::to_value(&draft)
            .map_err(|e| StoreError::Rejected(e.to_string()))?;

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::POST,
                TABLE,
                Some(&self.auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await
            .map_err(|e| match map_error(e) {
                StoreError::NotFound => StoreError::Rejected("Insert returned no row".to_string()),
                other => other,
            })?;

        let appointment = Self::first_row(rows)
            .map_err(|_| StoreError::Rejected("Failed to create appointment".to_string()))?;
        debug!("Appointment created with ID: {}", appointment.id);
        Ok(appointment)
    }

    async fn update(&self, id: Uuid, patch: AppointmentPatch) -> Result<Appointment, StoreError> {
        let path = format!("{}?id=eq.{}", TABLE, id);
        let body = serde_json::to_value(&patch)
            .map_err(|e| StoreError::Rejected(e.to_string()))?;

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(&self.auth_token),
                Some(body),
                Some(return_representation()),
            )
            .await
            .map_err(map_error)?;

        Self::first_row(rows)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let path = format!("{}?id=eq.{}", TABLE, id);

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(&self.auth_token),
                None,
                Some(return_representation()),
            )
            .await
            .map_err(map_error)?;

        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn map_error(err: anyhow::Error) -> StoreError {
    match err.downcast_ref::<SupabaseError>() {
        Some(SupabaseError::Timeout) => StoreError::Timeout,
        Some(SupabaseError::NotFound(_)) => StoreError::NotFound,
        Some(SupabaseError::Conflict(body)) if is_unique_violation(body) => StoreError::SlotTaken,
        Some(SupabaseError::Conflict(body)) => StoreError::Rejected(postgrest_message(body)),
        Some(SupabaseError::Unauthorized(msg)) => StoreError::Rejected(msg.clone()),
        Some(SupabaseError::Api { status, message }) if *status < 500 => StoreError::Rejected(message.clone()),
        Some(other) => StoreError::Unavailable(other.to_string()),
        None => StoreError::Unavailable(err.to_string()),
    }
}

// PostgREST answers 409 for both unique (23505) and foreign key (23503)
// violations; only the former means the slot is held.
fn is_unique_violation(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("code").and_then(Value::as_str).map(|code| code == "23505"))
        .unwrap_or(false)
}

fn postgrest_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
