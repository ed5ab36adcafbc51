//! Persistence seam for appointment records.
//!
//! Handlers and the booking workflow only see [`AppointmentStore`]; the
//! concrete store is chosen at construction time and injected.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentDraft, AppointmentError, AppointmentFilter, AppointmentPatch, BookingError};

pub mod memory;
pub mod supabase;

pub use memory::InMemoryAppointmentStore;
pub use supabase::SupabaseAppointmentStore;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("appointment not found")]
    NotFound,

    /// A non-cancelled appointment already holds this doctor/date/start time.
    #[error("slot already booked")]
    SlotTaken,

    #[error("store request timed out")]
    Timeout,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected request: {0}")]
    Rejected(String),
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppointmentError::NotFound,
            StoreError::SlotTaken => AppointmentError::SlotNotAvailable,
            StoreError::Timeout => AppointmentError::Timeout,
            StoreError::Unavailable(msg) => AppointmentError::StoreUnavailable(msg),
            StoreError::Rejected(msg) => AppointmentError::StoreRejected(msg),
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SlotTaken => BookingError::SlotUnavailable,
            StoreError::Timeout => BookingError::Timeout,
            other => BookingError::Appointment(other.into()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Appointment, StoreError>;

    /// Conditional create: fails with [`StoreError::SlotTaken`] when a
    /// non-cancelled appointment exists for the same doctor, date and start.
    async fn create(&self, draft: AppointmentDraft) -> Result<Appointment, StoreError>;

    async fn update(&self, id: Uuid, patch: AppointmentPatch) -> Result<Appointment, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Bound a store call; expiry becomes [`StoreError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Appointment store call exceeded {:?}", limit);
            Err(StoreError::Timeout)
        }
    }
}
