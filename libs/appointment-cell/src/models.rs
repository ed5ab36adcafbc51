// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveTime};
use std::fmt;

use shared_models::error::FieldError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub reason: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub meeting_link: Option<String>,
    pub payment: Payment,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.patient_id == user_id || self.doctor_id == user_id
    }

    /// Whether this appointment still holds its slot.
    pub fn occupies_slot(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }

    pub fn starts_at(&self) -> chrono::NaiveDateTime {
        self.date.and_time(self.start_time)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no-show"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentType {
    InPerson,
    Video,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::InPerson => write!(f, "in-person"),
            AppointmentType::Video => write!(f, "video"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub amount: f64,
    pub currency: String,
    pub status: PaymentStatus,
}

/// Candidate window on a doctor's day. Derived per request, never stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSlot {
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
    pub is_available: bool,
}

// ==============================================================================
// STORE INPUT MODELS
// ==============================================================================

/// Appointment as submitted for creation; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentDraft {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
    #[serde(default = "default_status")]
    pub status: AppointmentStatus,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub reason: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub meeting_link: Option<String>,
    pub payment: Payment,
}

fn default_status() -> AppointmentStatus {
    AppointmentStatus::Scheduled
}

impl AppointmentDraft {
    pub fn into_appointment(self, id: Uuid, created_at: DateTime<Utc>) -> Appointment {
        Appointment {
            id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            status: self.status,
            appointment_type: self.appointment_type,
            reason: self.reason,
            notes: self.notes,
            meeting_link: self.meeting_link,
            payment: self.payment,
            created_at,
        }
    }
}

/// Partial update. Date, time and participants cannot be patched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_link: Option<String>,
}

impl AppointmentPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.notes.is_none()
            && self.payment_status.is_none()
            && self.meeting_link.is_none()
    }

    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(status) = self.status {
            appointment.status = status;
        }
        if let Some(notes) = &self.notes {
            appointment.notes = Some(notes.clone());
        }
        if let Some(payment_status) = self.payment_status {
            appointment.payment.status = payment_status;
        }
        if let Some(link) = &self.meeting_link {
            appointment.meeting_link = Some(link.clone());
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentFilter {
    /// Matches either the patient or the doctor
    pub participant_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

impl AppointmentFilter {
    pub fn for_participant(user_id: Uuid) -> Self {
        Self {
            participant_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn for_doctor_on(doctor_id: Uuid, date: NaiveDate) -> Self {
        Self {
            doctor_id: Some(doctor_id),
            date: Some(date),
            ..Default::default()
        }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.participant_id.map_or(true, |id| appointment.involves(id))
            && self.status.map_or(true, |s| appointment.status == s)
            && self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.date.map_or(true, |d| appointment.date == d)
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentQueryParams {
    pub user_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

impl From<AppointmentQueryParams> for AppointmentFilter {
    fn from(params: AppointmentQueryParams) -> Self {
        Self {
            participant_id: params.user_id,
            status: params.status,
            doctor_id: params.doctor_id,
            date: params.date,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
}

/// One-shot booking: the slot selection and the confirmation details together.
#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(default, with = "clock_time::option")]
    pub start_time: Option<NaiveTime>,
    #[serde(rename = "type", default = "default_type")]
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub reason: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub agree_to_terms: bool,
}

fn default_type() -> AppointmentType {
    AppointmentType::Video
}

/// Confirmation-step input for the booking workflow.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingDetails {
    pub reason: String,
    pub notes: Option<String>,
    pub agree_to_terms: bool,
}

impl From<&BookAppointmentRequest> for BookingDetails {
    fn from(request: &BookAppointmentRequest) -> Self {
        Self {
            reason: request.reason.clone(),
            notes: request.notes.clone(),
            agree_to_terms: request.agree_to_terms,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingState {
    SelectingSlot,
    ConfirmingDetails,
    Submitted,
}

impl fmt::Display for BookingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingState::SelectingSlot => write!(f, "selecting a slot"),
            BookingState::ConfirmingDetails => write!(f, "confirming details"),
            BookingState::Submitted => write!(f, "submitted"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingConfirmation {
    pub appointment: Appointment,
    pub payment: Payment,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientDashboard {
    pub upcoming: Vec<Appointment>,
    pub past: Vec<Appointment>,
    pub completed_consultations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorDashboard {
    pub today: Vec<Appointment>,
    pub upcoming: Vec<Appointment>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Appointment slot not available")]
    SlotNotAvailable,

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Invalid working window: {0}")]
    InvalidWindow(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Appointment store timed out")]
    Timeout,

    #[error("Appointment store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Appointment store rejected the request: {0}")]
    StoreRejected(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BookingError {
    #[error("Cannot {operation} while {state}")]
    InvalidState { operation: &'static str, state: BookingState },

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// The chosen slot was not among the loaded available slots, or was
    /// taken before the booking reached the store.
    #[error("Selected time slot is not available")]
    SlotUnavailable,

    #[error("Booking request timed out, please retry")]
    Timeout,

    #[error(transparent)]
    Appointment(#[from] AppointmentError),
}

impl BookingError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::Timeout | BookingError::Appointment(AppointmentError::StoreUnavailable(_))
        )
    }
}

// ==============================================================================
// TIME-OF-DAY SERIALIZATION
// ==============================================================================

/// `HH:MM` on output; `HH:MM` or `HH:MM:SS` on input (Postgres `time` columns).
pub mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn parse(value: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(value, FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time of day: {}", raw)))
    }

    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
            match time {
                Some(t) => super::serialize(t, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            match raw {
                None => Ok(None),
                Some(s) if s.trim().is_empty() => Ok(None),
                Some(s) => super::parse(&s)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid time of day: {}", s))),
            }
        }
    }
}
