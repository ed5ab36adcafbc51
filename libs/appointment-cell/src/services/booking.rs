// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::Session;
use shared_models::error::FieldError;

use crate::models::{
    Appointment, AppointmentDraft, AppointmentError, AppointmentFilter, AppointmentStatus,
    AppointmentType, BookingConfirmation, BookingDetails, BookingError, BookingState, Payment,
    TimeSlot,
};
use crate::services::pricing::PricingService;
use crate::services::slots::{AvailabilityFilter, AvailabilityPolicy, SlotGenerator, WorkingWindow};
use crate::store::{with_timeout, AppointmentStore};

const REASON_MIN_CHARS: usize = 5;
const REASON_MAX_CHARS: usize = 500;
const NOTES_MAX_CHARS: usize = 1000;

/// Clinic rules a booking runs under.
#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub window: WorkingWindow,
    pub policy: AvailabilityPolicy,
    pub pricing: PricingService,
    pub store_timeout: StdDuration,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            window: WorkingWindow::default(),
            policy: AvailabilityPolicy::default(),
            pricing: PricingService::default(),
            store_timeout: StdDuration::from_secs(10),
        }
    }
}

impl BookingSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, AppointmentError> {
        Ok(Self {
            window: WorkingWindow::from_settings(&config.clinic)?,
            policy: AvailabilityPolicy::parse(&config.clinic.availability_policy),
            pricing: PricingService::from_settings(&config.clinic),
            store_timeout: StdDuration::from_secs(config.store_timeout_seconds),
        })
    }
}

/// One patient booking one doctor: pick a date, a type and a free slot,
/// confirm the details, submit exactly once.
pub struct BookingWorkflow<S: AppointmentStore + ?Sized> {
    store: Arc<S>,
    session: Session,
    doctor_id: Uuid,
    settings: BookingSettings,
    state: BookingState,
    date: Option<NaiveDate>,
    slots: Vec<TimeSlot>,
    appointment_type: AppointmentType,
    selected: Option<TimeSlot>,
    submitted: Option<Appointment>,
}

impl<S: AppointmentStore + ?Sized> BookingWorkflow<S> {
    pub fn new(store: Arc<S>, session: Session, doctor_id: Uuid, settings: BookingSettings) -> Self {
        Self {
            store,
            session,
            doctor_id,
            settings,
            state: BookingState::SelectingSlot,
            date: None,
            slots: Vec::new(),
            appointment_type: AppointmentType::Video,
            selected: None,
            submitted: None,
        }
    }

    pub fn state(&self) -> BookingState {
        self.state
    }

    pub fn doctor_id(&self) -> Uuid {
        self.doctor_id
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn selected_slot(&self) -> Option<TimeSlot> {
        self.selected
    }

    pub fn appointment_type(&self) -> AppointmentType {
        self.appointment_type
    }

    pub fn submitted(&self) -> Option<&Appointment> {
        self.submitted.as_ref()
    }

    /// Payment summary for the current appointment type.
    pub fn quote(&self) -> Payment {
        self.settings.pricing.quote(self.appointment_type)
    }

    /// Load the doctor's slots for `date`. Changing the date drops the
    /// current selection.
    pub async fn load_slots(&mut self, date: NaiveDate) -> Result<&[TimeSlot], BookingError> {
        self.expect_state(BookingState::SelectingSlot, "load slots")?;

        let filter = AppointmentFilter::for_doctor_on(self.doctor_id, date);
        let appointments = with_timeout(self.settings.store_timeout, self.store.list(&filter)).await?;

        let sequence = SlotGenerator::new(self.settings.window).generate(date);
        self.slots = AvailabilityFilter::new(self.settings.policy).apply(&sequence, self.doctor_id, &appointments);

        if self.date != Some(date) {
            self.selected = None;
        }
        self.date = Some(date);

        debug!("Loaded {} slots for doctor {} on {}", self.slots.len(), self.doctor_id, date);
        Ok(&self.slots)
    }

    pub fn select_type(&mut self, appointment_type: AppointmentType) -> Result<(), BookingError> {
        self.expect_state(BookingState::SelectingSlot, "change appointment type")?;
        self.appointment_type = appointment_type;
        Ok(())
    }

    /// Select one of the loaded slots by start time. Only available slots
    /// can be selected.
    pub fn select_slot(&mut self, start_time: NaiveTime) -> Result<TimeSlot, BookingError> {
        self.expect_state(BookingState::SelectingSlot, "select a slot")?;

        let slot = self
            .slots
            .iter()
            .find(|s| s.start_time == start_time && s.is_available)
            .copied()
            .ok_or(BookingError::SlotUnavailable)?;

        self.selected = Some(slot);
        Ok(slot)
    }

    pub fn proceed(&mut self) -> Result<(), BookingError> {
        self.expect_state(BookingState::SelectingSlot, "proceed")?;

        if self.selected.is_none() {
            return Err(BookingError::Validation(vec![FieldError::new(
                "start_time",
                "Please select a time slot",
            )]));
        }

        self.state = BookingState::ConfirmingDetails;
        Ok(())
    }

    pub fn back(&mut self) -> Result<(), BookingError> {
        self.expect_state(BookingState::ConfirmingDetails, "go back")?;
        self.state = BookingState::SelectingSlot;
        Ok(())
    }

    /// Validate the details and create the appointment. A failed create
    /// leaves the workflow on the confirmation step so it can be retried.
    pub async fn submit(&mut self, details: BookingDetails) -> Result<BookingConfirmation, BookingError> {
        self.expect_state(BookingState::ConfirmingDetails, "submit")?;

        let errors = validate_details(&details);
        if !errors.is_empty() {
            return Err(BookingError::Validation(errors));
        }

        let draft = self.draft(details)?;
        info!(
            "Booking {} appointment for patient {} with doctor {} on {} at {}",
            draft.appointment_type, draft.patient_id, draft.doctor_id, draft.date, draft.start_time
        );

        let appointment = match with_timeout(self.settings.store_timeout, self.store.create(draft)).await {
            Ok(appointment) => appointment,
            Err(e) => {
                warn!("Booking failed for doctor {}: {}", self.doctor_id, e);
                return Err(e.into());
            }
        };

        info!("Appointment {} booked", appointment.id);
        self.state = BookingState::Submitted;
        self.submitted = Some(appointment.clone());

        Ok(BookingConfirmation {
            payment: appointment.payment.clone(),
            appointment,
        })
    }

    fn draft(&self, details: BookingDetails) -> Result<AppointmentDraft, BookingError> {
        if self.session.is_expired(Utc::now()) {
            return Err(AppointmentError::Unauthorized.into());
        }
        let patient_id = self.session.user.uuid().ok_or(AppointmentError::Unauthorized)?;

        let (date, slot) = match (self.date, self.selected) {
            (Some(date), Some(slot)) => (date, slot),
            _ => return Err(BookingError::SlotUnavailable),
        };

        Ok(AppointmentDraft {
            patient_id,
            doctor_id: self.doctor_id,
            date,
            start_time: slot.start_time,
            end_time: slot.start_time + self.settings.window.interval(),
            status: AppointmentStatus::Scheduled,
            appointment_type: self.appointment_type,
            reason: details.reason,
            notes: details.notes.filter(|n| !n.is_empty()),
            meeting_link: None,
            payment: self.quote(),
        })
    }

    fn expect_state(&self, expected: BookingState, operation: &'static str) -> Result<(), BookingError> {
        if self.state != expected {
            return Err(BookingError::InvalidState { operation, state: self.state });
        }
        Ok(())
    }
}

/// Every failing field is reported, not just the first.
pub fn validate_details(details: &BookingDetails) -> Vec<FieldError> {
    let mut errors = Vec::new();

    let reason_len = details.reason.chars().count();
    if reason_len < REASON_MIN_CHARS {
        errors.push(FieldError::new("reason", "Please provide a reason for your visit"));
    } else if reason_len > REASON_MAX_CHARS {
        errors.push(FieldError::new("reason", "Reason is too long"));
    }

    if let Some(notes) = &details.notes {
        if notes.chars().count() > NOTES_MAX_CHARS {
            errors.push(FieldError::new("notes", "Notes are too long"));
        }
    }

    if !details.agree_to_terms {
        errors.push(FieldError::new("agree_to_terms", "You must agree to the terms and conditions"));
    }

    errors
}
