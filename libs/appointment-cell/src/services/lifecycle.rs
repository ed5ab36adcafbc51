// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, info, warn};

use crate::models::{Appointment, AppointmentError, AppointmentPatch, AppointmentStatus, PaymentStatus};

pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        info!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => vec![],
        }
    }

    /// Build the patch that moves `appointment` to `new_status`. A paid
    /// appointment that gets cancelled is refunded.
    pub fn transition_patch(
        &self,
        appointment: &Appointment,
        new_status: AppointmentStatus,
    ) -> Result<AppointmentPatch, AppointmentError> {
        self.validate_status_transition(appointment.status, new_status)?;

        let payment_status = match (new_status, appointment.payment.status) {
            (AppointmentStatus::Cancelled, PaymentStatus::Paid) => Some(PaymentStatus::Refunded),
            _ => None,
        };

        Ok(AppointmentPatch {
            status: Some(new_status),
            payment_status,
            ..Default::default()
        })
    }
}
