// libs/appointment-cell/src/services/appointments.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::FieldError;

use crate::models::{
    Appointment, AppointmentDraft, AppointmentError, AppointmentFilter, AppointmentPatch,
    AppointmentStatus, DoctorDashboard, PatientDashboard,
};
use crate::services::dashboard::DashboardService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::store::{with_timeout, AppointmentStore};

/// Appointment records as seen by one authenticated caller. Non-admin
/// callers only ever reach appointments they take part in.
pub struct AppointmentService<S: AppointmentStore + ?Sized> {
    store: Arc<S>,
    lifecycle: AppointmentLifecycleService,
    store_timeout: Duration,
}

impl<S: AppointmentStore + ?Sized> AppointmentService<S> {
    pub fn new(store: Arc<S>, store_timeout: Duration) -> Self {
        Self {
            store,
            lifecycle: AppointmentLifecycleService::new(),
            store_timeout,
        }
    }

    pub async fn list(&self, user: &User, mut filter: AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        if !user.is_admin() {
            let caller = caller_id(user)?;
            match filter.participant_id {
                Some(id) if id != caller => {
                    warn!("User {} attempted to list appointments of {}", caller, id);
                    return Err(AppointmentError::Unauthorized);
                }
                _ => filter.participant_id = Some(caller),
            }
        }

        debug!("Listing appointments with filter {:?}", filter);
        Ok(with_timeout(self.store_timeout, self.store.list(&filter)).await?)
    }

    pub async fn get(&self, user: &User, id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = with_timeout(self.store_timeout, self.store.get(id)).await?;
        authorize(user, &appointment)?;
        Ok(appointment)
    }

    pub async fn create(&self, user: &User, draft: AppointmentDraft) -> Result<Appointment, AppointmentError> {
        if !user.is_admin() {
            let caller = caller_id(user)?;
            if draft.patient_id != caller && draft.doctor_id != caller {
                return Err(AppointmentError::Unauthorized);
            }
        }
        if draft.reason.trim().is_empty() {
            return Err(AppointmentError::Validation(vec![FieldError::new(
                "reason",
                "Please provide a reason for your visit",
            )]));
        }
        if draft.end_time == draft.start_time {
            return Err(AppointmentError::Validation(vec![FieldError::new(
                "end_time",
                "Appointment cannot have zero length",
            )]));
        }

        let appointment = with_timeout(self.store_timeout, self.store.create(draft)).await?;
        info!("Appointment {} created by {}", appointment.id, user.id);
        Ok(appointment)
    }

    pub async fn update(&self, user: &User, id: Uuid, patch: AppointmentPatch) -> Result<Appointment, AppointmentError> {
        if patch.is_empty() {
            return Err(AppointmentError::Validation(vec![FieldError::new(
                "body",
                "No updatable fields provided",
            )]));
        }

        if patch.payment_status.is_some() && !user.is_admin() {
            warn!("User {} attempted to set payment status of appointment {}", user.id, id);
            return Err(AppointmentError::Unauthorized);
        }

        let current = self.get(user, id).await?;
        let patch = match patch.status {
            Some(status) if status != current.status => {
                authorize_transition(user, &current, status)?;
                let transition = self.lifecycle.transition_patch(&current, status)?;
                AppointmentPatch {
                    payment_status: patch.payment_status.or(transition.payment_status),
                    ..patch
                }
            }
            _ => patch,
        };

        let updated = with_timeout(self.store_timeout, self.store.update(id, patch)).await?;
        info!("Appointment {} updated by {}", id, user.id);
        Ok(updated)
    }

    pub async fn delete(&self, user: &User, id: Uuid) -> Result<(), AppointmentError> {
        self.get(user, id).await?;
        with_timeout(self.store_timeout, self.store.delete(id)).await?;
        info!("Appointment {} deleted by {}", id, user.id);
        Ok(())
    }

    /// Move an appointment along its lifecycle. Either participant may
    /// cancel; only the doctor closes it as completed or no-show.
    pub async fn transition(&self, user: &User, id: Uuid, status: AppointmentStatus) -> Result<Appointment, AppointmentError> {
        let current = self.get(user, id).await?;
        authorize_transition(user, &current, status)?;

        let patch = self.lifecycle.transition_patch(&current, status)?;
        let updated = with_timeout(self.store_timeout, self.store.update(id, patch)).await?;
        info!("Appointment {} moved from {} to {}", id, current.status, updated.status);
        Ok(updated)
    }

    pub async fn patient_dashboard(&self, user: &User, today: NaiveDate) -> Result<PatientDashboard, AppointmentError> {
        let filter = AppointmentFilter::for_participant(caller_id(user)?);
        let appointments = with_timeout(self.store_timeout, self.store.list(&filter)).await?;
        Ok(DashboardService::patient_view(appointments, today))
    }

    pub async fn doctor_dashboard(&self, user: &User, today: NaiveDate) -> Result<DoctorDashboard, AppointmentError> {
        let filter = AppointmentFilter {
            doctor_id: Some(caller_id(user)?),
            ..Default::default()
        };
        let appointments = with_timeout(self.store_timeout, self.store.list(&filter)).await?;
        Ok(DashboardService::doctor_view(appointments, today))
    }
}

fn caller_id(user: &User) -> Result<Uuid, AppointmentError> {
    user.uuid().ok_or(AppointmentError::Unauthorized)
}

fn authorize(user: &User, appointment: &Appointment) -> Result<(), AppointmentError> {
    if user.is_admin() {
        return Ok(());
    }
    if !appointment.involves(caller_id(user)?) {
        warn!("User {} is not a participant of appointment {}", user.id, appointment.id);
        return Err(AppointmentError::Unauthorized);
    }
    Ok(())
}

fn authorize_transition(user: &User, appointment: &Appointment, status: AppointmentStatus) -> Result<(), AppointmentError> {
    if status == AppointmentStatus::Cancelled || user.is_admin() {
        return Ok(());
    }
    if caller_id(user)? != appointment.doctor_id {
        warn!("User {} attempted to mark appointment {} as {}", user.id, appointment.id, status);
        return Err(AppointmentError::Unauthorized);
    }
    Ok(())
}
