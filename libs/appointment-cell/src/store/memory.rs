use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentDraft, AppointmentFilter, AppointmentPatch};
use super::{AppointmentStore, StoreError};

/// Process-local store. The slot check and the insert happen under one
/// write lock, so concurrent bookings of a slot cannot both succeed.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<Vec<Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_appointments(appointments: Vec<Appointment>) -> Self {
        Self {
            appointments: RwLock::new(appointments),
        }
    }

    pub async fn len(&self) -> usize {
        self.appointments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.appointments.read().await.is_empty()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let appointments = self.appointments.read().await;
        let mut matching: Vec<Appointment> = appointments
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matching.sort_by_key(|a| a.starts_at());
        Ok(matching)
    }

    async fn get(&self, id: Uuid) -> Result<Appointment, StoreError> {
        self.appointments
            .read()
            .await
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, draft: AppointmentDraft) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;

        let taken = appointments.iter().any(|a| {
            a.occupies_slot()
                && a.doctor_id == draft.doctor_id
                && a.date == draft.date
                && a.start_time == draft.start_time
        });
        if taken {
            debug!("Slot {} {} already booked for doctor {}", draft.date, draft.start_time, draft.doctor_id);
            return Err(StoreError::SlotTaken);
        }

        let appointment = draft.into_appointment(Uuid::new_v4(), Utc::now());
        appointments.push(appointment.clone());
        Ok(appointment)
    }

    async fn update(&self, id: Uuid, patch: AppointmentPatch) -> Result<Appointment, StoreError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound)?;

        patch.apply_to(appointment);
        Ok(appointment.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut appointments = self.appointments.write().await;
        let before = appointments.len();
        appointments.retain(|a| a.id != id);

        if appointments.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, AppointmentType, Payment, PaymentStatus};
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::Arc;

    fn draft(doctor_id: Uuid, hour: u32) -> AppointmentDraft {
        AppointmentDraft {
            patient_id: Uuid::new_v4(),
            doctor_id,
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour, 30, 0).unwrap(),
            status: AppointmentStatus::Scheduled,
            appointment_type: AppointmentType::InPerson,
            reason: "Persistent cough".to_string(),
            notes: None,
            meeting_link: None,
            payment: Payment { amount: 150.0, currency: "USD".to_string(), status: PaymentStatus::Pending },
        }
    }

    #[tokio::test]
    async fn test_create_assigns_identity() {
        let store = InMemoryAppointmentStore::new();
        let created = store.create(draft(Uuid::new_v4(), 9)).await.unwrap();

        assert_eq!(store.get(created.id).await.unwrap(), created);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_conditional_create_rejects_taken_slot() {
        let store = InMemoryAppointmentStore::new();
        let doctor = Uuid::new_v4();

        store.create(draft(doctor, 9)).await.unwrap();
        assert_eq!(store.create(draft(doctor, 9)).await, Err(StoreError::SlotTaken));

        // Another doctor at the same time is fine
        assert!(store.create(draft(Uuid::new_v4(), 9)).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_appointment_frees_slot() {
        let store = InMemoryAppointmentStore::new();
        let doctor = Uuid::new_v4();

        let first = store.create(draft(doctor, 10)).await.unwrap();
        store.update(first.id, AppointmentPatch {
            status: Some(AppointmentStatus::Cancelled),
            ..Default::default()
        }).await.unwrap();

        assert!(store.create(draft(doctor, 10)).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_creates_for_one_slot() {
        let store = Arc::new(InMemoryAppointmentStore::new());
        let doctor = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create(draft(doctor, 11)).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_list_filters_by_participant_and_status() {
        let store = InMemoryAppointmentStore::new();
        let doctor = Uuid::new_v4();
        let a = store.create(draft(doctor, 9)).await.unwrap();
        store.create(draft(doctor, 10)).await.unwrap();

        let by_patient = store.list(&AppointmentFilter::for_participant(a.patient_id)).await.unwrap();
        assert_eq!(by_patient.len(), 1);

        let by_doctor = store.list(&AppointmentFilter::for_participant(doctor)).await.unwrap();
        assert_eq!(by_doctor.len(), 2);
        assert!(by_doctor[0].start_time < by_doctor[1].start_time);

        let completed = store.list(&AppointmentFilter {
            status: Some(AppointmentStatus::Completed),
            ..Default::default()
        }).await.unwrap();
        assert!(completed.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = InMemoryAppointmentStore::new();
        assert_eq!(store.delete(Uuid::new_v4()).await, Err(StoreError::NotFound));
        assert_eq!(
            store.update(Uuid::new_v4(), AppointmentPatch::default()).await,
            Err(StoreError::NotFound)
        );
    }
}
