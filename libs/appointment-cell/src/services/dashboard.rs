use chrono::NaiveDate;

use crate::models::{Appointment, AppointmentStatus, DoctorDashboard, PatientDashboard};

pub struct DashboardService;

impl DashboardService {
    /// Upcoming: not cancelled and starting today or later. Past: everything
    /// else, cancelled ones included.
    pub fn patient_view(mut appointments: Vec<Appointment>, today: NaiveDate) -> PatientDashboard {
        appointments.sort_by_key(|a| a.starts_at());

        let completed_consultations = appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Completed)
            .count();

        let (upcoming, past): (Vec<_>, Vec<_>) = appointments
            .into_iter()
            .partition(|a| a.occupies_slot() && a.date >= today);

        PatientDashboard {
            upcoming,
            past,
            completed_consultations,
        }
    }

    pub fn doctor_view(mut appointments: Vec<Appointment>, today: NaiveDate) -> DoctorDashboard {
        appointments.retain(|a| a.occupies_slot() && a.date >= today);
        appointments.sort_by_key(|a| a.starts_at());

        let (todays, upcoming) = appointments.into_iter().partition(|a| a.date == today);

        DoctorDashboard { today: todays, upcoming }
    }
}
