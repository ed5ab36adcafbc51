pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use models::{
    Appointment, AppointmentDraft, AppointmentError, AppointmentPatch, AppointmentStatus,
    AppointmentType, BookingError, BookingState, TimeSlot,
};
pub use services::booking::{BookingSettings, BookingWorkflow};
pub use services::slots::{AvailabilityFilter, AvailabilityPolicy, SlotGenerator, WorkingWindow};
pub use store::{AppointmentStore, InMemoryAppointmentStore, StoreError, SupabaseAppointmentStore};
