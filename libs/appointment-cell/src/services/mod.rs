pub mod appointments;
pub mod booking;
pub mod dashboard;
pub mod lifecycle;
pub mod pricing;
pub mod slots;
