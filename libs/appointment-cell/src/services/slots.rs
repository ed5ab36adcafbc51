// libs/appointment-cell/src/services/slots.rs
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, NaiveTime, Timelike};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::ClinicSettings;

use crate::models::{Appointment, AppointmentError, AppointmentFilter, TimeSlot};
use crate::store::{with_timeout, AppointmentStore};

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Daily bookable window, sliced into fixed-length slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub interval_minutes: u32,
}

impl Default for WorkingWindow {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 17,
            interval_minutes: 30,
        }
    }
}

impl WorkingWindow {
    /// `end_hour <= start_hour` is accepted and yields no slots.
    pub fn new(start_hour: u32, end_hour: u32, interval_minutes: u32) -> Result<Self, AppointmentError> {
        if start_hour > 24 || end_hour > 24 {
            return Err(AppointmentError::InvalidWindow(format!(
                "hours must be within 0..=24 (got {}..{})", start_hour, end_hour
            )));
        }
        if interval_minutes == 0 {
            return Err(AppointmentError::InvalidWindow("slot interval must be positive".to_string()));
        }

        Ok(Self { start_hour, end_hour, interval_minutes })
    }

    pub fn from_settings(settings: &ClinicSettings) -> Result<Self, AppointmentError> {
        Self::new(settings.start_hour, settings.end_hour, settings.slot_minutes)
    }

    pub fn interval(&self) -> Duration {
        Duration::minutes(self.interval_minutes as i64)
    }

    /// Number of candidate slots: ceil(window minutes / interval).
    pub fn slot_count(&self) -> usize {
        if self.end_hour <= self.start_hour || self.interval_minutes == 0 {
            return 0;
        }
        let span = (self.end_hour - self.start_hour) * 60;
        span.div_ceil(self.interval_minutes) as usize
    }
}

/// The candidate slots for one date. Iterating does not consume it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSequence {
    date: NaiveDate,
    window: WorkingWindow,
}

impl SlotSequence {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn window(&self) -> WorkingWindow {
        self.window
    }

    pub fn iter(&self) -> SlotIter {
        SlotIter {
            next_minute: self.window.start_hour * 60,
            end_minute: if self.window.end_hour > self.window.start_hour {
                self.window.end_hour * 60
            } else {
                0
            },
            interval: self.window.interval_minutes,
        }
    }

    pub fn len(&self) -> usize {
        self.window.slot_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> IntoIterator for &'a SlotSequence {
    type Item = (NaiveTime, NaiveTime);
    type IntoIter = SlotIter;

    fn into_iter(self) -> SlotIter {
        self.iter()
    }
}

/// Yields `(start, end)` pairs in strictly increasing start order.
#[derive(Debug, Clone)]
pub struct SlotIter {
    next_minute: u32,
    end_minute: u32,
    interval: u32,
}

impl Iterator for SlotIter {
    type Item = (NaiveTime, NaiveTime);

    fn next(&mut self) -> Option<Self::Item> {
        if self.interval == 0 || self.next_minute >= self.end_minute {
            return None;
        }

        let start = minute_of_day(self.next_minute);
        let end = minute_of_day(self.next_minute + self.interval);
        self.next_minute += self.interval;

        Some((start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = if self.interval == 0 || self.next_minute >= self.end_minute {
            0
        } else {
            (self.end_minute - self.next_minute).div_ceil(self.interval) as usize
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SlotIter {}

// Slots running past midnight wrap to the next day's clock time.
fn minute_of_day(minute: u32) -> NaiveTime {
    NaiveTime::default() + Duration::minutes((minute % MINUTES_PER_DAY) as i64)
}

pub struct SlotGenerator {
    window: WorkingWindow,
}

impl SlotGenerator {
    pub fn new(window: WorkingWindow) -> Self {
        Self { window }
    }

    pub fn generate(&self, date: NaiveDate) -> SlotSequence {
        SlotSequence { date, window: self.window }
    }
}

/// How an existing appointment blocks a candidate slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AvailabilityPolicy {
    /// Blocked only when the slot starts exactly when a booking starts.
    #[default]
    ExactStart,
    /// Blocked when the slot's interval intersects a booking's interval.
    Overlap,
}

impl AvailabilityPolicy {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "exact" | "exact_start" | "exact-start" => AvailabilityPolicy::ExactStart,
            "overlap" => AvailabilityPolicy::Overlap,
            other => {
                warn!("Unknown availability policy '{}', using exact start matching", other);
                AvailabilityPolicy::ExactStart
            }
        }
    }

    fn blocks(&self, slot_start: NaiveTime, slot_end: NaiveTime, booked: &Appointment) -> bool {
        match self {
            AvailabilityPolicy::ExactStart => booked.start_time == slot_start,
            AvailabilityPolicy::Overlap => {
                let (slot_from, slot_to) = minute_span(slot_start, slot_end);
                let (booked_from, booked_to) = minute_span(booked.start_time, booked.end_time);
                slot_from < booked_to && slot_to > booked_from
            }
        }
    }
}

// Minutes since the start of the day; an end at or before the start has
// wrapped past midnight.
fn minute_span(start: NaiveTime, end: NaiveTime) -> (u32, u32) {
    let from = start.num_seconds_from_midnight() / 60;
    let to = end.num_seconds_from_midnight() / 60;
    if to <= from {
        (from, to + MINUTES_PER_DAY)
    } else {
        (from, to)
    }
}

pub struct AvailabilityFilter {
    policy: AvailabilityPolicy,
}

impl AvailabilityFilter {
    pub fn new(policy: AvailabilityPolicy) -> Self {
        Self { policy }
    }

    /// Mark each slot of `sequence`. Appointments for other doctors, other
    /// dates, or in cancelled status are ignored.
    pub fn apply(&self, sequence: &SlotSequence, doctor_id: Uuid, appointments: &[Appointment]) -> Vec<TimeSlot> {
        let booked: Vec<&Appointment> = appointments
            .iter()
            .filter(|a| a.doctor_id == doctor_id && a.date == sequence.date() && a.occupies_slot())
            .collect();

        sequence
            .iter()
            .map(|(start_time, end_time)| TimeSlot {
                start_time,
                end_time,
                is_available: !booked.iter().any(|a| self.policy.blocks(start_time, end_time, a)),
            })
            .collect()
    }
}

/// Slot availability for a doctor's day, read through the appointment store.
pub struct AvailabilityService<S: AppointmentStore + ?Sized> {
    store: Arc<S>,
    generator: SlotGenerator,
    filter: AvailabilityFilter,
    store_timeout: StdDuration,
}

impl<S: AppointmentStore + ?Sized> AvailabilityService<S> {
    pub fn new(store: Arc<S>, window: WorkingWindow, policy: AvailabilityPolicy, store_timeout: StdDuration) -> Self {
        Self {
            store,
            generator: SlotGenerator::new(window),
            filter: AvailabilityFilter::new(policy),
            store_timeout,
        }
    }

    pub async fn slots_for(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, AppointmentError> {
        debug!("Calculating slots for doctor {} on {}", doctor_id, date);

        let filter = AppointmentFilter::for_doctor_on(doctor_id, date);
        let appointments = with_timeout(self.store_timeout, self.store.list(&filter)).await?;

        let slots = self.filter.apply(&self.generator.generate(date), doctor_id, &appointments);
        debug!(
            "{} of {} slots available for doctor {} on {}",
            slots.iter().filter(|s| s.is_available).count(),
            slots.len(),
            doctor_id,
            date
        );
        Ok(slots)
    }
}
