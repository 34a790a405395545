use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::{MAX_QUERY_WINDOW_DAYS, SLOT_MINUTES};
use crate::model::*;
use crate::slots::fixed_slots;

use super::{Engine, EngineError};

impl Engine {
    /// Windows a patient could book right now: active and unoccupied, on
    /// the given date. Occupancy is derived from the appointments, never
    /// stored on the window. Windows never cross midnight, so overlapping
    /// the whole day is the same as falling on the date.
    pub async fn find_bookable(&self, doctor_id: Ulid, date: NaiveDate) -> Vec<Window> {
        let Some(sched) = self.get_schedule(&doctor_id) else {
            return Vec::new();
        };
        let guard = sched.read().await;
        let day = Span::whole_day(date);
        guard
            .windows_overlapping(&day)
            .filter(|w| w.active && guard.occupant_of(w).is_none())
            .copied()
            .collect()
    }

    /// A doctor's day rendered as standard slots, each labeled available,
    /// booked or inactive. Windows are split at the standard slot length;
    /// a slot overlapping any blocking appointment counts as booked.
    pub async fn day_view(&self, doctor_id: Ulid, date: NaiveDate) -> Vec<DaySlot> {
        let Some(sched) = self.get_schedule(&doctor_id) else {
            return Vec::new();
        };
        let guard = sched.read().await;
        let day = Span::whole_day(date);
        let mut slots = Vec::new();
        for w in guard.windows_overlapping(&day) {
            for span in fixed_slots(w.span.start, w.span.end, SLOT_MINUTES) {
                let state = if !w.active {
                    SlotState::Inactive
                } else if guard
                    .appointments_overlapping(&span)
                    .any(|a| a.status.is_blocking())
                {
                    SlotState::Booked
                } else {
                    SlotState::Available
                };
                slots.push(DaySlot {
                    window_id: w.id,
                    span,
                    state,
                });
            }
        }
        slots
    }

    /// All windows of a doctor inside an inclusive date range.
    pub async fn windows_for_doctor(
        &self,
        doctor_id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Window>, EngineError> {
        if to < from {
            return Err(EngineError::InvalidRange);
        }
        if (to - from).num_days() > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query range too wide"));
        }
        let Some(sched) = self.get_schedule(&doctor_id) else {
            return Ok(Vec::new());
        };
        let guard = sched.read().await;
        Ok(guard
            .windows
            .iter()
            .filter(|w| {
                let d = w.span.date();
                from <= d && d <= to
            })
            .copied()
            .collect())
    }

    /// A doctor's appointments, optionally restricted to one date. Sorted
    /// by start time (the schedule's storage order).
    pub async fn appointments_for_doctor(
        &self,
        doctor_id: Ulid,
        date: Option<NaiveDate>,
    ) -> Vec<Appointment> {
        let Some(sched) = self.get_schedule(&doctor_id) else {
            return Vec::new();
        };
        let guard = sched.read().await;
        match date {
            Some(d) => {
                let day = Span::whole_day(d);
                guard.appointments_overlapping(&day).cloned().collect()
            }
            None => guard.appointments.clone(),
        }
    }

    /// A patient's appointments across every doctor, ordered by start time.
    pub async fn appointments_for_patient(&self, patient_id: Ulid) -> Vec<Appointment> {
        let shards: Vec<_> = self.schedules.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for sched in shards {
            let guard = sched.read().await;
            out.extend(
                guard
                    .appointments
                    .iter()
                    .filter(|a| a.patient_id == patient_id)
                    .cloned(),
            );
        }
        out.sort_by_key(|a| a.span.start);
        out
    }

    pub async fn get_appointment(&self, appointment_id: Ulid) -> Option<Appointment> {
        let doctor_id = self.doctor_for_appointment(&appointment_id)?;
        let sched = self.get_schedule(&doctor_id)?;
        let guard = sched.read().await;
        guard.appointment(appointment_id).cloned()
    }

    pub async fn get_window(&self, window_id: Ulid) -> Option<Window> {
        let doctor_id = self.doctor_for_window(&window_id)?;
        let sched = self.get_schedule(&doctor_id)?;
        let guard = sched.read().await;
        guard.window(window_id).copied()
    }
}
