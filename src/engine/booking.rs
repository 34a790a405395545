use chrono::Duration;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{rejection_label, BOOKINGS_REJECTED_TOTAL, BOOKINGS_TOTAL};

use super::conflict::{check_covered, check_no_conflict, now, validate_booking_span};
use super::{Engine, EngineError};

impl Engine {
    /// Book an appointment. The request names the slot in one of three
    /// ways: an existing window id, an explicit interval, or a bare start
    /// instant (expanded to one standard slot). Validation, coverage and
    /// the conflict check all run under the doctor's write lock, and the
    /// journal append commits before the lock is released, so two racing
    /// requests for the same interval can never both succeed.
    pub async fn book(
        &self,
        patient_id: Ulid,
        doctor_id: Ulid,
        request: BookingRequest,
        observations: Option<String>,
    ) -> Result<Appointment, EngineError> {
        metrics::counter!(BOOKINGS_TOTAL).increment(1);
        let result = self
            .book_inner(patient_id, doctor_id, request, observations)
            .await;
        if let Err(e) = &result {
            metrics::counter!(BOOKINGS_REJECTED_TOTAL, "reason" => rejection_label(e))
                .increment(1);
        }
        result
    }

    async fn book_inner(
        &self,
        patient_id: Ulid,
        doctor_id: Ulid,
        request: BookingRequest,
        observations: Option<String>,
    ) -> Result<Appointment, EngineError> {
        self.require_doctor(doctor_id).await?;
        match self.records.get_patient(patient_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return Err(EngineError::NotFound(patient_id)),
            Err(e) => return Err(Self::store_error(e)),
        }
        if let Some(obs) = &observations
            && obs.len() > MAX_OBSERVATIONS_LEN
        {
            return Err(EngineError::LimitExceeded("observations too long"));
        }
        // A window id must belong to the doctor being booked.
        if let BookingRequest::Window(window_id) = &request {
            match self.doctor_for_window(window_id) {
                None => return Err(EngineError::NotFound(*window_id)),
                Some(owner) if owner != doctor_id => {
                    return Err(EngineError::Validation(
                        "window belongs to a different doctor",
                    ));
                }
                Some(_) => {}
            }
        }

        let _permit = self.commit_permit().await;
        let sched = self.schedule_entry(doctor_id);
        let mut guard = sched.write().await;
        if guard.appointments.len() >= MAX_APPOINTMENTS_PER_DOCTOR {
            return Err(EngineError::LimitExceeded("too many appointments for doctor"));
        }

        let (span, window_id) = match request {
            BookingRequest::Window(window_id) => {
                let window = *guard
                    .window(window_id)
                    .ok_or(EngineError::NotFound(window_id))?;
                if !window.active {
                    return Err(EngineError::Unavailable("window is deactivated"));
                }
                if guard.occupant_of(&window).is_some() {
                    return Err(EngineError::Unavailable("window already taken"));
                }
                (window.span, Some(window_id))
            }
            BookingRequest::Interval(span) => (span, None),
            BookingRequest::At(start) => (
                Span {
                    start,
                    end: start + Duration::minutes(SLOT_MINUTES),
                },
                None,
            ),
        };

        validate_booking_span(&span, now())?;
        // Window bookings are covered by definition of the window itself;
        // interval bookings must land inside published availability.
        if window_id.is_none() {
            check_covered(&guard, &span)?;
        }
        check_no_conflict(&guard, &span, None)?;

        let id = Ulid::new();
        let at = now();
        let event = Event::AppointmentBooked {
            id,
            doctor_id,
            patient_id,
            window_id,
            span,
            observations,
            at,
        };
        self.persist_and_apply(doctor_id, &mut guard, &event).await?;

        guard
            .appointment(id)
            .cloned()
            .ok_or_else(|| EngineError::Internal("booked appointment vanished".into()))
    }

    /// Move an appointment to a new slot. Terminal appointments cannot
    /// move; the conflict check excludes the appointment itself so moving
    /// within its own interval is allowed.
    pub async fn reschedule(
        &self,
        appointment_id: Ulid,
        request: BookingRequest,
    ) -> Result<Appointment, EngineError> {
        let _permit = self.commit_permit().await;
        let (doctor_id, mut guard) = self.resolve_appointment_write(&appointment_id).await?;
        let current = guard
            .appointment(appointment_id)
            .cloned()
            .ok_or(EngineError::NotFound(appointment_id))?;
        if current.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to: current.status,
            });
        }

        let (span, window_id) = match request {
            BookingRequest::Window(window_id) => {
                match self.doctor_for_window(&window_id) {
                    None => return Err(EngineError::NotFound(window_id)),
                    Some(owner) if owner != doctor_id => {
                        return Err(EngineError::Validation(
                            "window belongs to a different doctor",
                        ));
                    }
                    Some(_) => {}
                }
                let window = *guard
                    .window(window_id)
                    .ok_or(EngineError::NotFound(window_id))?;
                if !window.active {
                    return Err(EngineError::Unavailable("window is deactivated"));
                }
                if let Some(occupant) = guard.occupant_of(&window)
                    && occupant != appointment_id
                {
                    return Err(EngineError::Unavailable("window already taken"));
                }
                (window.span, Some(window_id))
            }
            BookingRequest::Interval(span) => (span, None),
            BookingRequest::At(start) => (
                Span {
                    start,
                    end: start + Duration::minutes(SLOT_MINUTES),
                },
                None,
            ),
        };

        validate_booking_span(&span, now())?;
        if window_id.is_none() {
            check_covered(&guard, &span)?;
        }
        check_no_conflict(&guard, &span, Some(appointment_id))?;

        let event = Event::AppointmentRescheduled {
            id: appointment_id,
            doctor_id,
            window_id,
            span,
            at: now(),
        };
        self.persist_and_apply(doctor_id, &mut guard, &event).await?;

        guard
            .appointment(appointment_id)
            .cloned()
            .ok_or_else(|| EngineError::Internal("rescheduled appointment vanished".into()))
    }

    /// Drive the appointment state machine. Legal moves: Scheduled →
    /// Confirmed/Cancelled, Confirmed → Completed/Cancelled. Everything
    /// else is rejected with both states named.
    pub async fn change_status(
        &self,
        appointment_id: Ulid,
        status: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let _permit = self.commit_permit().await;
        let (doctor_id, mut guard) = self.resolve_appointment_write(&appointment_id).await?;
        let current = guard
            .appointment(appointment_id)
            .ok_or(EngineError::NotFound(appointment_id))?;
        if !current.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let event = Event::AppointmentStatusChanged {
            id: appointment_id,
            doctor_id,
            status,
            at: now(),
        };
        self.persist_and_apply(doctor_id, &mut guard, &event).await?;

        guard
            .appointment(appointment_id)
            .cloned()
            .ok_or_else(|| EngineError::Internal("appointment vanished".into()))
    }

    /// Cancel an appointment. Cancelling frees its interval and window
    /// immediately: the next booking for the same slot succeeds.
    pub async fn cancel(&self, appointment_id: Ulid) -> Result<(), EngineError> {
        self.change_status(appointment_id, AppointmentStatus::Cancelled)
            .await
            .map(|_| ())
    }
}
