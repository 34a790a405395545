use chrono::{Local, NaiveDate, Timelike};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now() -> Stamp {
    Local::now().naive_local()
}

fn minute_aligned(t: Stamp) -> bool {
    t.time().second() == 0 && t.time().nanosecond() == 0
}

/// Validate an availability window at publish time: ordering, minute
/// granularity, single calendar day, not in the past.
pub(crate) fn validate_window_span(span: &Span, today: NaiveDate) -> Result<(), EngineError> {
    if span.end <= span.start {
        return Err(EngineError::InvalidOrder);
    }
    if !minute_aligned(span.start) || !minute_aligned(span.end) {
        return Err(EngineError::Validation("times must be HH:MM, minute granularity"));
    }
    if span.start.date() != span.end.date() {
        return Err(EngineError::Validation("window must not cross midnight"));
    }
    if span.date() < today {
        return Err(EngineError::PastDate(span.start));
    }
    Ok(())
}

/// Booking-request validation: ordering, granularity, not in the past,
/// duration within bounds.
pub(crate) fn validate_booking_span(span: &Span, now: Stamp) -> Result<(), EngineError> {
    if span.end <= span.start {
        return Err(EngineError::InvalidOrder);
    }
    if !minute_aligned(span.start) || !minute_aligned(span.end) {
        return Err(EngineError::Validation("times must be HH:MM, minute granularity"));
    }
    if span.start < now {
        return Err(EngineError::PastDate(span.start));
    }
    let minutes = span.duration_minutes();
    if !(MIN_APPOINTMENT_MINUTES..=MAX_APPOINTMENT_MINUTES).contains(&minutes) {
        return Err(EngineError::Duration(minutes));
    }
    Ok(())
}

/// The requested interval must sit entirely inside one active window.
/// Publishing keeps active windows disjoint, so a single containing window
/// is the only way an interval can be covered.
pub(crate) fn check_covered(sched: &DoctorSchedule, span: &Span) -> Result<(), EngineError> {
    for w in sched.windows_overlapping(span) {
        if w.active && w.span.contains_span(span) {
            return Ok(());
        }
    }
    Err(EngineError::Unavailable(
        "interval not covered by published availability",
    ))
}

/// No Scheduled/Confirmed appointment of this doctor may overlap the span.
/// `exclude` skips the appointment being rescheduled.
pub(crate) fn check_no_conflict(
    sched: &DoctorSchedule,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for a in sched.appointments_overlapping(span) {
        if exclude == Some(a.id) {
            continue;
        }
        if a.status.is_blocking() {
            return Err(EngineError::Conflict(a.id));
        }
    }
    Ok(())
}

/// A new or updated window may not overlap any other active window of the
/// same doctor.
pub(crate) fn check_window_overlap(
    sched: &DoctorSchedule,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for w in sched.windows_overlapping(span) {
        if exclude == Some(w.id) {
            continue;
        }
        if w.active {
            return Err(EngineError::Overlap(w.id));
        }
    }
    Ok(())
}
