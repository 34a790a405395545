use ulid::Ulid;

use crate::model::{AppointmentStatus, Stamp};

/// Every rejected operation carries a distinguishable reason: a caller must
/// be able to tell "pick another time" apart from "system is down".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NotFound(Ulid),
    /// Requested start lies in the past.
    PastDate(Stamp),
    /// `end <= start`.
    InvalidOrder,
    /// Duration outside the allowed bounds (minutes).
    Duration(i64),
    /// Interval not covered by any active availability window, or the
    /// referenced window is inactive/occupied.
    Unavailable(&'static str),
    /// Overlap with an existing blocking appointment.
    Conflict(Ulid),
    /// New availability window overlaps an existing active one.
    Overlap(Ulid),
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    /// Recurring date range with `end < start`.
    InvalidRange,
    Validation(&'static str),
    LimitExceeded(&'static str),
    /// Journal failure that survived the bounded retry.
    Internal(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::PastDate(t) => write!(f, "start is in the past: {t}"),
            EngineError::InvalidOrder => write!(f, "end must be after start"),
            EngineError::Duration(mins) => {
                write!(f, "duration of {mins} minutes is out of bounds")
            }
            EngineError::Unavailable(why) => write!(f, "not bookable: {why}"),
            EngineError::Conflict(id) => write!(f, "conflict with appointment: {id}"),
            EngineError::Overlap(id) => write!(f, "overlaps availability window: {id}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "illegal status change: {from} -> {to}")
            }
            EngineError::InvalidRange => write!(f, "date range end is before start"),
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
