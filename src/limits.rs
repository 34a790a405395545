//! Hard limits. Everything here is a guard against unbounded input, not a
//! tuning knob.

/// Default bookable unit, and the step the bulk generator splits windows into.
pub const SLOT_MINUTES: i64 = 30;

/// Explicit-interval bookings must last at least this long.
pub const MIN_APPOINTMENT_MINUTES: i64 = 30;

/// ... and at most this long (4 hours).
pub const MAX_APPOINTMENT_MINUTES: i64 = 240;

pub const MAX_WINDOWS_PER_DOCTOR: usize = 50_000;
pub const MAX_APPOINTMENTS_PER_DOCTOR: usize = 100_000;

/// Upper bound on slots a single recurring-availability request may materialize.
pub const MAX_BULK_SLOTS: usize = 10_000;

pub const MAX_OBSERVATIONS_LEN: usize = 2_000;

/// Widest range a listing/day-view query may cover.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 366;

/// Journal appends are the only retryable failure class.
pub const JOURNAL_RETRY_ATTEMPTS: u32 = 3;
pub const JOURNAL_RETRY_BACKOFF_MS: u64 = 20;
