//! medbook: clinic appointment availability & booking engine.
//!
//! Doctors publish availability windows; patients book, confirm, complete
//! or cancel appointments against them. All scheduling state is kept in
//! memory, one schedule per doctor, and every committed change is
//! journaled so a restart replays back to the same state. The doctor and
//! patient directory lives behind the [`records::RecordStore`] trait,
//! injected at engine construction.

pub mod engine;
pub mod journal;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod records;
pub mod slots;

pub use engine::{BulkOutcome, Engine, EngineError};
pub use model::{
    Appointment, AppointmentStatus, BookingRequest, DaySlot, Doctor, DoctorSchedule, Event,
    Patient, SlotState, Span, Stamp, Window,
};
pub use records::{InMemoryRecords, RecordError, RecordStore};
pub use slots::{fixed_slots, recurring_dates, WeekdaySet};
