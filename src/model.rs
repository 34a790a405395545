use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Naive local wall-clock time, the only time type. Minute granularity;
/// the clinic domain has no timezone handling.
pub type Stamp = NaiveDateTime;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Stamp,
    pub end: Stamp,
}

impl Span {
    pub fn new(start: Stamp, end: Stamp) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Build a same-day span from a date plus two wall-clock times.
    pub fn on_day(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        Self::new(date.and_time(start), date.and_time(end))
    }

    /// The whole calendar day `[00:00, next day 00:00)`.
    pub fn whole_day(date: NaiveDate) -> Self {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        Self {
            start: date.and_time(midnight),
            end: date.succ_opt().unwrap_or(date).and_time(midnight),
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Stamp) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }
}

/// Appointment lifecycle. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses that hold the interval against other bookings.
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Scheduled | Self::Confirmed)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Confirmed)
                | (Self::Scheduled, Self::Cancelled)
                | (Self::Confirmed, Self::Completed)
                | (Self::Confirmed, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A published availability window. A 30-minute window produced by the bulk
/// generator is what the clinic UI calls a "slot": same entity, pre-split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub id: Ulid,
    pub span: Span,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub doctor_id: Ulid,
    pub patient_id: Ulid,
    /// Set when the booking consumed a specific window. Occupancy is always
    /// derived from this reference plus status, never a stored flag.
    pub window_id: Option<Ulid>,
    pub span: Span,
    pub status: AppointmentStatus,
    pub observations: Option<String>,
    pub created_at: Stamp,
    pub updated_at: Stamp,
}

/// How a caller names the time it wants. All three legacy shapes collapse
/// into a `Span` before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingRequest {
    /// Book a published window by id.
    Window(Ulid),
    /// Book an explicit `[start, end)` range.
    Interval(Span),
    /// Book a single instant with the default slot duration.
    At(Stamp),
}

/// Directory records live in the Record Store, not the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Ulid,
    pub name: String,
    pub specialty: String,
    pub crm: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Ulid,
    pub name: String,
    pub cpf: String,
    pub email: String,
}

/// Per-doctor scheduling state. Both vecs stay sorted by `span.start` so
/// windowed queries can binary-search instead of scanning everything.
#[derive(Debug, Clone)]
pub struct DoctorSchedule {
    pub doctor_id: Ulid,
    pub windows: Vec<Window>,
    pub appointments: Vec<Appointment>,
}

impl DoctorSchedule {
    pub fn new(doctor_id: Ulid) -> Self {
        Self {
            doctor_id,
            windows: Vec::new(),
            appointments: Vec::new(),
        }
    }

    pub fn insert_window(&mut self, window: Window) {
        let pos = self
            .windows
            .binary_search_by_key(&window.span.start, |w| w.span.start)
            .unwrap_or_else(|e| e);
        self.windows.insert(pos, window);
    }

    pub fn remove_window(&mut self, id: Ulid) -> Option<Window> {
        let pos = self.windows.iter().position(|w| w.id == id)?;
        Some(self.windows.remove(pos))
    }

    pub fn window(&self, id: Ulid) -> Option<&Window> {
        self.windows.iter().find(|w| w.id == id)
    }

    pub fn window_mut(&mut self, id: Ulid) -> Option<&mut Window> {
        self.windows.iter_mut().find(|w| w.id == id)
    }

    pub fn insert_appointment(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .binary_search_by_key(&appointment.span.start, |a| a.span.start)
            .unwrap_or_else(|e| e);
        self.appointments.insert(pos, appointment);
    }

    pub fn remove_appointment(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn appointment(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn appointment_mut(&mut self, id: Ulid) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == id)
    }

    /// Windows whose span overlaps the query window. Everything at index >=
    /// the partition point starts at or after `query.end` and cannot overlap.
    pub fn windows_overlapping(&self, query: &Span) -> impl Iterator<Item = &Window> {
        let right = self.windows.partition_point(|w| w.span.start < query.end);
        self.windows[..right]
            .iter()
            .filter(move |w| w.span.end > query.start)
    }

    /// Appointments whose span overlaps the query window.
    pub fn appointments_overlapping(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        let right = self
            .appointments
            .partition_point(|a| a.span.start < query.end);
        self.appointments[..right]
            .iter()
            .filter(move |a| a.span.end > query.start)
    }

    /// Derived occupancy: the id of the non-cancelled appointment that
    /// consumes this window, if any. Checks interval overlap first (an
    /// explicit-range booking also occupies the window it lands on), then
    /// the window reference for appointments whose span no longer overlaps.
    pub fn occupant_of(&self, window: &Window) -> Option<Ulid> {
        for a in self.appointments_overlapping(&window.span) {
            if a.status.is_blocking() {
                return Some(a.id);
            }
        }
        self.appointments
            .iter()
            .find(|a| a.window_id == Some(window.id) && a.status != AppointmentStatus::Cancelled)
            .map(|a| a.id)
    }
}

/// Journal record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    WindowPublished {
        id: Ulid,
        doctor_id: Ulid,
        span: Span,
        active: bool,
    },
    WindowUpdated {
        id: Ulid,
        doctor_id: Ulid,
        span: Span,
        active: bool,
    },
    WindowDeactivated {
        id: Ulid,
        doctor_id: Ulid,
    },
    WindowRemoved {
        id: Ulid,
        doctor_id: Ulid,
    },
    AppointmentBooked {
        id: Ulid,
        doctor_id: Ulid,
        patient_id: Ulid,
        window_id: Option<Ulid>,
        span: Span,
        observations: Option<String>,
        at: Stamp,
    },
    AppointmentRescheduled {
        id: Ulid,
        doctor_id: Ulid,
        window_id: Option<Ulid>,
        span: Span,
        at: Stamp,
    },
    AppointmentStatusChanged {
        id: Ulid,
        doctor_id: Ulid,
        status: AppointmentStatus,
        at: Stamp,
    },
}

impl Event {
    /// Which doctor's schedule this event belongs to.
    pub fn doctor_id(&self) -> Ulid {
        match self {
            Event::WindowPublished { doctor_id, .. }
            | Event::WindowUpdated { doctor_id, .. }
            | Event::WindowDeactivated { doctor_id, .. }
            | Event::WindowRemoved { doctor_id, .. }
            | Event::AppointmentBooked { doctor_id, .. }
            | Event::AppointmentRescheduled { doctor_id, .. }
            | Event::AppointmentStatusChanged { doctor_id, .. } => *doctor_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// One 30-minute mark of a doctor's day view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DaySlot {
    pub window_id: Ulid,
    pub span: Span,
    pub state: SlotState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlotState {
    Available,
    Booked,
    Inactive,
}
