use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::records::RecordError;
use crate::slots::{fixed_slots, recurring_dates, WeekdaySet};

use super::conflict::{check_window_overlap, now, validate_window_span};
use super::{Engine, EngineError};

/// Per-slot result of a bulk availability request. Nothing is swallowed:
/// the caller sees exactly which slots were created, which already existed
/// and which were rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    Created(Window),
    SkippedDuplicate(Span),
    Failed(Span, EngineError),
}

impl Engine {
    pub(super) fn store_error(e: RecordError) -> EngineError {
        EngineError::Internal(e.to_string())
    }

    pub(super) async fn require_doctor(&self, doctor_id: Ulid) -> Result<(), EngineError> {
        match self.records.get_doctor(doctor_id).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(EngineError::NotFound(doctor_id)),
            Err(e) => Err(Self::store_error(e)),
        }
    }

    /// Publish one availability window for a doctor on a calendar date.
    pub async fn publish_window(
        &self,
        doctor_id: Ulid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Window, EngineError> {
        // Raw construction: ordering is validated below, not asserted.
        let span = Span {
            start: date.and_time(start),
            end: date.and_time(end),
        };
        self.publish_window_span(doctor_id, span).await
    }

    /// Span-based variant of [`publish_window`].
    pub async fn publish_window_span(
        &self,
        doctor_id: Ulid,
        span: Span,
    ) -> Result<Window, EngineError> {
        self.require_doctor(doctor_id).await?;
        validate_window_span(&span, now().date())?;

        let _permit = self.commit_permit().await;
        let sched = self.schedule_entry(doctor_id);
        let mut guard = sched.write().await;
        if guard.windows.len() >= MAX_WINDOWS_PER_DOCTOR {
            return Err(EngineError::LimitExceeded("too many windows for doctor"));
        }
        check_window_overlap(&guard, &span, None)?;

        let id = Ulid::new();
        let event = Event::WindowPublished {
            id,
            doctor_id,
            span,
            active: true,
        };
        self.persist_and_apply(doctor_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::WINDOWS_PUBLISHED_TOTAL).increment(1);

        Ok(Window {
            id,
            span,
            active: true,
        })
    }

    /// Materialize recurring availability into individual bookable slots:
    /// every matching weekday between the two dates gets the daily window
    /// split into `step_minutes` slots. Returns one outcome per candidate
    /// slot; a candidate identical to an existing window is reported as
    /// skipped, a rejected candidate is reported with its reason.
    pub async fn publish_recurring(
        &self,
        doctor_id: Ulid,
        date_start: NaiveDate,
        date_end: NaiveDate,
        weekdays: WeekdaySet,
        day_start: NaiveTime,
        day_end: NaiveTime,
        step_minutes: i64,
    ) -> Result<Vec<BulkOutcome>, EngineError> {
        self.require_doctor(doctor_id).await?;
        if step_minutes <= 0 {
            return Err(EngineError::Validation("slot step must be positive"));
        }
        let dates = recurring_dates(date_start, date_end, weekdays)?;

        let mut candidates: Vec<Span> = Vec::new();
        for date in &dates {
            candidates.extend(fixed_slots(
                date.and_time(day_start),
                date.and_time(day_end),
                step_minutes,
            ));
        }
        if candidates.len() > MAX_BULK_SLOTS {
            return Err(EngineError::LimitExceeded("bulk request materializes too many slots"));
        }

        let today = now().date();
        let _permit = self.commit_permit().await;
        let sched = self.schedule_entry(doctor_id);
        let mut guard = sched.write().await;
        let mut outcomes = Vec::with_capacity(candidates.len());

        for span in candidates {
            if guard
                .windows_overlapping(&span)
                .any(|w| w.active && w.span == span)
            {
                outcomes.push(BulkOutcome::SkippedDuplicate(span));
                continue;
            }
            let checked = validate_window_span(&span, today)
                .and_then(|()| check_window_overlap(&guard, &span, None));
            if let Err(e) = checked {
                outcomes.push(BulkOutcome::Failed(span, e));
                continue;
            }
            if guard.windows.len() >= MAX_WINDOWS_PER_DOCTOR {
                outcomes.push(BulkOutcome::Failed(
                    span,
                    EngineError::LimitExceeded("too many windows for doctor"),
                ));
                continue;
            }

            let id = Ulid::new();
            let event = Event::WindowPublished {
                id,
                doctor_id,
                span,
                active: true,
            };
            self.persist_and_apply(doctor_id, &mut guard, &event).await?;
            metrics::counter!(crate::observability::WINDOWS_PUBLISHED_TOTAL).increment(1);
            outcomes.push(BulkOutcome::Created(Window {
                id,
                span,
                active: true,
            }));
        }

        Ok(outcomes)
    }

    /// Move or toggle a window. The new span is revalidated against the
    /// doctor's other active windows, and an occupied window cannot move
    /// while its appointment stands.
    pub async fn update_window(
        &self,
        window_id: Ulid,
        span: Span,
        active: bool,
    ) -> Result<Window, EngineError> {
        let doctor_id = self
            .doctor_for_window(&window_id)
            .ok_or(EngineError::NotFound(window_id))?;
        let sched = self
            .get_schedule(&doctor_id)
            .ok_or(EngineError::NotFound(doctor_id))?;
        let _permit = self.commit_permit().await;
        let mut guard = sched.write().await;
        let current = *guard.window(window_id).ok_or(EngineError::NotFound(window_id))?;

        if span.end <= span.start {
            return Err(EngineError::InvalidOrder);
        }
        if span.start.date() != span.end.date() {
            return Err(EngineError::Validation("window must not cross midnight"));
        }
        // Moving an occupied window would strand its appointment outside
        // any published availability.
        if span != current.span
            && let Some(occupant) = guard.occupant_of(&current)
        {
            return Err(EngineError::Conflict(occupant));
        }
        if active {
            check_window_overlap(&guard, &span, Some(window_id))?;
        }

        let event = Event::WindowUpdated {
            id: window_id,
            doctor_id,
            span,
            active,
        };
        self.persist_and_apply(doctor_id, &mut guard, &event).await?;
        Ok(Window {
            id: window_id,
            span,
            active,
        })
    }

    /// Logical removal: the window stops being bookable but its history
    /// (and any appointment referencing it) stays intact.
    pub async fn deactivate_window(&self, window_id: Ulid) -> Result<(), EngineError> {
        let doctor_id = self
            .doctor_for_window(&window_id)
            .ok_or(EngineError::NotFound(window_id))?;
        let sched = self
            .get_schedule(&doctor_id)
            .ok_or(EngineError::NotFound(doctor_id))?;
        let _permit = self.commit_permit().await;
        let mut guard = sched.write().await;
        if guard.window(window_id).is_none() {
            return Err(EngineError::NotFound(window_id));
        }

        let event = Event::WindowDeactivated {
            id: window_id,
            doctor_id,
        };
        self.persist_and_apply(doctor_id, &mut guard, &event).await
    }

    /// Hard removal. Refused while any non-cancelled appointment holds the
    /// window; deactivate instead.
    pub async fn remove_window(&self, window_id: Ulid) -> Result<(), EngineError> {
        let doctor_id = self
            .doctor_for_window(&window_id)
            .ok_or(EngineError::NotFound(window_id))?;
        let sched = self
            .get_schedule(&doctor_id)
            .ok_or(EngineError::NotFound(doctor_id))?;
        let _permit = self.commit_permit().await;
        let mut guard = sched.write().await;
        let window = *guard.window(window_id).ok_or(EngineError::NotFound(window_id))?;

        if let Some(occupant) = guard.occupant_of(&window) {
            return Err(EngineError::Conflict(occupant));
        }

        let event = Event::WindowRemoved {
            id: window_id,
            doctor_id,
        };
        self.persist_and_apply(doctor_id, &mut guard, &event).await
    }
}
