mod availability;
mod booking;
mod conflict;
mod error;
mod queries;

pub use availability::BulkOutcome;
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::journal::Journal;
use crate::limits::{JOURNAL_RETRY_ATTEMPTS, JOURNAL_RETRY_BACKOFF_MS};
use crate::model::*;
use crate::notify::ScheduleHub;
use crate::records::RecordStore;

pub type SharedSchedule = Arc<RwLock<DoctorSchedule>>;

// ── Group-commit journal channel ─────────────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group
/// commit: buffer the first append, drain whatever else is immediately
/// available, then one fsync for the whole batch before answering anyone.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let JournalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut journal, cmd);
            continue;
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(JournalCommand::Append { event, response }) => {
                    batch.push((event, response));
                }
                Ok(other) => {
                    // Commit the batch first so the non-append command sees it.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break, // channel empty
            }
        }

        metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
            .record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut journal, &batch);
        metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());

        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }
        if let Some(cmd) = deferred {
            handle_non_append(&mut journal, cmd);
        }
    }
}

fn flush_batch(
    journal: &mut Journal,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = journal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────────────

/// The availability & booking engine. One in-memory schedule per doctor,
/// rebuilt from the journal at startup; the doctor/patient directory lives
/// behind the injected [`RecordStore`].
pub struct Engine {
    pub(super) schedules: DashMap<Ulid, SharedSchedule>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<ScheduleHub>,
    pub(super) records: Arc<dyn RecordStore>,
    /// Reverse lookups: window/appointment id → doctor id.
    pub(super) window_index: DashMap<Ulid, Ulid>,
    pub(super) appointment_index: DashMap<Ulid, Ulid>,
    /// Every mutation holds this in read mode for its full span; compaction
    /// takes it in write mode, so a snapshot can never miss an event that a
    /// caller was already told is committed.
    commit_gate: Arc<RwLock<()>>,
}

/// Apply an event directly to a DoctorSchedule. No locking; the caller
/// holds the write lock.
fn apply_to_schedule(
    sched: &mut DoctorSchedule,
    event: &Event,
    window_index: &DashMap<Ulid, Ulid>,
    appointment_index: &DashMap<Ulid, Ulid>,
) {
    match event {
        Event::WindowPublished {
            id,
            doctor_id,
            span,
            active,
        } => {
            sched.insert_window(Window {
                id: *id,
                span: *span,
                active: *active,
            });
            window_index.insert(*id, *doctor_id);
        }
        Event::WindowUpdated {
            id,
            doctor_id,
            span,
            active,
        } => {
            sched.remove_window(*id);
            sched.insert_window(Window {
                id: *id,
                span: *span,
                active: *active,
            });
            window_index.insert(*id, *doctor_id);
        }
        Event::WindowDeactivated { id, .. } => {
            if let Some(w) = sched.window_mut(*id) {
                w.active = false;
            }
        }
        Event::WindowRemoved { id, .. } => {
            sched.remove_window(*id);
            window_index.remove(id);
        }
        Event::AppointmentBooked {
            id,
            doctor_id,
            patient_id,
            window_id,
            span,
            observations,
            at,
        } => {
            sched.insert_appointment(Appointment {
                id: *id,
                doctor_id: *doctor_id,
                patient_id: *patient_id,
                window_id: *window_id,
                span: *span,
                status: AppointmentStatus::Scheduled,
                observations: observations.clone(),
                created_at: *at,
                updated_at: *at,
            });
            appointment_index.insert(*id, *doctor_id);
        }
        Event::AppointmentRescheduled {
            id,
            window_id,
            span,
            at,
            ..
        } => {
            // Remove and reinsert so the sort order follows the new start.
            if let Some(mut appt) = sched.remove_appointment(*id) {
                appt.window_id = *window_id;
                appt.span = *span;
                appt.updated_at = *at;
                sched.insert_appointment(appt);
            }
        }
        Event::AppointmentStatusChanged { id, status, at, .. } => {
            if let Some(appt) = sched.appointment_mut(*id) {
                appt.status = *status;
                appt.updated_at = *at;
            }
        }
    }
}

impl Engine {
    pub fn new(
        journal_path: PathBuf,
        records: Arc<dyn RecordStore>,
        notify: Arc<ScheduleHub>,
    ) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            schedules: DashMap::new(),
            journal_tx,
            notify,
            records,
            window_index: DashMap::new(),
            appointment_index: DashMap::new(),
            commit_gate: Arc::new(RwLock::new(())),
        };

        // Replay: we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never blocking_write here: this may run inside
        // an async context.
        for event in &events {
            let shared = engine.schedule_entry(event.doctor_id());
            let mut guard = shared.try_write().expect("replay: uncontended write");
            apply_to_schedule(
                &mut guard,
                event,
                &engine.window_index,
                &engine.appointment_index,
            );
        }

        Ok(engine)
    }

    /// Taken at the start of every mutating operation, before any schedule
    /// lock. Held until the operation returns.
    pub(super) async fn commit_permit(&self) -> tokio::sync::OwnedRwLockReadGuard<()> {
        self.commit_gate.clone().read_owned().await
    }

    /// Get or lazily create the schedule for a doctor.
    pub(super) fn schedule_entry(&self, doctor_id: Ulid) -> SharedSchedule {
        self.schedules
            .entry(doctor_id)
            .or_insert_with(|| {
                metrics::gauge!(crate::observability::SCHEDULES_ACTIVE).increment(1.0);
                Arc::new(RwLock::new(DoctorSchedule::new(doctor_id)))
            })
            .value()
            .clone()
    }

    pub fn get_schedule(&self, doctor_id: &Ulid) -> Option<SharedSchedule> {
        self.schedules.get(doctor_id).map(|e| e.value().clone())
    }

    pub fn doctor_for_window(&self, window_id: &Ulid) -> Option<Ulid> {
        self.window_index.get(window_id).map(|e| *e.value())
    }

    pub fn doctor_for_appointment(&self, appointment_id: &Ulid) -> Option<Ulid> {
        self.appointment_index.get(appointment_id).map(|e| *e.value())
    }

    /// One journal append attempt through the group-commit writer.
    async fn try_journal_append(&self, event: &Event) -> Result<(), String> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| "journal writer shut down".to_string())?;
        rx.await
            .map_err(|_| "journal writer dropped response".to_string())?
            .map_err(|e| e.to_string())
    }

    /// Journal append with bounded retry. Only this I/O path is retryable;
    /// business-rule rejections happen before any append and never retry.
    async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.try_journal_append(event).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < JOURNAL_RETRY_ATTEMPTS => {
                    metrics::counter!(crate::observability::JOURNAL_RETRIES_TOTAL).increment(1);
                    tracing::warn!("journal append attempt {attempt} failed: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(
                        JOURNAL_RETRY_BACKOFF_MS * u64::from(attempt),
                    ))
                    .await;
                }
                Err(e) => return Err(EngineError::Internal(e)),
            }
        }
    }

    /// Journal + apply + notify in one call, with the caller holding the
    /// doctor's write lock. The append happens inside the critical section,
    /// which is what makes check-then-book atomic per doctor.
    pub(super) async fn persist_and_apply(
        &self,
        doctor_id: Ulid,
        sched: &mut DoctorSchedule,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.journal_append(event).await?;
        apply_to_schedule(sched, event, &self.window_index, &self.appointment_index);
        self.notify.send(doctor_id, event);
        Ok(())
    }

    /// Lookup appointment → doctor, acquire the schedule write lock.
    pub(super) async fn resolve_appointment_write(
        &self,
        appointment_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<DoctorSchedule>), EngineError> {
        let doctor_id = self
            .doctor_for_appointment(appointment_id)
            .ok_or(EngineError::NotFound(*appointment_id))?;
        let sched = self
            .get_schedule(&doctor_id)
            .ok_or(EngineError::NotFound(doctor_id))?;
        let guard = sched.write_owned().await;
        Ok((doctor_id, guard))
    }

    /// Rewrite the journal with only the events needed to recreate the
    /// current state. Mutations are quiesced for the duration: the write
    /// side of the commit gate guarantees no append sits between the
    /// snapshot and the compact swap, so nothing a caller saw committed
    /// can be erased by the rename.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let _quiesce = self.commit_gate.write().await;
        let mut events = Vec::new();

        let doctor_ids: Vec<Ulid> = self.schedules.iter().map(|e| *e.key()).collect();
        for doctor_id in doctor_ids {
            let Some(shared) = self.get_schedule(&doctor_id) else {
                continue;
            };
            let guard = shared.read().await;
            for w in &guard.windows {
                events.push(Event::WindowPublished {
                    id: w.id,
                    doctor_id,
                    span: w.span,
                    active: w.active,
                });
            }
            for a in &guard.appointments {
                events.push(Event::AppointmentBooked {
                    id: a.id,
                    doctor_id,
                    patient_id: a.patient_id,
                    window_id: a.window_id,
                    span: a.span,
                    observations: a.observations.clone(),
                    at: a.created_at,
                });
                if a.status != AppointmentStatus::Scheduled {
                    events.push(Event::AppointmentStatusChanged {
                        id: a.id,
                        doctor_id,
                        status: a.status,
                        at: a.updated_at,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Internal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Internal("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Internal(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
