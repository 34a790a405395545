//! Background journal maintenance. The journal grows by one record per
//! committed change; once enough appends accumulate it gets rewritten from
//! live state so restarts stay fast.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::Engine;

/// Compact once the journal carries this many appends beyond the last
/// compaction.
pub const COMPACT_THRESHOLD: u64 = 10_000;

pub const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// One maintenance pass. Returns true if a compaction ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.journal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    tracing::info!(appends, "compacting journal");
    match engine.compact_journal().await {
        Ok(()) => true,
        Err(e) => {
            // Non-fatal: the journal is bigger than it needs to be, state
            // is untouched. Try again next tick.
            tracing::error!("journal compaction failed: {e}");
            false
        }
    }
}

/// Periodic compaction loop. Spawn once next to the engine.
pub async fn run_compactor(engine: Arc<Engine>) {
    let mut ticker = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        compact_if_needed(&engine, COMPACT_THRESHOLD).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Doctor, Patient};
    use crate::notify::ScheduleHub;
    use crate::records::{InMemoryRecords, RecordStore};
    use chrono::{Duration as ChronoDuration, Local, NaiveTime};
    use ulid::Ulid;

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = std::env::temp_dir().join(format!("medbook-maint-{}.journal", Ulid::new()));
        let records = Arc::new(InMemoryRecords::new());
        let doctor = Doctor {
            id: Ulid::new(),
            name: "Dr. Souza".into(),
            specialty: "cardiology".into(),
            crm: "CRM-M1".into(),
            email: "m1@clinic.test".into(),
        };
        let patient = Patient {
            id: Ulid::new(),
            name: "Ana Lima".into(),
            cpf: "cpf-m1".into(),
            email: "pm1@mail.test".into(),
        };
        let doctor_id = doctor.id;
        records.put_doctor(doctor).await.unwrap();
        records.put_patient(patient).await.unwrap();
        let engine = Engine::new(path, records, Arc::new(ScheduleHub::new())).unwrap();

        let date = Local::now().date_naive() + ChronoDuration::days(1);
        for i in 0..4u32 {
            engine
                .publish_window(
                    doctor_id,
                    date,
                    NaiveTime::from_hms_opt(9 + i, 0, 0).unwrap(),
                    NaiveTime::from_hms_opt(9 + i, 30, 0).unwrap(),
                )
                .await
                .unwrap();
        }

        assert!(!compact_if_needed(&engine, 100).await);
        assert!(compact_if_needed(&engine, 4).await);
        assert_eq!(engine.journal_appends_since_compact().await, 0);
    }
}
