//! Booking throughput stress run: one doctor with a wide-open schedule,
//! back-to-back slot bookings hammered through the engine, latency
//! percentiles printed at the end. Run with `cargo bench`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Local, NaiveTime};
use ulid::Ulid;

use medbook::notify::ScheduleHub;
use medbook::{BookingRequest, Doctor, Engine, InMemoryRecords, Patient, RecordStore};

const DAYS: i64 = 200;
const SLOTS_PER_DAY: u32 = 16; // 08:00-16:00 in 30-minute steps

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let idx = ((sorted.len() as f64 - 1.0) * p / 100.0).round() as usize;
    sorted[idx]
}

fn print_latency(label: &str, mut samples: Vec<Duration>, elapsed: Duration) {
    samples.sort();
    let n = samples.len();
    println!(
        "{label}: {n} ops in {:.2?} ({:.0} ops/s)",
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
    for p in [50.0, 90.0, 99.0, 99.9] {
        println!("  p{p:<5} {:?}", percentile(&samples, p));
    }
}

async fn run() {
    let journal = std::env::temp_dir().join(format!("medbook-bench-{}.journal", Ulid::new()));
    let records = Arc::new(InMemoryRecords::new());
    let doctor = Doctor {
        id: Ulid::new(),
        name: "Dr. Bench".into(),
        specialty: "cardiology".into(),
        crm: "CRM-BENCH".into(),
        email: "bench@clinic.test".into(),
    };
    let patient = Patient {
        id: Ulid::new(),
        name: "Bench Patient".into(),
        cpf: "000.000.000-00".into(),
        email: "bench@mail.test".into(),
    };
    let doctor_id = doctor.id;
    let patient_id = patient.id;
    records.put_doctor(doctor).await.unwrap();
    records.put_patient(patient).await.unwrap();
    let engine = Arc::new(Engine::new(journal.clone(), records, Arc::new(ScheduleHub::new())).unwrap());

    // Seed availability: wide daily windows far enough ahead to dodge
    // the past-date check.
    let first_day = Local::now().date_naive() + ChronoDuration::days(1);
    let open = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
    let close = NaiveTime::from_hms_opt(16, 0, 0).unwrap();
    let seed_start = Instant::now();
    let mut windows = Vec::new();
    for d in 0..DAYS {
        let w = engine
            .publish_window(doctor_id, first_day + ChronoDuration::days(d), open, close)
            .await
            .unwrap();
        windows.push(w);
    }
    println!("seeded {} windows in {:.2?}", windows.len(), seed_start.elapsed());

    // Sequential bookings, one per slot.
    let mut samples = Vec::with_capacity((DAYS as usize) * SLOTS_PER_DAY as usize);
    let bench_start = Instant::now();
    for w in &windows {
        for slot in 0..SLOTS_PER_DAY {
            let at = w.span.start + ChronoDuration::minutes(30 * i64::from(slot));
            let op_start = Instant::now();
            engine
                .book(patient_id, doctor_id, BookingRequest::At(at), None)
                .await
                .unwrap();
            samples.push(op_start.elapsed());
        }
    }
    print_latency("book", samples, bench_start.elapsed());

    // Every slot taken: rejections should be as cheap as admissions.
    let mut samples = Vec::with_capacity(windows.len());
    let bench_start = Instant::now();
    for w in &windows {
        let op_start = Instant::now();
        let result = engine
            .book(patient_id, doctor_id, BookingRequest::At(w.span.start), None)
            .await;
        assert!(result.is_err());
        samples.push(op_start.elapsed());
    }
    print_latency("book (conflict)", samples, bench_start.elapsed());

    let _ = std::fs::remove_file(journal);
}

fn main() {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(run());
}
