//! End-to-end flow through the public API: directory setup, recurring
//! availability, booking, lifecycle, and live schedule notifications.

use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate, NaiveTime};
use ulid::Ulid;

use medbook::notify::ScheduleHub;
use medbook::{
    AppointmentStatus, BookingRequest, BulkOutcome, Doctor, Engine, Event, InMemoryRecords,
    Patient, RecordStore, SlotState, WeekdaySet,
};

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn day(offset: i64) -> NaiveDate {
    Local::now().date_naive() + Duration::days(offset)
}

#[tokio::test]
async fn full_clinic_flow() {
    let journal = std::env::temp_dir().join(format!("medbook-flow-{}.journal", Ulid::new()));
    let records = Arc::new(InMemoryRecords::new());
    let hub = Arc::new(ScheduleHub::new());

    let doctor = Doctor {
        id: Ulid::new(),
        name: "Dr. Souza".into(),
        specialty: "cardiology".into(),
        crm: "CRM-12345".into(),
        email: "souza@clinic.test".into(),
    };
    let patient = Patient {
        id: Ulid::new(),
        name: "Ana Lima".into(),
        cpf: "111.222.333-44".into(),
        email: "ana@mail.test".into(),
    };
    records.put_doctor(doctor.clone()).await.unwrap();
    records.put_patient(patient.clone()).await.unwrap();

    let engine = Engine::new(journal.clone(), records.clone(), hub.clone()).unwrap();
    let mut watcher = hub.subscribe(doctor.id);

    // Publish a week of availability, every day 09:00-11:00 in 30-minute slots.
    let all_days = WeekdaySet::new(&[0, 1, 2, 3, 4, 5, 6]).unwrap();
    let outcomes = engine
        .publish_recurring(doctor.id, day(1), day(7), all_days, hm(9, 0), hm(11, 0), 30)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 7 * 4);
    assert!(outcomes.iter().all(|o| matches!(o, BulkOutcome::Created(_))));

    // Book the first slot of day 1.
    let bookable = engine.find_bookable(doctor.id, day(1)).await;
    assert_eq!(bookable.len(), 4);
    let slot = bookable[0];
    let appt = engine
        .book(
            patient.id,
            doctor.id,
            BookingRequest::Window(slot.id),
            Some("routine check-up".into()),
        )
        .await
        .unwrap();
    assert_eq!(appt.status, AppointmentStatus::Scheduled);

    // Slot is gone from availability, day view shows it booked.
    assert_eq!(engine.find_bookable(doctor.id, day(1)).await.len(), 3);
    let view = engine.day_view(doctor.id, day(1)).await;
    assert_eq!(view[0].state, SlotState::Booked);
    assert_eq!(view[1].state, SlotState::Available);

    // Confirm, then complete.
    engine
        .change_status(appt.id, AppointmentStatus::Confirmed)
        .await
        .unwrap();
    let done = engine
        .change_status(appt.id, AppointmentStatus::Completed)
        .await
        .unwrap();
    assert_eq!(done.status, AppointmentStatus::Completed);

    // The watcher saw every committed change, in order.
    let mut booked = 0;
    let mut published = 0;
    let mut status_changes = Vec::new();
    while let Ok(event) = watcher.try_recv() {
        match event {
            Event::WindowPublished { .. } => published += 1,
            Event::AppointmentBooked { .. } => booked += 1,
            Event::AppointmentStatusChanged { status, .. } => status_changes.push(status),
            _ => {}
        }
    }
    assert_eq!(published, 28);
    assert_eq!(booked, 1);
    assert_eq!(
        status_changes,
        vec![AppointmentStatus::Confirmed, AppointmentStatus::Completed]
    );

    // Restart from the journal with the same directory: state is intact.
    let revived = Engine::new(journal, records, Arc::new(ScheduleHub::new())).unwrap();
    let restored = revived.get_appointment(appt.id).await.unwrap();
    assert_eq!(restored.status, AppointmentStatus::Completed);
    assert_eq!(restored.observations.as_deref(), Some("routine check-up"));
    assert_eq!(revived.find_bookable(doctor.id, day(2)).await.len(), 4);
}
