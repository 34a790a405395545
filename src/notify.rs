use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for schedule-change watchers, one channel per doctor.
/// A front end showing a doctor's agenda subscribes here and re-renders
/// on every committed event.
pub struct ScheduleHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for ScheduleHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a doctor's schedule. Creates the channel if needed.
    pub fn subscribe(&self, doctor_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(doctor_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish a committed event. No-op if nobody is watching.
    pub fn send(&self, doctor_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&doctor_id) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn remove(&self, doctor_id: &Ulid) {
        self.channels.remove(doctor_id);
    }
}
