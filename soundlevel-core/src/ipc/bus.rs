use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::events::MeasurementEvent;

/// Fan-out of [`MeasurementEvent`]s to any number of subscribers.
///
/// Each subscriber gets its own unbounded channel, so a slow reader never
/// loses records and never blocks the publishing consumer. Subscribers that
/// dropped their receiver are pruned on the next publish.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<MeasurementEvent>>>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<MeasurementEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: MeasurementEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Events published since creation.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::events::{LifecycleEvent, LifecycleState};

    fn closed() -> MeasurementEvent {
        MeasurementEvent::LifecycleTransition(LifecycleEvent {
            state: LifecycleState::Closed,
            previous: None,
            detail: None,
        })
    }

    #[test]
    fn every_subscriber_receives_every_event() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(closed());
        bus.publish(closed());
        assert_eq!(a.try_iter().count(), 2);
        assert_eq!(b.try_iter().count(), 2);
        assert_eq!(bus.published(), 2);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        bus.publish(closed());
        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }
}
