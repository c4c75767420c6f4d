use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::info;

use crate::ipc::bus::EventBus;
use crate::ipc::events::{LifecycleEvent, LifecycleState, MeasurementEvent};

/// `Idle → Capturing → DrainPending → Closed`, published on every change.
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
    changed: Condvar,
    bus: Arc<EventBus>,
}

impl Lifecycle {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            state: Mutex::new(LifecycleState::Idle),
            changed: Condvar::new(),
            bus,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Move to `to`. No-op (returns `false`) when already there or closed.
    ///
    /// The event is published under the state lock so subscribers observe
    /// transitions in order.
    pub fn transition(&self, to: LifecycleState, detail: Option<String>) -> bool {
        let mut state = self.state.lock();
        let from = *state;
        if from == to || from.is_terminal() {
            return false;
        }
        *state = to;
        info!(from = ?from, to = ?to, detail = detail.as_deref().unwrap_or(""), "lifecycle transition");
        self.bus
            .publish(MeasurementEvent::LifecycleTransition(LifecycleEvent {
                state: to,
                previous: Some(from),
                detail,
            }));
        self.changed.notify_all();
        true
    }

    /// Block until `Closed` or until `timeout` elapses. Returns whether closed.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.is_terminal() {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.is_terminal();
            }
        }
        true
    }
}
