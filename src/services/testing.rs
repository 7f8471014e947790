//! Test doubles shared by the unit tests of the session services.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crate::services::timer::{Scheduler, TimerEvent, TimerHandle};

struct Armed {
    after: Duration,
    event: TimerEvent,
    cancelled: Arc<AtomicBool>,
}

/// Scheduler that only records armed timers; tests fire them by hand.
#[derive(Default)]
pub(crate) struct ManualScheduler {
    armed: Mutex<Vec<Armed>>,
}

impl ManualScheduler {
    /// Timers armed and not cancelled, oldest first.
    pub(crate) fn pending(&self) -> Vec<(Duration, TimerEvent)> {
        self.armed
            .lock()
            .unwrap()
            .iter()
            .filter(|armed| !armed.cancelled.load(Ordering::SeqCst))
            .map(|armed| (armed.after, armed.event.clone()))
            .collect()
    }

    /// Remove and return the pending timers, as if they all fired.
    pub(crate) fn take_pending(&self) -> Vec<TimerEvent> {
        let mut armed = self.armed.lock().unwrap();
        armed
            .drain(..)
            .filter(|armed| !armed.cancelled.load(Ordering::SeqCst))
            .map(|armed| armed.event)
            .collect()
    }

    /// Remove and return the first pending timer matching `predicate`.
    pub(crate) fn take_first(&self, predicate: impl Fn(&TimerEvent) -> bool) -> Option<TimerEvent> {
        let mut armed = self.armed.lock().unwrap();
        let index = armed.iter().position(|armed| {
            !armed.cancelled.load(Ordering::SeqCst) && predicate(&armed.event)
        })?;
        Some(armed.remove(index).event)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, after: Duration, event: TimerEvent) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        self.armed.lock().unwrap().push(Armed {
            after,
            event,
            cancelled,
        });
        TimerHandle::new(move || flag.store(true, Ordering::SeqCst))
    }
}
