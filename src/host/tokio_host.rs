// src/host/tokio_host.rs

//! [`Host`] backed by a Tokio `LocalSet`.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::trace;

use super::{Callback, Host, TimerId};

/// Runs scheduler callbacks as local Tokio tasks.
///
/// Every method must be called from inside a [`tokio::task::LocalSet`]
/// (e.g. within `LocalSet::run_until`), because callbacks are spawned with
/// [`tokio::task::spawn_local`]. Timers are plain `tokio::time::sleep`
/// futures, so `tokio::time::pause()` makes them deterministic in tests.
#[derive(Default)]
pub struct TokioHost {
    timers: Rc<RefCell<HashMap<TimerId, JoinHandle<()>>>>,
    next_timer: Cell<u64>,
}

impl TokioHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers that have neither fired nor been cleared.
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }
}

impl fmt::Debug for TokioHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioHost")
            .field("pending_timers", &self.pending_timers())
            .finish_non_exhaustive()
    }
}

impl Host for TokioHost {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn defer(&self, callback: Callback) {
        // Detached: the callback owns everything it needs.
        drop(tokio::task::spawn_local(async move {
            callback();
        }));
    }

    fn set_timer(&self, after: Duration, callback: Callback) -> TimerId {
        let id = TimerId(self.next_timer.get());
        self.next_timer.set(id.0 + 1);

        let timers = Rc::clone(&self.timers);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(after).await;
            timers.borrow_mut().remove(&id);
            trace!(timer = id.0, "timer fired");
            callback();
        });

        self.timers.borrow_mut().insert(id, handle);
        id
    }

    fn clear_timer(&self, timer: TimerId) {
        if let Some(handle) = self.timers.borrow_mut().remove(&timer) {
            handle.abort();
            trace!(timer = timer.0, "timer cleared");
        }
    }
}
