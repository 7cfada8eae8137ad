// src/host/event_loop.rs

//! A run-loop host the caller pumps explicitly.
//!
//! Useful when the scheduler is embedded in an existing callback-driven
//! program, and in tests: with [`Clock::Virtual`] no real time passes and
//! every run is fully deterministic.
//!
//! Tokio's paused clock (`tokio::time::pause`) covers timers, but it only
//! moves when the runtime is idle, so it cannot model an action that takes
//! time while it runs. The virtual clock's `auto_advance` charges a fixed
//! cost to every [`Host::now`] read, which is what drives the time-slice
//! yields under test. Production code runs on
//! [`TokioHost`](super::TokioHost).

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use tracing::trace;

use super::{Callback, Host, TimerId};

/// Time source of an [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    /// Wall-clock time; waiting for a timer sleeps the current thread.
    Real,
    /// Simulated time that only moves when the loop jumps to a timer
    /// deadline, on [`EventLoop::advance`], or by `auto_advance` on every
    /// call to [`Host::now`] (to simulate work that takes time).
    Virtual { auto_advance: Duration },
}

/// Single-threaded queue of deferred callbacks and timers.
///
/// Deferred callbacks run in FIFO order. Timers fire in deadline order,
/// ties broken by creation order.
pub struct EventLoop {
    clock: Clock,
    virtual_now: Cell<Instant>,
    deferred: RefCell<VecDeque<Callback>>,
    timers: RefCell<BTreeMap<(Instant, TimerId), Callback>>,
    deadlines: RefCell<HashMap<TimerId, Instant>>,
    next_timer: Cell<u64>,
}

impl EventLoop {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            virtual_now: Cell::new(Instant::now()),
            deferred: RefCell::new(VecDeque::new()),
            timers: RefCell::new(BTreeMap::new()),
            deadlines: RefCell::new(HashMap::new()),
            next_timer: Cell::new(0),
        }
    }

    /// Virtual clock that only moves when the loop waits for a timer.
    pub fn virtual_clock() -> Self {
        Self::new(Clock::Virtual {
            auto_advance: Duration::ZERO,
        })
    }

    pub fn real_clock() -> Self {
        Self::new(Clock::Real)
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn pending_callbacks(&self) -> usize {
        self.deferred.borrow().len()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending_callbacks() == 0 && self.pending_timers() == 0
    }

    /// Run deferred callbacks (including ones they defer) until none are
    /// left. Timers are not fired and no time passes.
    ///
    /// Returns the number of callbacks run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // Release the borrow before running: callbacks defer more work.
            let next = self.deferred.borrow_mut().pop_front();
            match next {
                Some(callback) => {
                    callback();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Pump the loop until there is nothing left to do, waiting for (or
    /// jumping to) each timer deadline in turn.
    ///
    /// Returns the number of callbacks run, timers included.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = self.run_pending();
        while let Some((deadline, callback)) = self.pop_earliest_timer(None) {
            self.wait_until(deadline);
            callback();
            ran += 1;
            ran += self.run_pending();
        }
        ran
    }

    /// Pump the loop for `duration`: fire every timer due within that window
    /// and leave the clock at the end of it.
    ///
    /// Returns the number of callbacks run, timers included.
    pub fn advance(&self, duration: Duration) -> usize {
        let target = self.current() + duration;

        let mut ran = self.run_pending();
        while let Some((deadline, callback)) = self.pop_earliest_timer(Some(target)) {
            self.wait_until(deadline);
            callback();
            ran += 1;
            ran += self.run_pending();
        }

        self.wait_until(target);
        ran + self.run_pending()
    }

    /// Current time without the per-call auto advance.
    fn current(&self) -> Instant {
        match self.clock {
            Clock::Real => Instant::now(),
            Clock::Virtual { .. } => self.virtual_now.get(),
        }
    }

    fn wait_until(&self, deadline: Instant) {
        match self.clock {
            Clock::Real => {
                let now = Instant::now();
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
            }
            Clock::Virtual { .. } => {
                if deadline > self.virtual_now.get() {
                    self.virtual_now.set(deadline);
                }
            }
        }
    }

    fn pop_earliest_timer(&self, not_after: Option<Instant>) -> Option<(Instant, Callback)> {
        let mut timers = self.timers.borrow_mut();
        let (&(deadline, id), _) = timers.first_key_value()?;
        if not_after.is_some_and(|limit| deadline > limit) {
            return None;
        }

        let callback = timers.remove(&(deadline, id))?;
        self.deadlines.borrow_mut().remove(&id);
        trace!(timer = id.0, "timer due");
        Some((deadline, callback))
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::real_clock()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("clock", &self.clock)
            .field("pending_callbacks", &self.pending_callbacks())
            .field("pending_timers", &self.pending_timers())
            .finish_non_exhaustive()
    }
}

impl Host for EventLoop {
    fn now(&self) -> Instant {
        match self.clock {
            Clock::Real => Instant::now(),
            Clock::Virtual { auto_advance } => {
                let now = self.virtual_now.get() + auto_advance;
                self.virtual_now.set(now);
                now
            }
        }
    }

    fn defer(&self, callback: Callback) {
        self.deferred.borrow_mut().push_back(callback);
    }

    fn set_timer(&self, after: Duration, callback: Callback) -> TimerId {
        let id = TimerId(self.next_timer.get());
        self.next_timer.set(id.0 + 1);

        let deadline = self.current() + after;
        self.timers.borrow_mut().insert((deadline, id), callback);
        self.deadlines.borrow_mut().insert(id, deadline);
        id
    }

    fn clear_timer(&self, timer: TimerId) {
        if let Some(deadline) = self.deadlines.borrow_mut().remove(&timer) {
            self.timers.borrow_mut().remove(&(deadline, timer));
            trace!(timer = timer.0, "timer cleared");
        }
    }
}
