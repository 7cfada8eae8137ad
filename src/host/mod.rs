// src/host/mod.rs

//! The single-threaded environment the scheduler runs inside.
//!
//! The scheduler has no threads and no futures of its own. Everything it
//! needs from the outside world goes through [`Host`]:
//! - a clock, for time-slicing long synchronous chains
//! - a zero-delay deferred callback, used to yield back to the host loop
//! - one-shot timers, used by `sleep`/`wakeup`
//!
//! Implementations:
//! - [`TokioHost`] runs callbacks on a Tokio `LocalSet`.
//! - [`EventLoop`] is a run-loop the caller pumps explicitly, with either a
//!   real or a virtual clock.

use std::time::{Duration, Instant};

pub mod event_loop;
pub mod tokio_host;

pub use event_loop::{Clock, EventLoop};
pub use tokio_host::TokioHost;

/// Callback handed to a host.
pub type Callback = Box<dyn FnOnce() + 'static>;

/// Handle of a pending timer, scoped to the host that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub(crate) u64);

/// Callback-driven host environment.
///
/// All methods are called from the thread that owns the scheduler, and a
/// host must never invoke a callback from inside `defer` or `set_timer`
/// themselves.
pub trait Host {
    /// Current time, as seen by this host.
    fn now(&self) -> Instant;

    /// Run `callback` as soon as the host loop regains control.
    fn defer(&self, callback: Callback);

    /// Run `callback` once `after` has elapsed.
    fn set_timer(&self, after: Duration, callback: Callback) -> TimerId;

    /// Cancel a pending timer. Unknown or already-fired timers are ignored.
    fn clear_timer(&self, timer: TimerId);
}
