pub mod builders;
pub mod recorder;

use std::rc::Rc;
use std::sync::Once;

use tasktree::{EventLoop, Scheduler, SchedulerConfig};
use tracing_subscriber::{fmt, EnvFilter};

pub use recorder::Recorder;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=tasktree=trace cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Scheduler with default tuning on a virtual-clock event loop.
pub fn virtual_scheduler() -> (Rc<EventLoop>, Scheduler) {
    virtual_scheduler_with(SchedulerConfig::default())
}

/// Scheduler with custom tuning on a virtual-clock event loop.
pub fn virtual_scheduler_with(config: SchedulerConfig) -> (Rc<EventLoop>, Scheduler) {
    let host = Rc::new(EventLoop::virtual_clock());
    let scheduler = Scheduler::new(config, host.clone());
    (host, scheduler)
}
