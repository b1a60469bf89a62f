#![allow(dead_code)]
//! Shared integration test utilities.

use open_tasklet::Scheduler;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Seed for schedulers whose select choices must be reproducible.
pub const DEFAULT_TEST_SEED: u64 = 0xDEADBEEF;

/// Initialize test logging at TRACE level.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// A scheduler with a fixed seed.
#[must_use]
pub fn test_scheduler() -> Scheduler {
    Scheduler::builder().seed(DEFAULT_TEST_SEED).build()
}

/// An append-only event log shared between tasks.
pub type Log = Rc<RefCell<Vec<String>>>;

#[must_use]
pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn record(log: &Log, event: impl Into<String>) {
    log.borrow_mut().push(event.into());
}

#[must_use]
pub fn events(log: &Log) -> Vec<String> {
    log.borrow().clone()
}
