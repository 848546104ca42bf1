#![allow(dead_code)]

pub mod builders;
pub mod strategies;

pub use builders::*;

use std::thread;
use std::time::{Duration, Instant};

/// Poll `condition` until it holds, failing the test after `timeout`
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(
            Instant::now() < deadline,
            "condition not reached within {timeout:?}"
        );
        thread::sleep(Duration::from_millis(2));
    }
}

/// Install the crate's structured logging once per test binary
pub fn init_test_logging() {
    persistent_receiver::logging::init_structured_logging();
}
