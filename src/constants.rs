//! # Receiver Constants
//!
//! Defaults that define the operational boundaries of a persistent receiver.

use std::time::Duration;

/// Queue depth at which ingress from the transport is paused
pub const DEFAULT_HIGH_WATERMARK: usize = 50;

/// Queue depth at or below which paused ingress is resumed
pub const DEFAULT_LOW_WATERMARK: usize = 40;

/// Grace period used when the caller does not supply one
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 10_000;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(DEFAULT_GRACE_PERIOD_MS);

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "RECEIVER";

/// Thread names
pub mod threads {
    pub const DISPATCH: &str = "receiver-dispatch";
    pub const STATE_CHANGE: &str = "receiver-state-change";
    pub const EXECUTOR: &str = "receiver-executor";
}
