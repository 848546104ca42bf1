//! # Structured Logging Module
//!
//! Environment-aware structured logging for receiver diagnostics. The
//! receiver itself only emits `tracing` events; applications that have no
//! subscriber of their own can install one here.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json = std::env::var("RECEIVER_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A global subscriber may already be set by the host application
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("RECEIVER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for receiver lifecycle operations
pub fn log_receiver_operation(
    operation: &str,
    receiver_id: &str,
    endpoint: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        receiver_id = %receiver_id,
        endpoint = endpoint,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📬 RECEIVER_OPERATION"
    );
}

/// Log structured data for ingress flow control decisions
pub fn log_flow_control(receiver_id: &str, action: &str, queue_depth: usize, succeeded: bool) {
    if succeeded {
        tracing::info!(
            receiver_id = %receiver_id,
            action = %action,
            queue_depth = queue_depth,
            timestamp = %Utc::now().to_rfc3339(),
            "🚦 FLOW_CONTROL"
        );
    } else {
        tracing::warn!(
            receiver_id = %receiver_id,
            action = %action,
            queue_depth = queue_depth,
            timestamp = %Utc::now().to_rfc3339(),
            "🚦 FLOW_CONTROL failed; backpressure signal is best-effort"
        );
    }
}
