//! # Structured Logging Module
//!
//! Environment-aware console logging built on the tracing ecosystem, plus
//! domain-specific macros that keep batch and job log lines uniform.
//!
//! - Log level is derived from the environment (`BATCH_ENV`, falling back to `APP_ENV`)
//!   unless `RUST_LOG` is set
//! - `BATCH_LOG_FORMAT=json` switches the console output to JSON lines

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = std::env::var("RUST_LOG")
            .map(EnvFilter::new)
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let json = std::env::var("BATCH_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let console_layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(std::io::stdout().is_terminal())
                .with_filter(filter)
                .boxed()
        };

        // A global subscriber may already be installed by the embedding application
        if tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            json = json,
            "STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
pub(crate) fn get_environment() -> String {
    std::env::var("BATCH_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Batch lifecycle logging
///
/// ```rust,ignore
/// log_batch!(info, "batch started", batch_uuid: batch.batch_uuid, operation_type: batch.operation_type);
/// ```
#[macro_export]
macro_rules! log_batch {
    ($level:ident, $operation:expr, batch_uuid: $batch_uuid:expr, $($key:ident: $value:expr),* $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            batch_uuid = %$batch_uuid,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "BATCH_{}", $operation
        );
    };
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "BATCH_{}", $operation
        );
    };
    ($level:ident, $operation:expr, $($key:ident: $value:expr),+ $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "BATCH_{}", $operation
        );
    };
}

/// Job execution logging
#[macro_export]
macro_rules! log_job {
    ($level:ident, $operation:expr, job_uuid: $job_uuid:expr, $($key:ident: $value:expr),* $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            job_uuid = %$job_uuid,
            $($key = ?$value,)*
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "JOB_{}", $operation
        );
    };
    ($level:ident, $operation:expr $(,)?) => {
        tracing::$level!(
            operation = %$operation,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "JOB_{}", $operation
        );
    };
}
