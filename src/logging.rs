//! Tracing setup
//!
//! One rolling file (JSON when the logs are shipped) plus ANSI stdout.
//! At `info` the purchase pipeline is the signal; sqlx logs every
//! statement and redis logs reconnect chatter at the same level, so both
//! backends are capped at `warn` unless `LOG_BACKENDS` opts back in.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG wins outright; otherwise build directives from config.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    if config.use_json {
        // Shipped logs keep the target so they stay queryable by
        // subsystem (admission, worker, queue, sale).
        let file_layer = fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stdout_layer)
            .init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stdout_layer)
            .init();
    }

    guard
}

fn filter_directives(config: &AppConfig) -> String {
    if config.log_backends {
        config.log_level.clone()
    } else {
        format!("{},sqlx=warn,redis=warn", config.log_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(log_level: &str, log_backends: bool) -> AppConfig {
        AppConfig {
            log_level: log_level.to_string(),
            log_backends,
            ..AppConfig::for_tests()
        }
    }

    #[test]
    fn test_backends_capped_by_default() {
        let directives = filter_directives(&config("info", false));
        assert_eq!(directives, "info,sqlx=warn,redis=warn");
    }

    #[test]
    fn test_backends_opt_in() {
        let directives = filter_directives(&config("debug", true));
        assert_eq!(directives, "debug");
    }
}
