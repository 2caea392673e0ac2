//! Logging setup with console output and optional rolling log files.
//!
//! Library code logs through the `log` macros. Debug output is grouped by
//! target so each category can be enabled on its own, either through the
//! `trace` list of the configuration or through `RUST_LOG`.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LoggingConfig, TraceCategory};

/// Log targets for the debug categories.
pub mod target {
    pub const CHAN_SWITCH: &str = "satip::chan_switch";
    pub const PIDS: &str = "satip::pids";
    pub const CI: &str = "satip::ci";
    pub const FUNC: &str = "satip::func";
}

const LOG_FILE_NAME: &str = "satip-device.log";

impl TraceCategory {
    /// Log target carrying this category's output.
    pub fn target(self) -> &'static str {
        match self {
            TraceCategory::ChanSwitch => target::CHAN_SWITCH,
            TraceCategory::Pids => target::PIDS,
            TraceCategory::Ci => target::CI,
            TraceCategory::Func => target::FUNC,
        }
    }
}

/// Build the filter directive string for a logging configuration.
///
/// Debug categories are silenced unless listed in `trace`, in which case
/// they are raised to `debug` whatever the base level.
pub fn filter_directives(config: &LoggingConfig, verbose: bool) -> String {
    let base = if verbose { "debug" } else { config.level.as_str() };
    let mut directives = vec![base.to_string()];
    for category in [
        TraceCategory::ChanSwitch,
        TraceCategory::Pids,
        TraceCategory::Ci,
        TraceCategory::Func,
    ] {
        let level = if config.trace.contains(&category) { "debug" } else { "info" };
        directives.push(format!("{}={}", category.target(), level));
    }
    directives.join(",")
}

/// Initialize the logging system.
///
/// Always logs to stdout; when `log_dir` is set, also writes a daily rolling
/// file there and removes files older than `retention_days`.
pub fn init_logging(
    config: &LoggingConfig,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config, verbose)));

    let console = fmt::layer()
        .with_writer(io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_timer(LocalTimeTimer);

    let file = match &config.log_dir {
        Some(log_dir) => {
            fs::create_dir_all(log_dir)?;
            clean_old_logs(log_dir, config.retention_days)?;

            let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // Keep the worker guard alive for the program lifetime
            let _ = Box::leak(Box::new(Arc::new(guard)));

            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .with_timer(LocalTimeTimer),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to set default subscriber: {}", e))?;

    // Bridge log:: macros to tracing
    tracing_log::LogTracer::init()
        .map_err(|e| format!("Failed to initialize LogTracer: {}", e))?;

    Ok(())
}

/// Remove log files older than the retention window.
fn clean_old_logs(log_dir: &Path, retention_days: u64) -> io::Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }

    let cutoff = Local::now() - chrono::Duration::days(retention_days as i64);

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_ours = path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.contains(LOG_FILE_NAME));
        if !path.is_file() || !is_ours {
            continue;
        }

        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            let modified: chrono::DateTime<Local> = modified.into();
            if modified < cutoff {
                if let Err(e) = fs::remove_file(&path) {
                    eprintln!("Failed to remove old log file {:?}: {}", path, e);
                }
            }
        }
    }

    Ok(())
}

/// Local time formatting for log lines.
#[derive(Debug, Clone, Copy)]
struct LocalTimeTimer;

impl fmt::time::FormatTime for LocalTimeTimer {
    fn format_time(&self, w: &mut fmt::format::Writer) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.6f"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_default() {
        let config = LoggingConfig::default();
        let directives = filter_directives(&config, false);
        assert!(directives.starts_with("info,"));
        assert!(directives.contains("satip::chan_switch=info"));
        assert!(directives.contains("satip::pids=info"));
    }

    #[test]
    fn test_filter_directives_trace_categories() {
        let config = LoggingConfig {
            trace: vec![TraceCategory::Pids],
            ..LoggingConfig::default()
        };
        let directives = filter_directives(&config, true);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("satip::pids=debug"));
        assert!(directives.contains("satip::ci=info"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
