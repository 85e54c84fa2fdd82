//! Structured logger with dry-run awareness and summary collection.
use std::path::PathBuf;
use std::sync::Mutex;

use super::subscriber::{ACTION_TARGET, DRY_RUN_TARGET, STAGE_TARGET};
use super::types::{CheckEntry, CheckStatus, Log};

/// Implement the display methods of [`Log`] by delegating to inherent methods
/// of the same name on the implementing type.
///
/// The `record_check` method is **not** included because its signature
/// differs from the `fn(&self, &str)` pattern shared by the display methods.
macro_rules! forward_log_methods {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(&self, msg: &str) {
                self.$method(msg);
            }
        )+
    };
}

/// Structured logger with dry-run awareness and summary collection.
///
/// Every message becomes a `tracing` event; the subscriber installed by
/// [`init_subscriber`](super::subscriber::init_subscriber) decides where it
/// ends up (console, and the `--log-file` when one is given).
#[derive(Debug)]
pub struct Logger {
    checks: Mutex<Vec<CheckEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a new logger.
    ///
    /// `log_file` is only remembered for the run summary; the file itself is
    /// opened by the subscriber's file layer.
    #[must_use]
    pub const fn new(log_file: Option<PathBuf>) -> Self {
        Self {
            checks: Mutex::new(Vec::new()),
            log_file,
        }
    }

    /// Return a clone of all recorded check entries.
    #[must_use]
    pub fn check_entries(&self) -> Vec<CheckEntry> {
        self.checks.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Log an error message.
    pub fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    /// Log a warning message.
    pub fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    /// Log a stage header.
    pub fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    /// Log an informational message.
    pub fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    /// Log a debug message (suppressed on console unless verbose; always
    /// written to the log file).
    pub fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    /// Log an action that was not performed because of simulate mode.
    pub fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN_TARGET, "{msg}");
    }

    /// Log an action that was performed.
    pub fn action(&self, msg: &str) {
        tracing::info!(target: ACTION_TARGET, "{msg}");
    }

    /// Record a check result for the summary.
    pub fn record_check(&self, name: &str, status: CheckStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.checks.lock() {
            guard.push(CheckEntry {
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }

    /// Print one row per recorded check, then the totals per status.
    pub fn print_summary(&self) {
        let checks = self.check_entries();
        if checks.is_empty() {
            return;
        }
        self.stage("Summary");
        for check in &checks {
            let (icon, color) = check.status.style();
            let detail = check
                .message
                .as_deref()
                .map_or_else(String::new, |msg| format!(" ({msg})"));
            self.info(&format!("{color}{icon} {}{detail}\x1b[0m", check.name));
        }

        let totals: Vec<String> = CheckStatus::ALL
            .iter()
            .map(|&status| {
                let count = checks.iter().filter(|c| c.status == status).count();
                let (_, color) = status.style();
                format!("{color}{count} {}\x1b[0m", status.label())
            })
            .collect();
        self.info(&format!("{} checks: {}", checks.len(), totals.join(", ")));

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    forward_log_methods!(stage, info, debug, warn, error, dry_run, action);

    fn record_check(&self, name: &str, status: CheckStatus, message: Option<&str>) {
        self.record_check(name, status, message);
    }
}
