//! In-memory [`Log`] backend.
use std::sync::Mutex;

use super::types::{CheckEntry, CheckStatus, Log};

/// Collects every log line in memory, tagged by kind.
///
/// Lines are stored as `"<kind>: <message>"`, e.g. `"dry_run: chmod 700
/// /srv/sftp/alice"`. Used by tests and by callers that embed the engine.
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
    checks: Mutex<Vec<CheckEntry>>,
}

impl MemoryLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line logged so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Lines of one kind, without the kind prefix.
    #[must_use]
    pub fn lines_of(&self, kind: &str) -> Vec<String> {
        let prefix = format!("{kind}: ");
        self.lines()
            .into_iter()
            .filter_map(|l| l.strip_prefix(&prefix).map(String::from))
            .collect()
    }

    /// Whether any line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }

    /// Every recorded check result.
    #[must_use]
    pub fn check_entries(&self) -> Vec<CheckEntry> {
        self.checks.lock().map_or_else(|_| vec![], |g| g.clone())
    }

    /// Status recorded for the check named `name`, if any.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<CheckStatus> {
        self.check_entries()
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.status)
    }

    fn push(&self, kind: &str, msg: &str) {
        if let Ok(mut guard) = self.lines.lock() {
            guard.push(format!("{kind}: {msg}"));
        }
    }
}

impl Log for MemoryLog {
    fn stage(&self, msg: &str) {
        self.push("stage", msg);
    }

    fn info(&self, msg: &str) {
        self.push("info", msg);
    }

    fn debug(&self, msg: &str) {
        self.push("debug", msg);
    }

    fn warn(&self, msg: &str) {
        self.push("warn", msg);
    }

    fn error(&self, msg: &str) {
        self.push("error", msg);
    }

    fn dry_run(&self, msg: &str) {
        self.push("dry_run", msg);
    }

    fn action(&self, msg: &str) {
        self.push("action", msg);
    }

    fn record_check(&self, name: &str, status: CheckStatus, message: Option<&str>) {
        if let Ok(mut guard) = self.checks.lock() {
            guard.push(CheckEntry {
                name: name.to_string(),
                status,
                message: message.map(String::from),
            });
        }
    }
}
