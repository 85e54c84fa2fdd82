//! Core logging types: check entries, status, and the [`Log`] trait.

/// Check result for summary reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckEntry {
    /// Configuration section of the check.
    pub name: String,
    /// Final status of the check.
    pub status: CheckStatus,
    /// Optional detail message (e.g., counts or error description).
    pub message: Option<String>,
}

/// Outcome of one check's cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Every item was already compliant.
    Compliant,
    /// Non-compliant items were found and corrected.
    Corrected,
    /// Non-compliant items were found and only reported.
    NonCompliant,
    /// Corrections were logged but not performed (simulate mode).
    Simulated,
    /// The check was not enabled in the configuration.
    Disabled,
    /// The check aborted with an error.
    Failed,
}

impl CheckStatus {
    /// Every status, in summary order.
    pub const ALL: [Self; 6] = [
        Self::Compliant,
        Self::Corrected,
        Self::NonCompliant,
        Self::Simulated,
        Self::Disabled,
        Self::Failed,
    ];

    /// Word used in the summary totals.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::Corrected => "corrected",
            Self::NonCompliant => "non-compliant",
            Self::Simulated => "simulated",
            Self::Disabled => "disabled",
            Self::Failed => "failed",
        }
    }

    /// Icon and ANSI colour of a summary row.
    pub(super) const fn style(self) -> (&'static str, &'static str) {
        match self {
            Self::Compliant => ("✓", "\x1b[32m"),
            Self::Corrected => ("+", "\x1b[36m"),
            Self::NonCompliant => ("!", "\x1b[33m"),
            Self::Simulated => ("~", "\x1b[37m"),
            Self::Disabled => ("·", "\x1b[2m"),
            Self::Failed => ("✗", "\x1b[31m"),
        }
    }
}

/// Abstraction over logging backends.
///
/// [`Logger`](super::logger::Logger) emits through `tracing`;
/// [`MemoryLog`](super::memory::MemoryLog) keeps every line in memory so
/// tests can assert on the action log.
pub trait Log: Send + Sync {
    /// Log a stage header (one per check).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (may be suppressed on console).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log an action that simulate mode did not perform.
    fn dry_run(&self, msg: &str);
    /// Log an action that was performed.
    fn action(&self, msg: &str);
    /// Record a check result for the summary.
    fn record_check(&self, name: &str, status: CheckStatus, message: Option<&str>);
}
