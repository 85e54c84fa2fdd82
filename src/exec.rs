//! External process boundary.
//!
//! Every external program the engine relies on (`getent`, `ldd`, `usermod`)
//! is invoked through the [`Executor`] trait so that checks can be tested
//! with a scripted double instead of real system calls.
use anyhow::{Context as _, Result, bail};
use std::process::{Command, Output};

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process exited with status 0.
    pub success: bool,
    /// Exit code, if the process was not killed by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Abstraction over running external programs.
pub trait Executor: std::fmt::Debug {
    /// Run a program and return its output. Fails if it exits non-zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or exits non-zero.
    fn run(&self, program: &str, args: &[String]) -> Result<ExecResult>;

    /// Run a program, allowing failure (returns the result without bailing).
    ///
    /// # Errors
    ///
    /// Returns an error only if the program cannot be spawned.
    fn run_unchecked(&self, program: &str, args: &[String]) -> Result<ExecResult>;

    /// Check if a program is available on `PATH`.
    fn which(&self, program: &str) -> bool;
}

/// Production [`Executor`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run(&self, program: &str, args: &[String]) -> Result<ExecResult> {
        let result = self.run_unchecked(program, args)?;
        if !result.success {
            bail!(
                "{program} failed (exit {}): {}",
                result.code.unwrap_or(-1),
                result.stderr.trim()
            );
        }
        Ok(result)
    }

    fn run_unchecked(&self, program: &str, args: &[String]) -> Result<ExecResult> {
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("failed to execute: {program}"))?;
        Ok(ExecResult::from(output))
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Convert a list of string slices into owned arguments.
#[must_use]
pub fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
