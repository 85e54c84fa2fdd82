//! Domain-specific error types for the compliance engine.
//!
//! Internal modules return typed errors (e.g., [`ConfigError`],
//! [`LookupError`]) while checks and the engine carry them as
//! [`anyhow::Error`] via the standard `?` operator.
//!
//! ```text
//! ConfigError       : missing/unparseable options, INI syntax, unreadable files (fatal)
//! PreconditionError : account count, resource root shape (fatal)
//! LookupError       : unknown user/group names or gids (fails the current check)
//! ArchiveError      : archive step produced no output (logged, deletion skipped)
//! ```

use thiserror::Error;

/// Errors that arise from loading configuration and reading typed options.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required INI section is absent from the config file.
    #[error("Missing required section [{0}]")]
    MissingSection(String),

    /// A required key is absent from its section.
    #[error("Missing option '{key}' in section [{section}]")]
    MissingOption {
        /// Section the key was looked up in.
        section: String,
        /// The missing key.
        key: String,
    },

    /// A key is present but its value cannot be converted.
    #[error("Invalid value '{value}' for option '{key}' in section [{section}]: expected {expected}")]
    InvalidValue {
        /// Section the key was looked up in.
        section: String,
        /// The offending key.
        key: String,
        /// Raw value as written in the file.
        value: String,
        /// Human-readable description of the accepted format.
        expected: &'static str,
    },

    /// The INI source contains a syntax error that prevents parsing.
    #[error("Invalid INI syntax in {file}: {message}")]
    InvalidSyntax {
        /// Name of the configuration source.
        file: String,
        /// Parser message including the line number.
        message: String,
    },

    /// An I/O error occurred while reading a config or manifest file.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Preconditions checked before any check touches the filesystem.
#[derive(Error, Debug)]
pub enum PreconditionError {
    /// Fewer managed accounts than `minimum_accounts` were found.
    #[error("too few accounts found, check configuration (got {found}, need {required})")]
    TooFewAccounts {
        /// Number of managed accounts in the snapshot.
        found: usize,
        /// Configured minimum.
        required: usize,
    },

    /// The resource root cannot be enumerated by directory-listing checks.
    #[error("resource root '{template}' cannot be enumerated: {reason}")]
    UnsupportedRoot {
        /// The configured template.
        template: String,
        /// Which part of the invariant is violated.
        reason: &'static str,
    },

    /// A program the run shells out to is not on `PATH`.
    #[error("'{program}' not found on PATH (needed by [{section}])")]
    MissingProgram {
        /// Program name.
        program: &'static str,
        /// Section whose settings need it.
        section: &'static str,
    },
}

/// Failures to resolve names or ids against the account database.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No passwd entry exists for the user name.
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    /// No group entry exists for the group name.
    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    /// No group entry exists for the numeric gid.
    #[error("no group name for gid {0}")]
    UnknownGid(u32),
}

/// Errors raised by the archive step of obsolete-directory cleanup.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The archive step finished without reporting an archive path.
    #[error("no archive file found after archiving {directory}")]
    NoOutput {
        /// Directory that was being archived.
        directory: String,
    },
}
