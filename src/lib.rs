//! Desired-state compliance engine for per-account resource directories.
//!
//! Given an INI configuration and the host's account database, the engine
//! runs an ordered list of checks over each managed account's resource
//! directory (typically a home or chroot under something like
//! `/srv/sftp/$u`), reports every deviation and, where enabled, corrects it.
//! In simulate mode every intended change is logged and none is made.
//!
//! The public API is organised into layers:
//!
//! - **[`config`]**: INI sections, typed options, `[main]` settings, manifests
//! - **[`accounts`]** and **[`template`]**: the account snapshot and `$u`/`$h`/`$g` expansion
//! - **[`effects`]**: the dry-run boundary every mutation goes through
//! - **[`checks`]**: check shapes, their drivers, and the concrete checks
//! - **[`engine`]**: setup and ordered execution, mapped to an exit status
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod accounts;
pub mod checks;
pub mod cli;
pub mod config;
pub mod effects;
pub mod engine;
pub mod error;
pub mod exec;
pub mod logging;
pub mod template;
