//! The dry-run boundary.
//!
//! Every mutation a check wants to make is described as an [`Action`] and
//! handed to [`Effects::execute_safely`]. In simulate mode the action is
//! logged and nothing happens; otherwise it is performed and logged.
pub mod fs;

use anyhow::Result;
use std::fmt;
use std::path::PathBuf;

use crate::exec::Executor;
use crate::logging::Log;

/// A side effect on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create one directory with explicit permission bits.
    CreateDir {
        /// Directory to create.
        path: PathBuf,
        /// Permission bits.
        mode: u32,
    },
    /// Change permission bits.
    SetMode {
        /// Target path.
        path: PathBuf,
        /// Permission bits.
        mode: u32,
    },
    /// Change owning uid and/or gid.
    SetOwner {
        /// Target path.
        path: PathBuf,
        /// New uid, `None` to keep.
        uid: Option<u32>,
        /// New gid, `None` to keep.
        gid: Option<u32>,
    },
    /// Archive a directory into the trash as a `.tar.bz2`.
    Archive {
        /// Directory to archive.
        source: PathBuf,
        /// Trash directory receiving the archive.
        trash: PathBuf,
        /// Permission bits of the archive file.
        mode: u32,
    },
    /// Delete a directory recursively.
    RemoveTree {
        /// Directory to delete.
        path: PathBuf,
    },
    /// Copy a file with its metadata.
    CopyFile {
        /// File to copy.
        source: PathBuf,
        /// Destination path.
        destination: PathBuf,
    },
    /// Run an external program.
    RunCommand {
        /// Program name.
        program: String,
        /// Arguments.
        args: Vec<String>,
    },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateDir { path, mode } => {
                write!(f, "mkdir -m {mode:o} {}", path.display())
            }
            Self::SetMode { path, mode } => write!(f, "chmod {mode:o} {}", path.display()),
            Self::SetOwner { path, uid, gid } => match (uid, gid) {
                (Some(uid), Some(gid)) => write!(f, "chown {uid}:{gid} {}", path.display()),
                (Some(uid), None) => write!(f, "chown {uid} {}", path.display()),
                (None, Some(gid)) => write!(f, "chgrp {gid} {}", path.display()),
                (None, None) => write!(f, "chown (unchanged) {}", path.display()),
            },
            Self::Archive {
                source,
                trash,
                mode,
            } => write!(
                f,
                "archive {} into {} (mode {mode:o})",
                source.display(),
                trash.display()
            ),
            Self::RemoveTree { path } => write!(f, "rm -r {}", path.display()),
            Self::CopyFile {
                source,
                destination,
            } => write!(f, "cp -p {} {}", source.display(), destination.display()),
            Self::RunCommand { program, args } => {
                write!(f, "{program}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
        }
    }
}

/// What a performed action produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The action completed.
    Done,
    /// An archive was written to this path.
    Archived(PathBuf),
}

/// Performs or simulates [`Action`]s.
#[derive(Clone, Copy)]
pub struct Effects<'a> {
    simulate: bool,
    log: &'a dyn Log,
    executor: &'a dyn Executor,
}

impl fmt::Debug for Effects<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effects")
            .field("simulate", &self.simulate)
            .field("log", &"<dyn Log>")
            .field("executor", &self.executor)
            .finish()
    }
}

impl<'a> Effects<'a> {
    /// Create the boundary for one run.
    #[must_use]
    pub const fn new(simulate: bool, log: &'a dyn Log, executor: &'a dyn Executor) -> Self {
        Self {
            simulate,
            log,
            executor,
        }
    }

    /// Whether actions are only logged.
    #[must_use]
    pub const fn simulate(&self) -> bool {
        self.simulate
    }

    /// Perform `action`, or only log it in simulate mode.
    ///
    /// Returns `None` when simulating; callers must treat that as "nothing
    /// happened" and skip any step that depends on the result.
    ///
    /// # Errors
    ///
    /// Returns the action's error in enforce mode.
    pub fn execute_safely(&self, action: &Action) -> Result<Option<Outcome>> {
        if self.simulate {
            self.log.dry_run(&format!("would {action}"));
            return Ok(None);
        }
        let outcome = self.perform(action)?;
        match &outcome {
            Outcome::Archived(path) => {
                self.log
                    .action(&format!("{action}: wrote {}", path.display()));
            }
            Outcome::Done => self.log.action(&action.to_string()),
        }
        Ok(Some(outcome))
    }

    fn perform(&self, action: &Action) -> Result<Outcome> {
        match action {
            Action::CreateDir { path, mode } => fs::create_dir_with_mode(path, *mode)?,
            Action::SetMode { path, mode } => fs::set_mode(path, *mode)?,
            Action::SetOwner { path, uid, gid } => fs::set_owner(path, *uid, *gid)?,
            Action::Archive {
                source,
                trash,
                mode,
            } => return fs::archive_directory(source, trash, *mode).map(Outcome::Archived),
            Action::RemoveTree { path } => fs::remove_tree(path)?,
            Action::CopyFile {
                source,
                destination,
            } => fs::copy_preserving(source, destination)?,
            Action::RunCommand { program, args } => {
                self.executor.run(program, args)?;
            }
        }
        Ok(Outcome::Done)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::exec::test_helpers::ScriptedExecutor;
    use crate::logging::MemoryLog;
    use std::os::unix::fs::PermissionsExt as _;

    #[test]
    fn display_is_shell_like() {
        let path = PathBuf::from("/srv/sftp/alice");
        assert_eq!(
            Action::CreateDir {
                path: path.clone(),
                mode: 0o700
            }
            .to_string(),
            "mkdir -m 700 /srv/sftp/alice"
        );
        assert_eq!(
            Action::SetOwner {
                path: path.clone(),
                uid: None,
                gid: Some(2000)
            }
            .to_string(),
            "chgrp 2000 /srv/sftp/alice"
        );
        assert_eq!(
            Action::RunCommand {
                program: "usermod".to_string(),
                args: vec!["-s".to_string(), "/bin/false".to_string(), "alice".to_string()],
            }
            .to_string(),
            "usermod -s /bin/false alice"
        );
    }

    #[test]
    fn simulate_logs_and_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let log = MemoryLog::new();
        let executor = ScriptedExecutor::default();
        let effects = Effects::new(true, &log, &executor);
        let path = tmp.path().join("alice");

        let result = effects
            .execute_safely(&Action::CreateDir {
                path: path.clone(),
                mode: 0o700,
            })
            .unwrap();

        assert_eq!(result, None);
        assert!(!path.exists());
        assert_eq!(log.lines_of("dry_run").len(), 1);
        assert!(log.lines_of("action").is_empty());
    }

    #[test]
    fn simulate_never_runs_commands() {
        let log = MemoryLog::new();
        let executor = ScriptedExecutor::default();
        let effects = Effects::new(true, &log, &executor);
        effects
            .execute_safely(&Action::RunCommand {
                program: "usermod".to_string(),
                args: vec![],
            })
            .unwrap();
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn enforce_performs_and_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let log = MemoryLog::new();
        let executor = ScriptedExecutor::default();
        let effects = Effects::new(false, &log, &executor);
        let path = tmp.path().join("alice");

        let result = effects
            .execute_safely(&Action::CreateDir {
                path: path.clone(),
                mode: 0o700,
            })
            .unwrap();

        assert_eq!(result, Some(Outcome::Done));
        assert_eq!(
            std::fs::metadata(&path).unwrap().permissions().mode() & 0o7777,
            0o700
        );
        assert_eq!(log.lines_of("action").len(), 1);
    }

    #[test]
    fn enforce_archive_returns_path() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("x");
        std::fs::create_dir(&source).unwrap();
        std::fs::write(source.join("f"), "data").unwrap();
        let log = MemoryLog::new();
        let executor = ScriptedExecutor::default();
        let effects = Effects::new(false, &log, &executor);

        let result = effects
            .execute_safely(&Action::Archive {
                source,
                trash: tmp.path().to_path_buf(),
                mode: 0o600,
            })
            .unwrap();

        assert_eq!(
            result,
            Some(Outcome::Archived(tmp.path().join("x.tar.bz2")))
        );
    }

    #[test]
    fn enforce_propagates_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let log = MemoryLog::new();
        let executor = ScriptedExecutor::default();
        let effects = Effects::new(false, &log, &executor);
        let result = effects.execute_safely(&Action::SetMode {
            path: tmp.path().join("absent"),
            mode: 0o700,
        });
        assert!(result.is_err());
        assert!(log.lines_of("action").is_empty());
    }

    #[test]
    fn enforce_runs_command_through_executor() {
        let log = MemoryLog::new();
        let executor = ScriptedExecutor::ok("");
        let effects = Effects::new(false, &log, &executor);
        effects
            .execute_safely(&Action::RunCommand {
                program: "usermod".to_string(),
                args: vec!["-d".to_string(), "/srv/alice".to_string(), "alice".to_string()],
            })
            .unwrap();
        assert_eq!(executor.calls(), vec!["usermod -d /srv/alice alice"]);
    }
}
