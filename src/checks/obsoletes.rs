//! Directories under the resource root that belong to no managed account.
//!
//! Each obsolete directory with content is archived into the trash
//! directory as a `.tar.bz2` and then deleted. Empty ones are deleted
//! directly. A failure on one directory is logged and the next one is
//! processed; a directory whose archive was not written is never deleted.
use anyhow::{Result, bail};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::{CheckContext, CheckKind, HybridCheck};
use crate::accounts::Account;
use crate::config::Options;
use crate::effects::{Action, Outcome, fs};
use crate::error::ArchiveError;

/// Configuration section.
pub const SECTION: &str = "obsoletes";
/// Runs after the existence check so freshly created directories are known.
pub const ORDER: u32 = 500;

/// Archives and removes directories no account maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obsoletes {
    trash: PathBuf,
    mode: u32,
    obsolete: Vec<PathBuf>,
}

impl Obsoletes {
    /// Archive into `trash`, giving each archive file `mode`.
    #[must_use]
    pub fn new(trash: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            trash: trash.into(),
            mode,
            obsolete: Vec::new(),
        }
    }

    fn retire(&self, ctx: &CheckContext<'_>, directory: &Path) -> Result<()> {
        if fs::has_entries(directory)? {
            let archived = ctx.effects.execute_safely(&Action::Archive {
                source: directory.to_path_buf(),
                trash: self.trash.clone(),
                mode: self.mode,
            })?;
            match archived {
                Some(Outcome::Archived(_)) => {}
                None if ctx.effects.simulate() => {}
                Some(Outcome::Done) | None => {
                    return Err(ArchiveError::NoOutput {
                        directory: directory.display().to_string(),
                    }
                    .into());
                }
            }
        } else {
            ctx.log
                .debug(&format!("{} is empty, not archiving", directory.display()));
        }
        ctx.effects.execute_safely(&Action::RemoveTree {
            path: directory.to_path_buf(),
        })?;
        Ok(())
    }
}

/// Build the check from `trash_path` and `trash_octal_permissions`.
///
/// # Errors
///
/// Returns an error if either option is missing or invalid.
pub fn setup(options: &Options) -> Result<CheckKind> {
    let trash = options.get_path("trash_path")?;
    let mode = options.get_octal("trash_octal_permissions")?;
    Ok(CheckKind::Hybrid(Box::new(Obsoletes::new(trash, mode))))
}

impl HybridCheck for Obsoletes {
    fn is_correct(
        &mut self,
        ctx: &mut CheckContext<'_>,
        accounts: &[Account],
        directories: &BTreeSet<PathBuf>,
    ) -> Result<bool> {
        let desired = accounts
            .iter()
            .map(|account| ctx.root.expand(account))
            .collect::<Result<BTreeSet<_>, _>>()?;
        // A trash directory kept next to the resource directories is not obsolete.
        self.obsolete = directories
            .difference(&desired)
            .filter(|dir| **dir != self.trash)
            .cloned()
            .collect();
        for dir in &self.obsolete {
            ctx.log.info(&format!("obsolete directory {}", dir.display()));
        }
        Ok(self.obsolete.is_empty())
    }

    fn correct(
        &mut self,
        ctx: &mut CheckContext<'_>,
        _: &[Account],
        _: &BTreeSet<PathBuf>,
    ) -> Result<()> {
        let obsolete = std::mem::take(&mut self.obsolete);
        let mut failed = 0usize;
        for dir in &obsolete {
            if let Err(e) = self.retire(ctx, dir) {
                ctx.log.error(&format!("could not retire {}: {e:#}", dir.display()));
                failed += 1;
            }
        }
        if failed > 0 {
            bail!(
                "{failed} of {} obsolete directories could not be retired",
                obsolete.len()
            );
        }
        Ok(())
    }
}
