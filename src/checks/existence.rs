//! Every managed account has a resource directory.
use anyhow::Result;
use std::collections::BTreeSet;
use std::path::PathBuf;

use super::{CheckContext, CheckKind, HybridCheck};
use crate::accounts::Account;
use crate::config::Options;
use crate::effects::Action;

/// Configuration section.
pub const SECTION: &str = "existence";
/// Runs before anything that inspects the directories.
pub const ORDER: u32 = 100;
/// Mode of newly created resource directories.
pub const NEW_DIRECTORY_MODE: u32 = 0o700;

/// Creates the resource directory of each account that lacks one.
#[derive(Debug, Default)]
pub struct Existence {
    missing: Vec<PathBuf>,
}

/// Build the check; it has no options of its own.
///
/// # Errors
///
/// Never fails.
pub fn setup(_: &Options) -> Result<CheckKind> {
    Ok(CheckKind::Hybrid(Box::new(Existence::default())))
}

impl HybridCheck for Existence {
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
        self.missing = desired.difference(directories).cloned().collect();
        for path in &self.missing {
            ctx.log.info(&format!("missing directory {}", path.display()));
        }
        Ok(self.missing.is_empty())
    }

    fn correct(
        &mut self,
        ctx: &mut CheckContext<'_>,
        _: &[Account],
        _: &BTreeSet<PathBuf>,
    ) -> Result<()> {
        for path in std::mem::take(&mut self.missing) {
            ctx.effects.execute_safely(&Action::CreateDir {
                path,
                mode: NEW_DIRECTORY_MODE,
            })?;
        }
        Ok(())
    }
}
