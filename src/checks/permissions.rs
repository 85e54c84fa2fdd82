//! Permission bits of each resource directory.
use anyhow::Result;
use std::os::unix::fs::PermissionsExt as _;

use super::{CheckContext, CheckKind, PerUserCheck, metadata_if_exists};
use crate::accounts::Account;
use crate::config::Options;
use crate::effects::Action;

/// Configuration section.
pub const SECTION: &str = "permissions";

/// Ensures each existing resource directory has exactly the configured mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    mode: u32,
}

impl Permissions {
    /// Require `mode` (only the low twelve bits are compared).
    #[must_use]
    pub const fn new(mode: u32) -> Self {
        Self { mode }
    }
}

/// Build the check from `octal_permissions`.
///
/// # Errors
///
/// Returns an error if the option is missing or not an octal mode.
pub fn setup(options: &Options) -> Result<CheckKind> {
    let mode = options.get_octal("octal_permissions")?;
    Ok(CheckKind::PerUser(Box::new(Permissions::new(mode))))
}

impl PerUserCheck for Permissions {
    fn is_correct(&mut self, ctx: &mut CheckContext<'_>, account: &Account) -> Result<bool> {
        let path = ctx.root.expand(account)?;
        // Absent directories belong to the existence check.
        let Some(meta) = metadata_if_exists(&path)? else {
            return Ok(true);
        };
        let current = meta.permissions().mode() & 0o7777;
        if current == self.mode {
            return Ok(true);
        }
        ctx.log.info(&format!(
            "{} has mode {current:o}, expected {:o}",
            path.display(),
            self.mode
        ));
        Ok(false)
    }

    fn correct(&mut self, ctx: &mut CheckContext<'_>, account: &Account) -> Result<()> {
        let path = ctx.root.expand(account)?;
        ctx.effects.execute_safely(&Action::SetMode {
            path,
            mode: self.mode,
        })?;
        Ok(())
    }
}
