//! Owning user and owning group of each resource directory.
//!
//! Both checks take a template naming the desired owner (for example `$u`
//! or `root` for the user, `$g` or `sftponly` for the group), expand it
//! for the account and resolve the name against the account database.
use anyhow::Result;
use std::os::unix::fs::MetadataExt as _;

use super::{CheckContext, CheckKind, PerUserCheck, metadata_if_exists};
use crate::accounts::Account;
use crate::config::Options;
use crate::effects::Action;
use crate::template::expand;

/// Configuration section of the owning-user check.
pub const OWNER_SECTION: &str = "owner";
/// Configuration section of the owning-group check.
pub const GROUP_SECTION: &str = "group";

/// Which id of the directory is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Id {
    /// Owning user.
    User,
    /// Owning group.
    Group,
}

/// Ensures each existing resource directory is owned by the expanded user
/// or group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    id: Id,
    template: String,
}

impl Ownership {
    /// Check the owning user against `template`.
    #[must_use]
    pub fn user(template: impl Into<String>) -> Self {
        Self {
            id: Id::User,
            template: template.into(),
        }
    }

    /// Check the owning group against `template`.
    #[must_use]
    pub fn group(template: impl Into<String>) -> Self {
        Self {
            id: Id::Group,
            template: template.into(),
        }
    }

    fn desired(&self, ctx: &CheckContext<'_>, account: &Account) -> Result<u32> {
        let name = expand(&self.template, account)?;
        let id = match self.id {
            Id::User => ctx.database.uid_of(&name)?,
            Id::Group => ctx.database.gid_of(&name)?,
        };
        Ok(id)
    }

    /// `gid` is shown with its group name when the database has one.
    fn describe(&self, ctx: &CheckContext<'_>, id: u32) -> String {
        match self.id {
            Id::User => id.to_string(),
            Id::Group => ctx
                .database
                .group_name(id)
                .map_or_else(|_| id.to_string(), |name| format!("{name} ({id})")),
        }
    }
}

/// Build the owning-user check from `owner`.
///
/// # Errors
///
/// Returns an error if the option is missing.
pub fn setup_owner(options: &Options) -> Result<CheckKind> {
    let template = options.get_str("owner")?;
    Ok(CheckKind::PerUser(Box::new(Ownership::user(template))))
}

/// Build the owning-group check from `group`.
///
/// # Errors
///
/// Returns an error if the option is missing.
pub fn setup_group(options: &Options) -> Result<CheckKind> {
    let template = options.get_str("group")?;
    Ok(CheckKind::PerUser(Box::new(Ownership::group(template))))
}

impl PerUserCheck for Ownership {
    fn is_correct(&mut self, ctx: &mut CheckContext<'_>, account: &Account) -> Result<bool> {
        let path = ctx.root.expand(account)?;
        let Some(meta) = metadata_if_exists(&path)? else {
            return Ok(true);
        };
        let desired = self.desired(ctx, account)?;
        let (current, what) = match self.id {
            Id::User => (meta.uid(), "owner"),
            Id::Group => (meta.gid(), "group"),
        };
        if current == desired {
            return Ok(true);
        }
        ctx.log.info(&format!(
            "{} has {what} {}, expected {}",
            path.display(),
            self.describe(ctx, current),
            self.describe(ctx, desired)
        ));
        Ok(false)
    }

    fn correct(&mut self, ctx: &mut CheckContext<'_>, account: &Account) -> Result<()> {
        let path = ctx.root.expand(account)?;
        let desired = self.desired(ctx, account)?;
        let action = match self.id {
            Id::User => Action::SetOwner {
                path,
                uid: Some(desired),
                gid: None,
            },
            Id::Group => Action::SetOwner {
                path,
                uid: None,
                gid: Some(desired),
            },
        };
        ctx.effects.execute_safely(&action)?;
        Ok(())
    }
}
