//! Home directory and login shell recorded in each account entry.
use anyhow::Result;

use super::{CheckContext, CheckKind, PerUserCheck};
use crate::accounts::Account;
use crate::config::Options;
use crate::effects::Action;
use crate::template::expand;

/// Configuration section of the home directory check.
pub const HOME_SECTION: &str = "account_home";
/// Configuration section of the login shell check.
pub const SHELL_SECTION: &str = "account_shell";
/// Account entries are fixed before any directory is inspected.
pub const ORDER: u32 = 50;

const USERMOD: &str = "usermod";

/// Which passwd field is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Home directory, changed with `usermod -d`.
    Home,
    /// Login shell, changed with `usermod -s`.
    Shell,
}

impl Field {
    const fn flag(self) -> &'static str {
        match self {
            Self::Home => "-d",
            Self::Shell => "-s",
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Shell => "shell",
        }
    }
}

/// Ensures one passwd field equals an expanded template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountField {
    field: Field,
    template: String,
}

impl AccountField {
    /// Check `field` against `template`.
    #[must_use]
    pub fn new(field: Field, template: impl Into<String>) -> Self {
        Self {
            field,
            template: template.into(),
        }
    }

    fn current(&self, account: &Account) -> String {
        match self.field {
            Field::Home => account.home.to_string_lossy().into_owned(),
            Field::Shell => account.shell.clone(),
        }
    }
}

/// Build the home directory check from `home_path`.
///
/// # Errors
///
/// Returns an error if the option is missing.
pub fn setup_home(options: &Options) -> Result<CheckKind> {
    let template = options.get_str("home_path")?;
    Ok(CheckKind::PerUser(Box::new(AccountField::new(
        Field::Home,
        template,
    ))))
}

/// Build the login shell check from `shell`.
///
/// # Errors
///
/// Returns an error if the option is missing.
pub fn setup_shell(options: &Options) -> Result<CheckKind> {
    let template = options.get_str("shell")?;
    Ok(CheckKind::PerUser(Box::new(AccountField::new(
        Field::Shell,
        template,
    ))))
}

impl PerUserCheck for AccountField {
    fn is_correct(&mut self, ctx: &mut CheckContext<'_>, account: &Account) -> Result<bool> {
        let desired = expand(&self.template, account)?;
        let current = self.current(account);
        if current == desired {
            return Ok(true);
        }
        ctx.log.info(&format!(
            "{} has {} {current}, expected {desired}",
            account.name,
            self.field.label()
        ));
        Ok(false)
    }

    fn correct(&mut self, ctx: &mut CheckContext<'_>, account: &Account) -> Result<()> {
        let desired = expand(&self.template, account)?;
        ctx.effects.execute_safely(&Action::RunCommand {
            program: USERMOD.to_string(),
            args: vec![
                self.field.flag().to_string(),
                desired,
                account.name.clone(),
            ],
        })?;
        Ok(())
    }
}
