//! Placeholder expansion for per-account paths and names.
//!
//! Templates may contain `$u` (login name), `$h` (declared home) and `$g`
//! (primary group name). Substitution happens in that order, and the group
//! lookup is only performed when `$g` is present.
use anyhow::{Context as _, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::accounts::Account;
use crate::error::{LookupError, PreconditionError};

const USER: &str = "$u";
const HOME: &str = "$h";
const GROUP: &str = "$g";

/// Expand every placeholder in `template` for `account`.
///
/// # Examples
///
/// ```
/// use homekeeper::accounts::Account;
/// use homekeeper::template::expand;
///
/// let alice = Account {
///     name: "alice".to_string(),
///     uid: 1001,
///     gid: 2000,
///     primary_group: Some("sftponly".to_string()),
///     home: "/home/alice".into(),
///     shell: "/bin/sh".to_string(),
/// };
/// assert_eq!(expand("/srv/$g/$u", &alice).unwrap(), "/srv/sftponly/alice");
/// ```
///
/// # Errors
///
/// Returns [`LookupError::UnknownGid`] if the template uses `$g` and the
/// account's primary gid has no group entry.
pub fn expand(template: &str, account: &Account) -> Result<String, LookupError> {
    let expanded = template
        .replace(USER, &account.name)
        .replace(HOME, &account.home.to_string_lossy());
    if !expanded.contains(GROUP) {
        return Ok(expanded);
    }
    let group = account
        .primary_group
        .as_deref()
        .ok_or(LookupError::UnknownGid(account.gid))?;
    Ok(expanded.replace(GROUP, group))
}

/// The configured per-account resource root, e.g. `/srv/sftp/$u`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRoot {
    template: String,
}

impl ResourceRoot {
    /// Wrap a root template.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// The resource directory of `account`.
    ///
    /// # Errors
    ///
    /// Propagates [`LookupError`] from [`expand`].
    pub fn expand(&self, account: &Account) -> Result<PathBuf, LookupError> {
        expand(&self.template, account).map(PathBuf::from)
    }

    /// Directory that holds every account's resource directory.
    ///
    /// Only roots whose last component is exactly `$u` (with an optional
    /// trailing `/`) and that mention neither `$h` nor `$g` can be
    /// enumerated.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError::UnsupportedRoot`] for any other shape.
    pub fn base_dir(&self) -> Result<PathBuf, PreconditionError> {
        let template = self.template.as_str();
        if template.contains(HOME) || template.contains(GROUP) {
            return Err(self.unsupported("must not contain $h or $g"));
        }
        let trimmed = template.strip_suffix('/').unwrap_or(template);
        let Some(base) = trimmed.strip_suffix(USER) else {
            return Err(self.unsupported("must end with $u"));
        };
        if base.contains(USER) {
            return Err(self.unsupported("must contain $u only once"));
        }
        if !(base.is_empty() || base.ends_with('/')) {
            return Err(self.unsupported("$u must be a whole path component"));
        }
        Ok(PathBuf::from(base))
    }

    fn unsupported(&self, reason: &'static str) -> PreconditionError {
        PreconditionError::UnsupportedRoot {
            template: self.template.clone(),
            reason,
        }
    }
}

/// Real directories directly inside `base`; symbolic links are not
/// followed and a missing `base` yields the empty set.
///
/// # Errors
///
/// Returns an error if `base` exists but cannot be listed.
pub fn existing_directories(base: &Path) -> Result<BTreeSet<PathBuf>> {
    let listed = if base.as_os_str().is_empty() {
        Path::new(".")
    } else {
        base
    };
    let entries = match std::fs::read_dir(listed) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e).with_context(|| format!("listing {}", base.display())),
    };
    let mut dirs = BTreeSet::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", base.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("inspecting {}", entry.path().display()))?;
        if file_type.is_dir() {
            dirs.insert(base.join(entry.file_name()));
        }
    }
    Ok(dirs)
}
