//! Account database snapshot.
//!
//! The passwd and group tables are read once per run, either through
//! `getent` or from files in the same format, and never change afterwards.
use anyhow::{Context as _, Result, bail};
use std::path::{Path, PathBuf};

use crate::error::LookupError;
use crate::exec::{Executor, args};

/// One passwd entry with its primary group name resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Login name.
    pub name: String,
    /// Numeric user id.
    pub uid: u32,
    /// Numeric primary group id.
    pub gid: u32,
    /// Name of the primary group, `None` when the gid has no group entry.
    pub primary_group: Option<String>,
    /// Declared home directory.
    pub home: PathBuf,
    /// Login shell.
    pub shell: String,
}

/// One group entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Group name.
    pub name: String,
    /// Numeric group id.
    pub gid: u32,
}

/// Where the raw passwd and group tables come from.
pub trait AccountSource: std::fmt::Debug {
    /// Raw content in `/etc/passwd` format.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    fn passwd(&self) -> Result<String>;

    /// Raw content in `/etc/group` format.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    fn group(&self) -> Result<String>;
}

/// Reads the system tables through `getent`, so NSS-backed accounts are
/// included.
#[derive(Debug)]
pub struct GetentSource<'a> {
    executor: &'a dyn Executor,
}

impl<'a> GetentSource<'a> {
    /// Create a source that shells out through `executor`.
    #[must_use]
    pub fn new(executor: &'a dyn Executor) -> Self {
        Self { executor }
    }
}

impl AccountSource for GetentSource<'_> {
    fn passwd(&self) -> Result<String> {
        Ok(self.executor.run("getent", &args(&["passwd"]))?.stdout)
    }

    fn group(&self) -> Result<String> {
        Ok(self.executor.run("getent", &args(&["group"]))?.stdout)
    }
}

/// Reads passwd/group-format files from disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    passwd: PathBuf,
    group: PathBuf,
}

impl FileSource {
    /// Create a source reading the two given files.
    #[must_use]
    pub fn new(passwd: impl Into<PathBuf>, group: impl Into<PathBuf>) -> Self {
        Self {
            passwd: passwd.into(),
            group: group.into(),
        }
    }
}

impl AccountSource for FileSource {
    fn passwd(&self) -> Result<String> {
        read_table(&self.passwd)
    }

    fn group(&self) -> Result<String> {
        read_table(&self.group)
    }
}

fn read_table(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// Immutable snapshot of every account and group on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountDatabase {
    accounts: Vec<Account>,
    groups: Vec<Group>,
}

impl AccountDatabase {
    /// Read and parse both tables from `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if either table cannot be read or parsed.
    pub fn load(source: &dyn AccountSource) -> Result<Self> {
        let groups = parse_group(&source.group()?).context("parsing group table")?;
        let passwd = source.passwd()?;
        let accounts = parse_passwd(&passwd, &groups).context("parsing passwd table")?;
        Ok(Self { accounts, groups })
    }

    /// Build a snapshot from already parsed tables.
    #[must_use]
    pub fn from_parts(accounts: Vec<Account>, groups: Vec<Group>) -> Self {
        Self { accounts, groups }
    }

    /// Every account, in table order.
    #[must_use]
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Accounts under management: all of them, or only those whose primary
    /// gid is `limit_gid`.
    #[must_use]
    pub fn managed(&self, limit_gid: Option<u32>) -> Vec<Account> {
        self.accounts
            .iter()
            .filter(|a| limit_gid.is_none_or(|gid| a.gid == gid))
            .cloned()
            .collect()
    }

    /// Uid of the user called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownUser`] if there is no such user.
    pub fn uid_of(&self, name: &str) -> Result<u32, LookupError> {
        self.accounts
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.uid)
            .ok_or_else(|| LookupError::UnknownUser(name.to_string()))
    }

    /// Gid of the group called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownGroup`] if there is no such group.
    pub fn gid_of(&self, name: &str) -> Result<u32, LookupError> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.gid)
            .ok_or_else(|| LookupError::UnknownGroup(name.to_string()))
    }

    /// Name of the group with id `gid`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::UnknownGid`] if no group has that id.
    pub fn group_name(&self, gid: u32) -> Result<&str, LookupError> {
        self.groups
            .iter()
            .find(|g| g.gid == gid)
            .map(|g| g.name.as_str())
            .ok_or(LookupError::UnknownGid(gid))
    }
}

/// Parse group-format content (`name:password:gid:members`).
///
/// # Errors
///
/// Returns an error naming the line if a field is missing or the gid is
/// not numeric.
pub fn parse_group(content: &str) -> Result<Vec<Group>> {
    table_lines(content)
        .map(|(line_num, line)| -> Result<Group> {
            let fields: Vec<&str> = line.split(':').collect();
            let [name, _, gid, ..] = fields.as_slice() else {
                bail!("line {line_num}: expected at least 3 fields: {line}");
            };
            Ok(Group {
                name: (*name).to_string(),
                gid: parse_id(gid, line_num)?,
            })
        })
        .collect()
}

/// Parse passwd-format content (`name:password:uid:gid:gecos:home:shell`),
/// resolving each primary group name against `groups`.
///
/// # Errors
///
/// Returns an error naming the line if it does not have seven fields or an
/// id is not numeric.
pub fn parse_passwd(content: &str, groups: &[Group]) -> Result<Vec<Account>> {
    table_lines(content)
        .map(|(line_num, line)| -> Result<Account> {
            let fields: Vec<&str> = line.split(':').collect();
            let [name, _, uid, gid, _, home, shell] = fields.as_slice() else {
                bail!("line {line_num}: expected 7 fields: {line}");
            };
            let gid = parse_id(gid, line_num)?;
            Ok(Account {
                name: (*name).to_string(),
                uid: parse_id(uid, line_num)?,
                gid,
                primary_group: groups.iter().find(|g| g.gid == gid).map(|g| g.name.clone()),
                home: PathBuf::from(*home),
                shell: (*shell).to_string(),
            })
        })
        .collect()
}

fn table_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn parse_id(raw: &str, line_num: usize) -> Result<u32> {
    raw.parse()
        .with_context(|| format!("line {line_num}: invalid id '{raw}'"))
}
