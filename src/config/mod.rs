//! Configuration loading: INI sections, typed options and global settings.
pub mod ini;
pub mod manifest;
mod options;

pub use options::Options;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Name of the section holding run-wide settings.
pub const MAIN_SECTION: &str = "main";

/// Where the configuration is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// An INI file on disk.
    File(PathBuf),
    /// In-memory INI content, named for error messages.
    Inline {
        /// Name used in error messages.
        name: String,
        /// INI document.
        content: String,
    },
}

/// All sections of a configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    sections: BTreeMap<String, Options>,
}

impl Config {
    /// Read and parse a configuration source.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid INI.
    pub fn load(source: &ConfigSource) -> Result<Self, ConfigError> {
        match source {
            ConfigSource::File(path) => {
                let content = read_file(path)?;
                Self::parse(&path.display().to_string(), &content)
            }
            ConfigSource::Inline { name, content } => Self::parse(name, content),
        }
    }

    /// Parse INI content. Repeated sections are merged, later keys win.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSyntax`] for malformed content.
    pub fn parse(name: &str, content: &str) -> Result<Self, ConfigError> {
        let mut sections: BTreeMap<String, Options> = BTreeMap::new();
        for kv in ini::parse_sections(name, content)? {
            let options = sections
                .entry(kv.header.clone())
                .or_insert_with(|| Options::new(kv.header.clone()));
            for (key, value) in kv.entries {
                options.insert(key, value);
            }
        }
        Ok(Self { sections })
    }

    /// Options of `section`, if present.
    #[must_use]
    pub fn section(&self, section: &str) -> Option<&Options> {
        self.sections.get(section)
    }

    /// Options of `section`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSection`] if the section is absent.
    pub fn require(&self, section: &str) -> Result<&Options, ConfigError> {
        self.section(section)
            .ok_or_else(|| ConfigError::MissingSection(section.to_string()))
    }

    /// Names of every section, sorted.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}

/// Alternative account database files in passwd/group format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFiles {
    /// File in `/etc/passwd` format.
    pub passwd: PathBuf,
    /// File in `/etc/group` format.
    pub group: PathBuf,
}

/// Run-wide settings from the `[main]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainSettings {
    /// Resource root template (`resource_root`).
    pub resource_root: String,
    /// Log intended actions without performing them (`simulate`).
    pub simulate: bool,
    /// Only manage accounts whose primary group has this name
    /// (`limit_to_primary_group` + `primary_group_name`).
    pub primary_group: Option<String>,
    /// Abort when fewer managed accounts are found (`minimum_accounts`).
    pub minimum_accounts: usize,
    /// Read accounts from files instead of `getent` (`passwd_file` + `group_file`).
    pub account_files: Option<AccountFiles>,
}

impl MainSettings {
    /// Validate and read the required global options.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or unparseable, or if
    /// only one of `passwd_file`/`group_file` is given.
    pub fn from_options(options: &Options) -> Result<Self, ConfigError> {
        let resource_root = options.get_str("resource_root")?.to_string();
        if resource_root.is_empty() {
            return Err(ConfigError::InvalidValue {
                section: options.section().to_string(),
                key: "resource_root".to_string(),
                value: resource_root,
                expected: "a non-empty path template",
            });
        }
        let simulate = options.get_bool("simulate")?;
        let primary_group = if options.get_bool("limit_to_primary_group")? {
            Some(options.get_str("primary_group_name")?.to_string())
        } else {
            None
        };
        let minimum_accounts = options.get_count("minimum_accounts")?;

        let account_files = match (options.contains("passwd_file"), options.contains("group_file")) {
            (false, false) => None,
            (true, true) => Some(AccountFiles {
                passwd: options.get_path("passwd_file")?,
                group: options.get_path("group_file")?,
            }),
            (true, false) => return Err(missing(options, "group_file")),
            (false, true) => return Err(missing(options, "passwd_file")),
        };

        Ok(Self {
            resource_root,
            simulate,
            primary_group,
            minimum_accounts,
            account_files,
        })
    }
}

fn missing(options: &Options, key: &str) -> ConfigError {
    ConfigError::MissingOption {
        section: options.section().to_string(),
        key: key.to_string(),
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
