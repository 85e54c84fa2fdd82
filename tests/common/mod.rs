// Shared helpers for integration tests.
//
// Provides a temporary site (account tables, a resource base, a trash
// directory and a small fake host tree) plus a fluent configuration
// builder, so each integration test can run the engine against an
// isolated environment.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::fmt::Write as _;
use std::os::unix::fs::{MetadataExt as _, PermissionsExt as _};
use std::path::{Path, PathBuf};

use homekeeper::config::ConfigSource;
use homekeeper::engine::{self, ExitStatus, RunOverrides};
use homekeeper::logging::MemoryLog;

/// Primary group of the managed accounts.
pub const MANAGED_GROUP: &str = "sftponly";

/// A scratch site backed by a [`tempfile::TempDir`].
///
/// Layout:
/// - `passwd`, `group`: `alice` and `bob` in `sftponly`, plus `keeper`
///   carrying the uid and gid of the test process (group `keepers`)
/// - `sftp/`: resource base, initially empty
/// - `trash/`: archive destination
/// - `host/etc/motd`: a file to mirror, listed in `files.list`
pub struct Site {
    /// Temporary directory holding the whole site.
    pub tmp: tempfile::TempDir,
}

impl Site {
    /// Create the site layout.
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().expect("create temp dir");
        let root = tmp.path();
        let meta = std::fs::metadata(root).expect("stat temp dir");
        std::fs::write(
            root.join("passwd"),
            format!(
                "alice:x:1001:2000::/home/alice:/bin/sh\n\
                 bob:x:1002:2000::/home/bob:/bin/sh\n\
                 keeper:x:{}:{}::/var/lib/keeper:/usr/sbin/nologin\n",
                meta.uid(),
                meta.gid()
            ),
        )
        .expect("write passwd");
        std::fs::write(
            root.join("group"),
            format!("{MANAGED_GROUP}:x:2000:\nkeepers:x:{}:\n", meta.gid()),
        )
        .expect("write group");
        for dir in ["sftp", "trash", "host/etc"] {
            std::fs::create_dir_all(root.join(dir)).expect("create site dir");
        }
        std::fs::write(root.join("host/etc/motd"), "welcome\n").expect("write motd");
        std::fs::write(
            root.join("files.list"),
            format!("# mirrored into every home\n{}\n", root.join("host/etc/motd").display()),
        )
        .expect("write files.list");
        Self { tmp }
    }

    /// Site root.
    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    /// Resource base: every account's directory lives directly inside.
    pub fn base(&self) -> PathBuf {
        self.path().join("sftp")
    }

    /// Archive destination for obsolete directories.
    pub fn trash(&self) -> PathBuf {
        self.path().join("trash")
    }

    /// The mirrored copy of `host/etc/motd` inside `account`'s directory.
    pub fn mirrored_motd(&self, account: &str) -> PathBuf {
        let source = self.path().join("host/etc/motd");
        self.base()
            .join(account)
            .join(source.strip_prefix("/").expect("absolute temp dir"))
    }

    /// Start a configuration for this site with sane `[main]` defaults.
    pub fn config(&self) -> ConfigBuilder {
        ConfigBuilder {
            site: self.path().to_path_buf(),
            simulate: false,
            minimum_accounts: 2,
            sections: String::new(),
        }
    }
}

/// Fluent builder for the INI configuration of a [`Site`].
pub struct ConfigBuilder {
    site: PathBuf,
    simulate: bool,
    minimum_accounts: usize,
    sections: String,
}

impl ConfigBuilder {
    /// Set `[main] simulate`.
    pub fn simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    /// Set `[main] minimum_accounts`.
    pub fn minimum_accounts(mut self, minimum: usize) -> Self {
        self.minimum_accounts = minimum;
        self
    }

    /// Enable the check configured by `section`, with its own options.
    pub fn check(mut self, section: &str, correct: bool, options: &[(&str, &str)]) -> Self {
        let correct = if correct { "yes" } else { "no" };
        let _ = writeln!(self.sections, "[{section}]\ncheck = yes\ncorrect = {correct}");
        for (key, value) in options {
            let _ = writeln!(self.sections, "{key} = {value}");
        }
        self
    }

    /// Every check, correcting, with options matching the site layout.
    pub fn all_checks(self) -> Self {
        let trash = self.site.join("trash").display().to_string();
        let list = self.site.join("files.list").display().to_string();
        self.check("existence", true, &[])
            .check("permissions", true, &[("octal_permissions", "0750")])
            .check("owner", true, &[("owner", "keeper")])
            .check("group", true, &[("group", "keepers")])
            .check(
                "obsoletes",
                true,
                &[
                    ("trash_path", trash.as_str()),
                    ("trash_octal_permissions", "0600"),
                ],
            )
            .check("files", true, &[("file_list", list.as_str())])
    }

    /// Render the INI document.
    pub fn render(&self) -> String {
        let site = self.site.display();
        let simulate = if self.simulate { "yes" } else { "no" };
        format!(
            "[main]\n\
             resource_root = {site}/sftp/$u\n\
             simulate = {simulate}\n\
             limit_to_primary_group = yes\n\
             primary_group_name = {MANAGED_GROUP}\n\
             minimum_accounts = {}\n\
             passwd_file = {site}/passwd\n\
             group_file = {site}/group\n\
             {}",
            self.minimum_accounts, self.sections
        )
    }

    /// In-memory configuration source.
    pub fn source(&self) -> ConfigSource {
        ConfigSource::Inline {
            name: "test.conf".to_string(),
            content: self.render(),
        }
    }

    /// Write the configuration next to the site and return a file source.
    pub fn write(&self) -> ConfigSource {
        let path = self.site.join("homekeeper.conf");
        std::fs::write(&path, self.render()).expect("write config");
        ConfigSource::File(path)
    }
}

/// Run the engine with real system commands and an in-memory log.
pub fn run(source: &ConfigSource, overrides: &RunOverrides) -> (ExitStatus, MemoryLog) {
    let log = MemoryLog::new();
    let status = engine::run(source, overrides, &log);
    (status, log)
}

/// Every entry under `root` with its permission bits and size, sorted.
pub fn tree_snapshot(root: &Path) -> Vec<(PathBuf, u32, u64)> {
    let mut entries = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).expect("list dir") {
            let entry = entry.expect("dir entry");
            let meta = entry.metadata().expect("stat entry");
            let path = entry.path();
            if meta.is_dir() {
                pending.push(path.clone());
            }
            entries.push((path, meta.permissions().mode() & 0o7777, meta.len()));
        }
    }
    entries.sort();
    entries
}
