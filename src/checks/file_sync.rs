//! Copies of host files inside each resource directory.
//!
//! A manifest lists absolute host paths (templates allowed). Each one is
//! mirrored at the same relative location under the account's resource
//! directory, so `/etc/passwd` lands at `<root>/etc/passwd`. The binaries
//! variant also mirrors every shared library the listed programs load.
use anyhow::{Context as _, Result, bail};
use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};

use super::{CheckContext, CheckKind, PerUserCheck};
use crate::accounts::Account;
use crate::config::{Options, manifest};
use crate::effects::{Action, fs};
use crate::template::expand;

/// Configuration section of the plain file check.
pub const FILES_SECTION: &str = "files";
/// Configuration section of the binaries check.
pub const BINARIES_SECTION: &str = "binaries";
/// Plain files run after every directory-level check.
pub const FILES_ORDER: u32 = 5000;
/// Binaries run after plain files.
pub const BINARIES_ORDER: u32 = 5010;

/// Mirrors manifest entries into each resource directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSync {
    entries: Vec<String>,
    with_dependencies: bool,
    stale: Vec<PathBuf>,
}

impl FileSync {
    /// Mirror `entries` exactly as listed.
    #[must_use]
    pub const fn files(entries: Vec<String>) -> Self {
        Self {
            entries,
            with_dependencies: false,
            stale: Vec::new(),
        }
    }

    /// Mirror `entries` plus the shared libraries each one loads.
    #[must_use]
    pub const fn binaries(entries: Vec<String>) -> Self {
        Self {
            entries,
            with_dependencies: true,
            stale: Vec::new(),
        }
    }
}

/// Build the plain file check from the manifest named by `file_list`.
///
/// # Errors
///
/// Returns an error if the option is missing or the manifest cannot be read.
pub fn setup_files(options: &Options) -> Result<CheckKind> {
    let entries = manifest::load(&options.get_path("file_list")?)?;
    Ok(CheckKind::PerUser(Box::new(FileSync::files(entries))))
}

/// Build the binaries check from the manifest named by `file_list`.
///
/// # Errors
///
/// Returns an error if the option is missing or the manifest cannot be read.
pub fn setup_binaries(options: &Options) -> Result<CheckKind> {
    let entries = manifest::load(&options.get_path("file_list")?)?;
    Ok(CheckKind::PerUser(Box::new(FileSync::binaries(entries))))
}

/// Where `source` is mirrored under `root`.
///
/// # Examples
///
/// ```
/// use homekeeper::checks::file_sync::mirror_path;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(
///     mirror_path(Path::new("/srv/sftp/alice"), Path::new("/etc/passwd")),
///     PathBuf::from("/srv/sftp/alice/etc/passwd")
/// );
/// ```
#[must_use]
pub fn mirror_path(root: &Path, source: &Path) -> PathBuf {
    root.join(source.strip_prefix("/").unwrap_or(source))
}

/// Create every missing parent of `source`'s mirror under `root`, root-most
/// first, each with the mode of the matching host directory.
fn ensure_parents(ctx: &CheckContext<'_>, root: &Path, source: &Path) -> Result<()> {
    let mut parents: Vec<&Path> = source
        .ancestors()
        .skip(1)
        .take_while(|p| p.parent().is_some())
        .collect();
    parents.reverse();
    for parent in parents {
        let mirrored = mirror_path(root, parent);
        if mirrored.symlink_metadata().is_ok() {
            continue;
        }
        let mode = std::fs::metadata(parent)
            .with_context(|| format!("inspecting {}", parent.display()))?
            .permissions()
            .mode()
            & 0o7777;
        ctx.effects.execute_safely(&Action::CreateDir {
            path: mirrored,
            mode,
        })?;
    }
    Ok(())
}

impl PerUserCheck for FileSync {
    fn is_correct(&mut self, ctx: &mut CheckContext<'_>, account: &Account) -> Result<bool> {
        let root = ctx.root.expand(account)?;
        self.stale.clear();
        for entry in &self.entries {
            let source = PathBuf::from(expand(entry, account)?);
            if !source.is_absolute() {
                bail!("manifest entry '{entry}' is not an absolute path");
            }
            let mut wanted = Vec::new();
            if self.with_dependencies {
                wanted.extend_from_slice(ctx.dependencies.dependencies_of(&source, ctx.resolver)?);
            }
            wanted.push(source);
            for path in wanted {
                if self.stale.contains(&path) {
                    continue;
                }
                if !fs::files_identical(&path, &mirror_path(&root, &path))? {
                    self.stale.push(path);
                }
            }
        }
        for path in &self.stale {
            ctx.log.info(&format!(
                "{} is missing or differs from {}",
                mirror_path(&root, path).display(),
                path.display()
            ));
        }
        Ok(self.stale.is_empty())
    }

    fn correct(&mut self, ctx: &mut CheckContext<'_>, account: &Account) -> Result<()> {
        let root = ctx.root.expand(account)?;
        for source in std::mem::take(&mut self.stale) {
            ensure_parents(ctx, &root, &source)?;
            let destination = mirror_path(&root, &source);
            ctx.effects.execute_safely(&Action::CopyFile {
                source,
                destination,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::checks::run_per_user;
    use crate::checks::test_helpers::Harness;
    use crate::effects::fs::set_mode;
    use mockall::predicate::function;

    struct Host {
        _tmp: tempfile::TempDir,
        host: PathBuf,
        base: PathBuf,
    }

    /// A fake host tree with `bin/tool`, `lib/libx.so` and `etc/motd`, and
    /// an empty resource base.
    fn host() -> Host {
        let tmp = tempfile::tempdir().unwrap();
        let host = tmp.path().join("host");
        let base = tmp.path().join("sftp");
        for dir in ["bin", "lib", "etc"] {
            std::fs::create_dir_all(host.join(dir)).unwrap();
        }
        set_mode(&host.join("lib"), 0o751).unwrap();
        std::fs::write(host.join("bin/tool"), "#!/bin/sh\n").unwrap();
        std::fs::write(host.join("lib/libx.so"), "ELF").unwrap();
        std::fs::write(host.join("etc/motd"), "hello\n").unwrap();
        std::fs::create_dir(&base).unwrap();
        std::fs::create_dir(base.join("alice")).unwrap();
        Host {
            _tmp: tmp,
            host,
            base,
        }
    }

    fn entry(path: &Path) -> String {
        path.display().to_string()
    }

    #[test]
    fn copies_missing_file_with_parents() {
        let h = host();
        let motd = h.host.join("etc/motd");
        let mut harness = Harness::new(&h.base, &["alice"]);
        let mut check = FileSync::files(vec![entry(&motd)]);

        let stats = run_per_user(&mut check, true, &mut harness.context()).unwrap();

        assert_eq!(stats.corrected, 1);
        let copied = mirror_path(&h.base.join("alice"), &motd);
        assert_eq!(std::fs::read_to_string(&copied).unwrap(), "hello\n");

        let stats = run_per_user(&mut check, true, &mut harness.context()).unwrap();
        assert_eq!(stats.compliant, 1);
    }

    #[test]
    fn differing_file_is_replaced() {
        let h = host();
        let motd = h.host.join("etc/motd");
        let copied = mirror_path(&h.base.join("alice"), &motd);
        std::fs::create_dir_all(copied.parent().unwrap()).unwrap();
        std::fs::write(&copied, "stale\n").unwrap();
        let mut harness = Harness::new(&h.base, &["alice"]);
        let mut check = FileSync::files(vec![entry(&motd)]);

        run_per_user(&mut check, true, &mut harness.context()).unwrap();

        assert_eq!(std::fs::read_to_string(&copied).unwrap(), "hello\n");
    }

    #[test]
    fn new_parent_takes_host_mode() {
        let h = host();
        let lib = h.host.join("lib/libx.so");
        let mut harness = Harness::new(&h.base, &["alice"]);
        let mut check = FileSync::files(vec![entry(&lib)]);

        run_per_user(&mut check, true, &mut harness.context()).unwrap();

        let mirrored_dir = mirror_path(&h.base.join("alice"), &h.host.join("lib"));
        assert_eq!(
            std::fs::metadata(&mirrored_dir).unwrap().permissions().mode() & 0o7777,
            0o751
        );
    }

    #[test]
    fn template_entries_expand_per_account() {
        let h = host();
        std::fs::write(h.host.join("etc/alice.conf"), "a").unwrap();
        let mut harness = Harness::new(&h.base, &["alice"]);
        let mut check = FileSync::files(vec![format!("{}/etc/$u.conf", h.host.display())]);

        run_per_user(&mut check, true, &mut harness.context()).unwrap();

        assert!(mirror_path(&h.base.join("alice"), &h.host.join("etc/alice.conf")).is_file());
    }

    #[test]
    fn relative_entry_fails() {
        let h = host();
        let mut harness = Harness::new(&h.base, &["alice"]);
        let mut check = FileSync::files(vec!["etc/motd".to_string()]);

        let err = run_per_user(&mut check, true, &mut harness.context()).unwrap_err();
        assert!(err.to_string().contains("not an absolute path"));
    }

    #[test]
    fn missing_source_fails() {
        let h = host();
        let mut harness = Harness::new(&h.base, &["alice"]);
        let mut check = FileSync::files(vec![entry(&h.host.join("etc/absent"))]);

        assert!(run_per_user(&mut check, true, &mut harness.context()).is_err());
    }

    #[test]
    fn binaries_bring_their_libraries_resolved_once() {
        let h = host();
        std::fs::create_dir(h.base.join("bob")).unwrap();
        let tool = h.host.join("bin/tool");
        let lib = h.host.join("lib/libx.so");
        let mut harness = Harness::new(&h.base, &["alice", "bob"]);
        let resolved = vec![lib.clone()];
        let expected = tool.clone();
        harness
            .resolver
            .expect_resolve()
            .with(function(move |binary: &Path| binary == expected))
            .times(1)
            .returning(move |_| Ok(resolved.clone()));
        let mut check = FileSync::binaries(vec![entry(&tool)]);

        let stats = run_per_user(&mut check, true, &mut harness.context()).unwrap();

        assert_eq!(stats.corrected, 2);
        for name in ["alice", "bob"] {
            let root = h.base.join(name);
            assert!(mirror_path(&root, &tool).is_file());
            assert!(mirror_path(&root, &lib).is_file());
        }
    }

    #[test]
    fn simulate_creates_nothing() {
        let h = host();
        let motd = h.host.join("etc/motd");
        let mut harness = Harness::new(&h.base, &["alice"]);
        harness.simulate = true;
        let mut check = FileSync::files(vec![entry(&motd)]);

        run_per_user(&mut check, true, &mut harness.context()).unwrap();

        assert_eq!(std::fs::read_dir(h.base.join("alice")).unwrap().count(), 0);
        let dry = harness.log.lines_of("dry_run");
        assert!(dry.last().unwrap().starts_with("would cp -p "));
        assert!(dry[..dry.len() - 1]
            .iter()
            .all(|line| line.starts_with("would mkdir -m ")));
    }

    #[test]
    fn setup_reads_manifest() {
        let h = host();
        let list = h.host.join("files.list");
        std::fs::write(&list, format!("# motd\n{}\n", h.host.join("etc/motd").display())).unwrap();
        let options = Options::new(FILES_SECTION).with("file_list", list.display().to_string());
        assert!(setup_files(&options).is_ok());
        let missing = Options::new(BINARIES_SECTION).with("file_list", "/nonexistent/list");
        assert!(setup_binaries(&missing).is_err());
    }
}
