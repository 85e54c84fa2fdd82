//! Shared-library dependency resolution for synchronized binaries.
use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use crate::exec::Executor;

/// Resolves the shared libraries a binary needs at runtime.
#[cfg_attr(test, mockall::automock)]
pub trait DependencyResolver {
    /// Absolute paths of every library `binary` loads, including the
    /// dynamic loader.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary cannot be inspected.
    fn resolve(&self, binary: &Path) -> Result<Vec<PathBuf>>;
}

/// [`DependencyResolver`] backed by `ldd`.
#[derive(Debug)]
pub struct LddResolver<'a> {
    executor: &'a dyn Executor,
}

impl<'a> LddResolver<'a> {
    /// Create a resolver that runs `ldd` through `executor`.
    #[must_use]
    pub const fn new(executor: &'a dyn Executor) -> Self {
        Self { executor }
    }
}

impl DependencyResolver for LddResolver<'_> {
    fn resolve(&self, binary: &Path) -> Result<Vec<PathBuf>> {
        let result = self
            .executor
            .run_unchecked("ldd", &[binary.to_string_lossy().into_owned()])?;
        if result.success {
            return Ok(parse_ldd_output(&result.stdout));
        }
        // Static binaries have nothing to resolve.
        if result.stdout.contains("not a dynamic executable")
            || result.stderr.contains("not a dynamic executable")
        {
            return Ok(Vec::new());
        }
        bail!(
            "ldd {} failed (exit {}): {}",
            binary.display(),
            result.code.unwrap_or(-1),
            result.stderr.trim()
        );
    }
}

/// Extract library paths from `ldd` output.
///
/// Two line shapes carry a path:
///
/// - `\tlibacl.so.1 => /lib/x86_64-linux-gnu/libacl.so.1 (0x...)`
/// - `\t/lib64/ld-linux-x86-64.so.2 (0x...)`
///
/// Virtual objects such as `linux-vdso.so.1` are skipped.
///
/// # Examples
///
/// ```
/// use homekeeper::checks::dependencies::parse_ldd_output;
/// use std::path::PathBuf;
///
/// let out = "\tlinux-vdso.so.1 (0x00007ffd)\n\
///            \tlibc.so.6 => /lib/x86_64-linux-gnu/libc.so.6 (0x00007f)\n\
///            \t/lib64/ld-linux-x86-64.so.2 (0x00007f)\n";
/// assert_eq!(
///     parse_ldd_output(out),
///     vec![
///         PathBuf::from("/lib/x86_64-linux-gnu/libc.so.6"),
///         PathBuf::from("/lib64/ld-linux-x86-64.so.2"),
///     ]
/// );
/// ```
#[must_use]
pub fn parse_ldd_output(output: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for line in output.lines() {
        let token = if let Some((_, target)) = line.split_once("=> /") {
            target
                .split_whitespace()
                .next()
                .map(|rest| format!("/{rest}"))
        } else if line.trim_start().starts_with('/') {
            line.split_whitespace().next().map(String::from)
        } else {
            None
        };
        if let Some(path) = token.map(PathBuf::from)
            && !paths.contains(&path)
        {
            paths.push(path);
        }
    }
    paths
}

/// Memoised dependency lists, keyed by canonical binary path, for one run.
#[derive(Debug, Default)]
pub struct DependencyCache {
    entries: BTreeMap<PathBuf, Vec<PathBuf>>,
}

impl DependencyCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dependencies of `binary`, resolving them on first request.
    ///
    /// The key is the canonicalised path, so symlinked names of the same
    /// binary share one entry; a path that cannot be canonicalised is used
    /// as given.
    ///
    /// # Errors
    ///
    /// Propagates resolver errors. Failures are not cached.
    pub fn dependencies_of(
        &mut self,
        binary: &Path,
        resolver: &dyn DependencyResolver,
    ) -> Result<&[PathBuf]> {
        let key = dunce::canonicalize(binary).unwrap_or_else(|_| binary.to_path_buf());
        let deps = match self.entries.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(resolver.resolve(binary)?),
        };
        Ok(deps.as_slice())
    }

    /// Number of binaries resolved so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
