//! Compliance checks: the three iteration shapes, their drivers, and the
//! static registry.
//!
//! A check is set up from its configuration section, then run once per
//! invocation. Its driver asks `is_correct` for every item of its shape and,
//! when the section's `correct` flag is on, calls `correct` for each
//! non-compliant item. All mutations go through
//! [`Effects`](crate::effects::Effects).
pub mod account_field;
pub mod dependencies;
pub mod existence;
pub mod file_sync;
pub mod obsoletes;
pub mod ownership;
pub mod permissions;

use anyhow::{Context as _, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use crate::accounts::{Account, AccountDatabase};
use crate::config::{Config, Options};
use crate::effects::Effects;
use crate::logging::Log;
use crate::template::{ResourceRoot, existing_directories};

use dependencies::{DependencyCache, DependencyResolver};

/// Order used by checks that do not need to run early or late.
pub const DEFAULT_ORDER: u32 = 1000;

/// Counters collected while running one check.
///
/// # Examples
///
/// ```
/// use homekeeper::checks::CheckStats;
///
/// let stats = CheckStats { compliant: 10, non_compliant: 2, corrected: 2 };
/// assert_eq!(stats.summary(false), "10 compliant, 2 non-compliant, 2 corrected");
/// assert_eq!(stats.summary(true), "10 compliant, 2 non-compliant, 2 would correct");
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckStats {
    /// Items that already matched the desired state.
    pub compliant: u32,
    /// Items that did not.
    pub non_compliant: u32,
    /// Non-compliant items handed to `correct`.
    pub corrected: u32,
}

impl CheckStats {
    /// Create a new empty stats counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Format the summary string (e.g. "10 compliant, 2 non-compliant, 2 corrected").
    #[must_use]
    pub fn summary(&self, simulate: bool) -> String {
        let verb = if simulate { "would correct" } else { "corrected" };
        format!(
            "{} compliant, {} non-compliant, {} {verb}",
            self.compliant, self.non_compliant, self.corrected
        )
    }
}

impl std::ops::AddAssign for CheckStats {
    fn add_assign(&mut self, other: Self) {
        self.compliant += other.compliant;
        self.non_compliant += other.non_compliant;
        self.corrected += other.corrected;
    }
}

/// Everything a check may read or use while it runs.
pub struct CheckContext<'a> {
    /// Per-account resource root.
    pub root: &'a ResourceRoot,
    /// Managed accounts.
    pub accounts: &'a [Account],
    /// Full account database, for name and id lookups.
    pub database: &'a AccountDatabase,
    /// The dry-run boundary.
    pub effects: Effects<'a>,
    /// Logger for findings.
    pub log: &'a dyn Log,
    /// Run-wide memo of binary dependencies.
    pub dependencies: &'a mut DependencyCache,
    /// Resolver used to fill `dependencies`.
    pub resolver: &'a dyn DependencyResolver,
}

impl fmt::Debug for CheckContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckContext")
            .field("root", &self.root)
            .field("accounts", &self.accounts.len())
            .field("effects", &self.effects)
            .field("log", &"<dyn Log>")
            .field("dependencies", &self.dependencies)
            .field("resolver", &"<dyn DependencyResolver>")
            .finish_non_exhaustive()
    }
}

/// A check evaluated once per managed account.
pub trait PerUserCheck {
    /// Whether `account`'s resources match the desired state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be determined.
    fn is_correct(&mut self, ctx: &mut CheckContext<'_>, account: &Account) -> Result<bool>;

    /// Bring `account`'s resources to the desired state.
    ///
    /// # Errors
    ///
    /// Returns an error if a correction fails.
    fn correct(&mut self, ctx: &mut CheckContext<'_>, account: &Account) -> Result<()>;
}

/// A check evaluated once per directory found under the resource root.
pub trait PerDirectoryCheck {
    /// Whether `directory` matches the desired state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be determined.
    fn is_correct(&mut self, ctx: &mut CheckContext<'_>, directory: &Path) -> Result<bool>;

    /// Bring `directory` to the desired state.
    ///
    /// # Errors
    ///
    /// Returns an error if a correction fails.
    fn correct(&mut self, ctx: &mut CheckContext<'_>, directory: &Path) -> Result<()>;
}

/// A check comparing the whole account set with the whole directory set.
pub trait HybridCheck {
    /// Whether the two sets are consistent.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be determined.
    fn is_correct(
        &mut self,
        ctx: &mut CheckContext<'_>,
        accounts: &[Account],
        directories: &BTreeSet<PathBuf>,
    ) -> Result<bool>;

    /// Make the two sets consistent.
    ///
    /// # Errors
    ///
    /// Returns an error if a correction fails.
    fn correct(
        &mut self,
        ctx: &mut CheckContext<'_>,
        accounts: &[Account],
        directories: &BTreeSet<PathBuf>,
    ) -> Result<()>;
}

/// Iteration shape of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// One evaluation per managed account.
    PerUser,
    /// One evaluation per existing directory.
    PerDirectory,
    /// One evaluation over all accounts and directories.
    Hybrid,
}

impl Shape {
    /// Whether checks of this shape list the directories under the root.
    #[must_use]
    pub const fn enumerates_directories(self) -> bool {
        matches!(self, Self::PerDirectory | Self::Hybrid)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PerUser => "per-user",
            Self::PerDirectory => "per-directory",
            Self::Hybrid => "hybrid",
        })
    }
}

/// A configured check, boxed by shape.
pub enum CheckKind {
    /// See [`PerUserCheck`].
    PerUser(Box<dyn PerUserCheck>),
    /// See [`PerDirectoryCheck`].
    PerDirectory(Box<dyn PerDirectoryCheck>),
    /// See [`HybridCheck`].
    Hybrid(Box<dyn HybridCheck>),
}

impl CheckKind {
    /// Shape of the boxed check.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        match self {
            Self::PerUser(_) => Shape::PerUser,
            Self::PerDirectory(_) => Shape::PerDirectory,
            Self::Hybrid(_) => Shape::Hybrid,
        }
    }
}

impl fmt::Debug for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CheckKind::{:?}", self.shape())
    }
}

/// An enabled check ready to run.
#[derive(Debug)]
pub struct Check {
    section: &'static str,
    order: u32,
    correct: bool,
    programs: &'static [Program],
    kind: CheckKind,
}

/// External program a check shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    /// Run while inspecting, so needed whenever the check is enabled.
    Inspect(&'static str),
    /// Run only to change the host.
    Change(&'static str),
}

impl Check {
    /// Assemble a check from its descriptor and implementation.
    #[must_use]
    pub const fn new(section: &'static str, order: u32, correct: bool, kind: CheckKind) -> Self {
        Self {
            section,
            order,
            correct,
            programs: &[],
            kind,
        }
    }

    /// Declare the external programs this check runs.
    #[must_use]
    pub const fn requiring(mut self, programs: &'static [Program]) -> Self {
        self.programs = programs;
        self
    }

    /// Programs that must be on `PATH` for this run of the check.
    pub fn required_programs(&self, simulate: bool) -> impl Iterator<Item = &'static str> {
        let changes = self.correct && !simulate;
        self.programs.iter().filter_map(move |program| match *program {
            Program::Inspect(name) => Some(name),
            Program::Change(name) => changes.then_some(name),
        })
    }

    /// Configuration section naming this check.
    #[must_use]
    pub const fn section(&self) -> &'static str {
        self.section
    }

    /// Position in the run; lower runs earlier.
    #[must_use]
    pub const fn order(&self) -> u32 {
        self.order
    }

    /// Whether non-compliant items are corrected.
    #[must_use]
    pub const fn corrects(&self) -> bool {
        self.correct
    }

    /// Iteration shape.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.kind.shape()
    }

    /// Run the check's full cycle.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while checking or correcting; items
    /// after it are not visited.
    pub fn run(&mut self, ctx: &mut CheckContext<'_>) -> Result<CheckStats> {
        match &mut self.kind {
            CheckKind::PerUser(check) => run_per_user(check.as_mut(), self.correct, ctx),
            CheckKind::PerDirectory(check) => {
                run_per_directory(check.as_mut(), self.correct, ctx)
            }
            CheckKind::Hybrid(check) => run_hybrid(check.as_mut(), self.correct, ctx),
        }
    }
}

/// Drive a [`PerUserCheck`] over every managed account.
///
/// # Errors
///
/// Propagates the first check or correction error.
pub fn run_per_user(
    check: &mut dyn PerUserCheck,
    correct: bool,
    ctx: &mut CheckContext<'_>,
) -> Result<CheckStats> {
    let accounts = ctx.accounts;
    let mut stats = CheckStats::new();
    for account in accounts {
        if check.is_correct(ctx, account)? {
            stats.compliant += 1;
            continue;
        }
        stats.non_compliant += 1;
        if !correct {
            ctx.log.debug(&format!(
                "correction skipped for {}: disabled in configuration",
                account.name
            ));
            continue;
        }
        check.correct(ctx, account)?;
        stats.corrected += 1;
    }
    Ok(stats)
}

/// Drive a [`PerDirectoryCheck`] over every directory under the root.
///
/// # Errors
///
/// Returns an error if the root cannot be enumerated, and propagates the
/// first check or correction error.
pub fn run_per_directory(
    check: &mut dyn PerDirectoryCheck,
    correct: bool,
    ctx: &mut CheckContext<'_>,
) -> Result<CheckStats> {
    let base = ctx.root.base_dir()?;
    let mut stats = CheckStats::new();
    for directory in existing_directories(&base)? {
        if check.is_correct(ctx, &directory)? {
            stats.compliant += 1;
            continue;
        }
        stats.non_compliant += 1;
        if !correct {
            ctx.log.debug(&format!(
                "correction skipped for {}: disabled in configuration",
                directory.display()
            ));
            continue;
        }
        check.correct(ctx, &directory)?;
        stats.corrected += 1;
    }
    Ok(stats)
}

/// Drive a [`HybridCheck`] once over all accounts and directories.
///
/// # Errors
///
/// Returns an error if the root cannot be enumerated, and propagates check
/// or correction errors.
pub fn run_hybrid(
    check: &mut dyn HybridCheck,
    correct: bool,
    ctx: &mut CheckContext<'_>,
) -> Result<CheckStats> {
    let base = ctx.root.base_dir()?;
    let directories = existing_directories(&base)?;
    let accounts = ctx.accounts;
    let mut stats = CheckStats::new();
    if check.is_correct(ctx, accounts, &directories)? {
        stats.compliant += 1;
        return Ok(stats);
    }
    stats.non_compliant += 1;
    if !correct {
        ctx.log.debug("correction skipped: disabled in configuration");
        return Ok(stats);
    }
    check.correct(ctx, accounts, &directories)?;
    stats.corrected += 1;
    Ok(stats)
}

/// Metadata of `path`, or `None` if nothing exists there.
///
/// # Errors
///
/// Returns an error for any failure other than the path being absent.
pub fn metadata_if_exists(path: &Path) -> Result<Option<Metadata>> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("inspecting {}", path.display())),
    }
}

/// Builds a check from its section's options.
pub type SetupFn = fn(&Options) -> Result<CheckKind>;

/// Static description of one check in the registry.
#[derive(Debug, Clone, Copy)]
pub struct CheckSpec {
    /// Configuration section.
    pub section: &'static str,
    /// Position in the run; lower runs earlier.
    pub order: u32,
    /// Iteration shape.
    pub shape: Shape,
    /// External programs the check runs.
    pub programs: &'static [Program],
    setup: SetupFn,
}

impl CheckSpec {
    /// Set the check up from `config`.
    ///
    /// Returns `Ok(None)` when the section is absent or its `check` flag is
    /// off. Checks that list directories validate `root` first, before any
    /// of their options are used.
    ///
    /// # Errors
    ///
    /// Returns an error if an option is missing or invalid, the root cannot
    /// be enumerated by this shape, or a referenced file cannot be read.
    pub fn setup(&self, config: &Config, root: &ResourceRoot) -> Result<Option<Check>> {
        let Some(options) = config.section(self.section) else {
            return Ok(None);
        };
        if !options.get_bool("check")? {
            return Ok(None);
        }
        let correct = options.get_bool("correct")?;
        if self.shape.enumerates_directories() {
            root.base_dir()?;
        }
        let kind = (self.setup)(options)
            .with_context(|| format!("setting up [{}]", self.section))?;
        Ok(Some(
            Check::new(self.section, self.order, correct, kind).requiring(self.programs),
        ))
    }
}

const REGISTRY: &[CheckSpec] = &[
    CheckSpec {
        section: account_field::HOME_SECTION,
        order: account_field::ORDER,
        shape: Shape::PerUser,
        programs: &[Program::Change("usermod")],
        setup: account_field::setup_home,
    },
    CheckSpec {
        section: account_field::SHELL_SECTION,
        order: account_field::ORDER,
        shape: Shape::PerUser,
        programs: &[Program::Change("usermod")],
        setup: account_field::setup_shell,
    },
    CheckSpec {
        section: existence::SECTION,
        order: existence::ORDER,
        shape: Shape::Hybrid,
        programs: &[],
        setup: existence::setup,
    },
    CheckSpec {
        section: permissions::SECTION,
        order: DEFAULT_ORDER,
        shape: Shape::PerUser,
        programs: &[],
        setup: permissions::setup,
    },
    CheckSpec {
        section: ownership::OWNER_SECTION,
        order: DEFAULT_ORDER,
        shape: Shape::PerUser,
        programs: &[],
        setup: ownership::setup_owner,
    },
    CheckSpec {
        section: ownership::GROUP_SECTION,
        order: DEFAULT_ORDER,
        shape: Shape::PerUser,
        programs: &[],
        setup: ownership::setup_group,
    },
    CheckSpec {
        section: obsoletes::SECTION,
        order: obsoletes::ORDER,
        shape: Shape::Hybrid,
        programs: &[],
        setup: obsoletes::setup,
    },
    CheckSpec {
        section: file_sync::FILES_SECTION,
        order: file_sync::FILES_ORDER,
        shape: Shape::PerUser,
        programs: &[],
        setup: file_sync::setup_files,
    },
    CheckSpec {
        section: file_sync::BINARIES_SECTION,
        order: file_sync::BINARIES_ORDER,
        shape: Shape::PerUser,
        programs: &[Program::Inspect("ldd")],
        setup: file_sync::setup_binaries,
    },
];

/// Every known check, in execution order: ascending `order`, ties kept in
/// registration order.
#[must_use]
pub fn registry() -> Vec<CheckSpec> {
    let mut specs = REGISTRY.to_vec();
    specs.sort_by_key(|spec| spec.order);
    specs
}
