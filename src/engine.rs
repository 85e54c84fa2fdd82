//! Single-pass orchestration: configuration, accounts, check setup, run.
//!
//! Every fatal problem (bad configuration, too few accounts, a check that
//! cannot be set up) is detected before the first check runs. Once checks
//! are running, a failing check is logged and recorded and the next one
//! still runs.
use anyhow::{Context as _, Result};
use std::process::ExitCode;

use crate::accounts::{Account, AccountDatabase, FileSource, GetentSource};
use crate::checks::dependencies::{DependencyCache, LddResolver};
use crate::checks::{Check, CheckContext, CheckStats, registry};
use crate::config::{Config, ConfigSource, MAIN_SECTION, MainSettings};
use crate::effects::Effects;
use crate::error::PreconditionError;
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{CheckStatus, Log};
use crate::template::ResourceRoot;

/// Command-line adjustments applied on top of the configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    /// Force simulate mode on, whatever `[main] simulate` says.
    pub simulate: bool,
    /// Run only these sections (empty means all).
    pub only: Vec<String>,
    /// Never run these sections.
    pub skip: Vec<String>,
}

impl RunOverrides {
    /// Whether the check configured in `section` may run.
    #[must_use]
    pub fn selects(&self, section: &str) -> bool {
        let named = |list: &[String]| list.iter().any(|s| s.eq_ignore_ascii_case(section));
        if !self.only.is_empty() && !named(&self.only) {
            return false;
        }
        !named(&self.skip)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every enabled check completed.
    Success,
    /// The run aborted before any check executed.
    Fatal,
    /// At least one check failed.
    ChecksFailed,
}

impl ExitStatus {
    /// Process exit code: 0, 1 or 2.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Fatal => 1,
            Self::ChecksFailed => 2,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status.code())
    }
}

/// Everything resolved before the first check runs.
struct Plan {
    simulate: bool,
    root: ResourceRoot,
    database: AccountDatabase,
    accounts: Vec<Account>,
    checks: Vec<(&'static str, Option<Check>)>,
}

/// Run every enabled check against the host, using real system commands.
pub fn run(source: &ConfigSource, overrides: &RunOverrides, log: &dyn Log) -> ExitStatus {
    run_with(source, overrides, log, &SystemExecutor)
}

/// Like [`run`], with external commands going through `executor`.
pub fn run_with(
    source: &ConfigSource,
    overrides: &RunOverrides,
    log: &dyn Log,
    executor: &dyn Executor,
) -> ExitStatus {
    let version = option_env!("HOMEKEEPER_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    log.info(&format!("homekeeper {version}"));

    let plan = match prepare(source, overrides, log, executor) {
        Ok(plan) => plan,
        Err(e) => {
            log.error(&format!("{e:#}"));
            return ExitStatus::Fatal;
        }
    };
    execute(plan, log, executor)
}

fn prepare(
    source: &ConfigSource,
    overrides: &RunOverrides,
    log: &dyn Log,
    executor: &dyn Executor,
) -> Result<Plan> {
    log.stage("Loading configuration");
    let config = Config::load(source)?;
    let settings = MainSettings::from_options(config.require(MAIN_SECTION)?)?;
    let simulate = settings.simulate || overrides.simulate;
    let specs = registry();
    for name in config.section_names() {
        if name != MAIN_SECTION && !specs.iter().any(|s| s.section == name) {
            log.warn(&format!("ignoring unknown section [{name}]"));
        }
    }
    for name in overrides.only.iter().chain(&overrides.skip) {
        if !specs.iter().any(|s| s.section.eq_ignore_ascii_case(name)) {
            log.warn(&format!("no check is configured by section [{name}]"));
        }
    }

    log.stage("Loading accounts");
    let database = match &settings.account_files {
        Some(files) => {
            log.debug(&format!(
                "reading {} and {}",
                files.passwd.display(),
                files.group.display()
            ));
            AccountDatabase::load(&FileSource::new(&files.passwd, &files.group))?
        }
        None => {
            require_program(executor, "getent", MAIN_SECTION)?;
            AccountDatabase::load(&GetentSource::new(executor))?
        }
    };
    let limit_gid = settings
        .primary_group
        .as_deref()
        .map(|name| database.gid_of(name))
        .transpose()
        .context("resolving primary_group_name")?;
    let accounts = database.managed(limit_gid);
    log.info(&format!(
        "{} of {} accounts managed",
        accounts.len(),
        database.accounts().len()
    ));
    if accounts.len() < settings.minimum_accounts {
        return Err(PreconditionError::TooFewAccounts {
            found: accounts.len(),
            required: settings.minimum_accounts,
        }
        .into());
    }

    log.stage("Setting up checks");
    let root = ResourceRoot::new(settings.resource_root);
    let mut checks = Vec::with_capacity(specs.len());
    for spec in &specs {
        let check = if overrides.selects(spec.section) {
            spec.setup(&config, &root)?
        } else {
            None
        };
        if let Some(check) = &check {
            log.debug(&format!(
                "[{}] order {} {} correct={}",
                check.section(),
                check.order(),
                check.shape(),
                check.corrects()
            ));
        }
        checks.push((spec.section, check));
    }
    for check in checks.iter().filter_map(|(_, check)| check.as_ref()) {
        for program in check.required_programs(simulate) {
            require_program(executor, program, check.section())?;
        }
    }

    Ok(Plan {
        simulate,
        root,
        database,
        accounts,
        checks,
    })
}

fn require_program(
    executor: &dyn Executor,
    program: &'static str,
    section: &'static str,
) -> Result<(), PreconditionError> {
    if executor.which(program) {
        Ok(())
    } else {
        Err(PreconditionError::MissingProgram { program, section })
    }
}

fn execute(plan: Plan, log: &dyn Log, executor: &dyn Executor) -> ExitStatus {
    let Plan {
        simulate,
        root,
        database,
        accounts,
        checks,
    } = plan;
    if simulate {
        log.info("simulate mode: no changes will be made");
    }
    let effects = Effects::new(simulate, log, executor);
    let resolver = LddResolver::new(executor);
    let mut cache = DependencyCache::new();
    let mut total = CheckStats::new();
    let mut failed = 0usize;

    for (section, check) in checks {
        let Some(mut check) = check else {
            log.debug(&format!("skipping [{section}] (disabled)"));
            log.record_check(section, CheckStatus::Disabled, None);
            continue;
        };
        log.stage(section);
        let mut ctx = CheckContext {
            root: &root,
            accounts: &accounts,
            database: &database,
            effects,
            log,
            dependencies: &mut cache,
            resolver: &resolver,
        };
        match check.run(&mut ctx) {
            Ok(stats) => {
                total += stats;
                let summary = stats.summary(simulate);
                log.info(&summary);
                log.record_check(
                    section,
                    status_for(&stats, check.corrects(), simulate),
                    Some(&summary),
                );
            }
            Err(e) => {
                failed += 1;
                log.error(&format!("{section}: {e:#}"));
                log.record_check(section, CheckStatus::Failed, Some(&format!("{e:#}")));
            }
        }
    }

    log.debug(&format!(
        "{} binaries resolved; totals: {}",
        cache.len(),
        total.summary(simulate)
    ));
    if failed > 0 {
        log.error(&format!("{failed} check(s) failed"));
        ExitStatus::ChecksFailed
    } else {
        ExitStatus::Success
    }
}

/// Status recorded for a check that completed with `stats`.
#[must_use]
pub const fn status_for(stats: &CheckStats, corrects: bool, simulate: bool) -> CheckStatus {
    if stats.non_compliant == 0 {
        CheckStatus::Compliant
    } else if !corrects {
        CheckStatus::NonCompliant
    } else if simulate {
        CheckStatus::Simulated
    } else {
        CheckStatus::Corrected
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::exec::test_helpers::ScriptedExecutor;
    use crate::logging::MemoryLog;
    use std::path::{Path, PathBuf};

    const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
alice:x:1001:2000::/home/alice:/bin/sh
bob:x:1002:2000::/home/bob:/bin/sh
";
    const GROUP: &str = "root:x:0:\nsftponly:x:2000:\n";

    struct Site {
        tmp: tempfile::TempDir,
    }

    impl Site {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            std::fs::write(tmp.path().join("passwd"), PASSWD).unwrap();
            std::fs::write(tmp.path().join("group"), GROUP).unwrap();
            std::fs::create_dir(tmp.path().join("sftp")).unwrap();
            Self { tmp }
        }

        fn base(&self) -> PathBuf {
            self.tmp.path().join("sftp")
        }

        fn config(&self, minimum: usize, checks: &str) -> ConfigSource {
            self.config_for_group("sftponly", minimum, checks)
        }

        fn config_for_group(&self, group: &str, minimum: usize, checks: &str) -> ConfigSource {
            let dir = self.tmp.path().display();
            ConfigSource::Inline {
                name: "test".to_string(),
                content: format!(
                    "[main]\n\
                     resource_root = {dir}/sftp/$u\n\
                     simulate = no\n\
                     limit_to_primary_group = yes\n\
                     primary_group_name = {group}\n\
                     minimum_accounts = {minimum}\n\
                     passwd_file = {dir}/passwd\n\
                     group_file = {dir}/group\n\
                     {checks}"
                ),
            }
        }
    }

    fn run_site(source: &ConfigSource, overrides: &RunOverrides) -> (ExitStatus, MemoryLog) {
        let log = MemoryLog::new();
        let executor = ScriptedExecutor::default();
        let status = run_with(source, overrides, &log, &executor);
        assert!(executor.calls().is_empty());
        (status, log)
    }

    const EXISTENCE: &str = "[existence]\ncheck = yes\ncorrect = yes\n";

    #[test]
    fn creates_missing_directories_for_managed_accounts_only() {
        let site = Site::new();
        let (status, log) = run_site(&site.config(2, EXISTENCE), &RunOverrides::default());

        assert_eq!(status, ExitStatus::Success);
        assert!(site.base().join("alice").is_dir());
        assert!(site.base().join("bob").is_dir());
        assert!(!site.base().join("root").exists());
        assert_eq!(log.status_of("existence"), Some(CheckStatus::Corrected));
        assert_eq!(log.status_of("permissions"), Some(CheckStatus::Disabled));
    }

    #[test]
    fn second_run_is_compliant() {
        let site = Site::new();
        let source = site.config(2, EXISTENCE);
        run_site(&source, &RunOverrides::default());

        let (status, log) = run_site(&source, &RunOverrides::default());

        assert_eq!(status, ExitStatus::Success);
        assert_eq!(log.status_of("existence"), Some(CheckStatus::Compliant));
        assert!(log.lines_of("action").is_empty());
    }

    #[test]
    fn missing_program_names_the_section() {
        let err = require_program(&SystemExecutor, "homekeeper-no-such-tool", "binaries")
            .unwrap_err();
        assert!(matches!(
            err,
            PreconditionError::MissingProgram {
                program: "homekeeper-no-such-tool",
                section: "binaries"
            }
        ));
        assert!(require_program(&SystemExecutor, "sh", MAIN_SECTION).is_ok());
    }

    #[test]
    fn too_few_accounts_is_fatal() {
        let site = Site::new();
        let (status, log) = run_site(&site.config(3, EXISTENCE), &RunOverrides::default());

        assert_eq!(status, ExitStatus::Fatal);
        assert!(log.contains("too few accounts"));
        assert!(!site.base().join("alice").exists());
        assert!(log.check_entries().is_empty());
    }

    #[test]
    fn unknown_primary_group_is_fatal() {
        let site = Site::new();
        std::fs::create_dir(site.base().join("alice")).unwrap();
        let trash = site.tmp.path().join("trash");
        let checks = format!(
            "[obsoletes]\ncheck = yes\ncorrect = yes\n\
             trash_path = {}\ntrash_octal_permissions = 0600\n",
            trash.display()
        );
        let source = site.config_for_group("sftpnoly", 0, &checks);

        let (status, log) = run_site(&source, &RunOverrides::default());

        assert_eq!(status, ExitStatus::Fatal);
        assert!(log.contains("unknown group 'sftpnoly'"));
        assert!(site.base().join("alice").is_dir());
        assert!(!trash.exists());
        assert!(log.check_entries().is_empty());
    }

    #[test]
    fn setup_error_aborts_before_any_check() {
        let site = Site::new();
        let checks = format!("{EXISTENCE}[permissions]\ncheck = yes\ncorrect = yes\n");
        let (status, log) = run_site(&site.config(0, &checks), &RunOverrides::default());

        assert_eq!(status, ExitStatus::Fatal);
        assert!(log.contains("octal_permissions"));
        assert!(!site.base().join("alice").exists());
    }

    #[test]
    fn failing_check_does_not_stop_the_run() {
        let site = Site::new();
        let checks = format!("{EXISTENCE}[owner]\ncheck = yes\ncorrect = no\nowner = ghost\n");
        let (status, log) = run_site(&site.config(0, &checks), &RunOverrides::default());

        assert_eq!(status, ExitStatus::ChecksFailed);
        assert_eq!(log.status_of("existence"), Some(CheckStatus::Corrected));
        assert_eq!(log.status_of("owner"), Some(CheckStatus::Failed));
        assert!(log.contains("unknown user 'ghost'"));
    }

    #[test]
    fn simulate_override_changes_nothing() {
        let site = Site::new();
        let overrides = RunOverrides {
            simulate: true,
            ..RunOverrides::default()
        };
        let (status, log) = run_site(&site.config(0, EXISTENCE), &overrides);

        assert_eq!(status, ExitStatus::Success);
        assert_eq!(std::fs::read_dir(site.base()).unwrap().count(), 0);
        assert_eq!(log.lines_of("dry_run").len(), 2);
        assert_eq!(log.status_of("existence"), Some(CheckStatus::Simulated));
    }

    #[test]
    fn skip_disables_a_configured_check() {
        let site = Site::new();
        let overrides = RunOverrides {
            skip: vec!["existence".to_string()],
            ..RunOverrides::default()
        };
        let (_, log) = run_site(&site.config(0, EXISTENCE), &overrides);

        assert_eq!(log.status_of("existence"), Some(CheckStatus::Disabled));
        assert!(!site.base().join("alice").exists());
    }

    #[test]
    fn unknown_sections_warn() {
        let site = Site::new();
        let overrides = RunOverrides {
            only: vec!["nonsense".to_string()],
            ..RunOverrides::default()
        };
        let (status, log) = run_site(&site.config(0, "[typo]\ncheck = yes\n"), &overrides);

        assert_eq!(status, ExitStatus::Success);
        assert!(log.lines_of("warn").iter().any(|l| l.contains("[typo]")));
        assert!(log.lines_of("warn").iter().any(|l| l.contains("[nonsense]")));
    }

    #[test]
    fn missing_config_file_is_fatal() {
        let source = ConfigSource::File(Path::new("/nonexistent/homekeeper.conf").to_path_buf());
        let (status, _) = run_site(&source, &RunOverrides::default());
        assert_eq!(status, ExitStatus::Fatal);
    }

    #[test]
    fn overrides_selection() {
        let only = RunOverrides {
            only: vec!["Files".to_string()],
            ..RunOverrides::default()
        };
        assert!(only.selects("files"));
        assert!(!only.selects("binaries"));

        let skip = RunOverrides {
            skip: vec!["obsoletes".to_string()],
            ..RunOverrides::default()
        };
        assert!(skip.selects("files"));
        assert!(!skip.selects("obsoletes"));
    }

    #[test]
    fn status_mapping() {
        let clean = CheckStats::default();
        let dirty = CheckStats {
            compliant: 0,
            non_compliant: 1,
            corrected: 1,
        };
        assert_eq!(status_for(&clean, true, true), CheckStatus::Compliant);
        assert_eq!(status_for(&dirty, false, false), CheckStatus::NonCompliant);
        assert_eq!(status_for(&dirty, true, true), CheckStatus::Simulated);
        assert_eq!(status_for(&dirty, true, false), CheckStatus::Corrected);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Fatal.code(), 1);
        assert_eq!(ExitStatus::ChecksFailed.code(), 2);
    }
}
