use crate::backup::backup_config::AppConfig;
use crate::backup::catalog;
use crate::backup::dump;
use crate::backup::exec::Executor;
use crate::backup::function_path;
use crate::backup::hooks::{run_hooks, HookPhase};
use crate::backup::path::resolve_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{chain_result, Result};
use crate::backup::result_error::WithDebugObjectAndFnName;
use crate::backup::retention::{self, PruneReport};
use crate::backup::tier::{RetentionTier, Tier};
use bon::Builder;
use chrono::Local;
use function_name::named;
use getset::Getters;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Builder, Getters)]
#[getset(get = "pub")]
pub struct Orchestrator {
    config: Arc<AppConfig>,
    executor: Arc<dyn Executor>,
    #[builder(default)]
    retention: RetentionTier,
    #[builder(default)]
    dry_run: bool,
    #[builder(into)]
    profile: Option<String>,
    /// Explicit databases; empty or `all` backs up every database on the server
    #[builder(default)]
    databases: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub databases: Vec<String>,
    pub artifacts: Vec<PathBuf>,
    pub prune: PruneReport,
}

impl Orchestrator {
    /// Backs up the databases one after another, then prunes their tier directories.
    ///
    /// The first failure aborts the run before pruning. Once the `before` hooks of a database
    /// succeeded its `after` hooks are attempted, also when the dump failed.
    pub fn run(&self) -> Result<RunReport> {
        if let Some(profile) = &self.profile {
            self.config.profile(profile)?;
        }

        let databases =
            match catalog::list_databases(self.executor.as_ref(), &self.config, &self.databases) {
                Err(Error::EmptyCatalog) => {
                    warn!("{}, nothing to do", Error::EmptyCatalog);
                    return Ok(RunReport::default());
                }
                res => res?,
            };

        let mut report = RunReport::default();
        for database in databases.iter() {
            let artifact = self.backup_database(database)?;
            report.artifacts.push(artifact);
        }

        let tier = self.retention.tier();
        if self.retention.prunes() {
            for database in databases.iter() {
                let dir = self
                    .config
                    .storage()
                    .root()
                    .join(database)
                    .join(tier.to_string());
                info!(
                    "Keeping the {} newest {} backups in {:?}",
                    self.retention.keep_count(),
                    tier,
                    dir
                );
                report
                    .prune
                    .merge(retention::prune(&dir, self.retention.keep_count(), self.dry_run));
            }
        } else if tier == Tier::Manual {
            info!("Manual backup, nothing will be deleted");
        } else {
            info!("Nothing will be deleted if \"--{} 0\" or unset", tier);
        }

        report.databases = databases;
        Ok(report)
    }

    #[named]
    fn backup_database(&self, database: &str) -> Result<PathBuf> {
        let executor = self.executor.as_ref();
        let config = self.config.as_ref();
        let profile = self.profile.as_deref();
        let tier = self.retention.tier();

        info!("Backing up database {:?} ({} tier)", database, tier);
        run_hooks(executor, config, profile, HookPhase::Before, self.dry_run)
            .with_debug_object_and_fn_name(database.to_string(), function_path!())?;

        let dumped = resolve_path(executor, config, database, tier, self.dry_run).and_then(
            |destination| {
                dump::dump(
                    executor,
                    config,
                    database,
                    &destination,
                    profile,
                    &Local::now(),
                    self.dry_run,
                )
            },
        );
        let after = run_hooks(executor, config, profile, HookPhase::After, self.dry_run);

        chain_result(dumped, after)
            .with_debug_object_and_fn_name(database.to_string(), function_path!())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::backup_config::tests::{config_with_root, sample_config};
    use crate::backup::exec::testing::FakeExecutor;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const TABLES: &str = "Tables_in_app\nusers\ncache_pages\n";

    fn orchestrator(
        config: AppConfig,
        executor: Arc<FakeExecutor>,
        retention: RetentionTier,
        profile: Option<&str>,
        databases: &[&str],
    ) -> Orchestrator {
        Orchestrator::builder()
            .config(Arc::new(config))
            .executor(executor)
            .retention(retention)
            .maybe_profile(profile.map(String::from))
            .databases(databases.iter().map(|d| d.to_string()).collect())
            .build()
    }

    fn seed(dir: &Path, count: u32) {
        fs::create_dir_all(dir).unwrap();
        for day in 1..=count {
            fs::write(dir.join(format!("app_202401{:02}000000.sql.gz", day)), b"x").unwrap();
        }
    }

    fn file_count(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_hooks_wrap_the_dump() {
        let executor = Arc::new(FakeExecutor::new().respond("SHOW TABLES", TABLES));
        let report = orchestrator(
            sample_config(),
            executor.clone(),
            RetentionTier::manual(),
            Some("drupal8"),
            &["app"],
        )
        .run()
        .unwrap();

        assert_eq!(report.databases, vec!["app"]);
        assert_eq!(report.artifacts.len(), 1);

        let maintenance_on = executor.position("maintenance_mode 1").unwrap();
        let mkdir = executor.position("mkdir -p").unwrap();
        let schema = executor.position("--no-data").unwrap();
        let gzip = executor.position("gzip").unwrap();
        let maintenance_off = executor.position("maintenance_mode 0").unwrap();
        assert!(maintenance_on < mkdir);
        assert!(mkdir < schema);
        assert!(schema < gzip);
        assert!(gzip < maintenance_off);
    }

    #[test]
    fn test_after_hooks_run_when_dump_fails() {
        let root = TempDir::new().unwrap();
        let tier_dir = root.path().join("app").join("daily");
        seed(&tier_dir, 5);

        let executor = Arc::new(
            FakeExecutor::new()
                .respond("SHOW TABLES", TABLES)
                .fail_on("mysqldump", 2),
        );
        let err = orchestrator(
            config_with_root(root.path()),
            executor.clone(),
            RetentionTier::new(Tier::Daily, 2),
            Some("drupal8"),
            &["app", "shop"],
        )
        .run()
        .unwrap_err();

        assert!(matches!(err.root(), Error::CommandFailure { status: Some(2), .. }));
        assert_eq!(executor.count("maintenance_mode 0"), 1);
        assert_eq!(executor.count("gzip"), 0);
        // The run stops at the first database and nothing gets pruned.
        assert_eq!(executor.count("`shop`"), 0);
        assert_eq!(file_count(&tier_dir), 5);
    }

    #[test]
    fn test_dump_and_after_hook_failures_are_both_reported() {
        let executor = Arc::new(
            FakeExecutor::new()
                .respond("SHOW TABLES", TABLES)
                .fail_on("mysqldump", 2)
                .fail_on("maintenance_mode 0", 1),
        );
        let err = orchestrator(
            sample_config(),
            executor.clone(),
            RetentionTier::manual(),
            Some("drupal8"),
            &["app"],
        )
        .run()
        .unwrap_err();

        match err.root() {
            Error::LotsOfError(errors) => assert_eq!(errors.len(), 2),
            e => panic!("Expected LotsOfError, got {e}"),
        }
        let message = err.to_string();
        assert!(message.contains("status 2"));
        assert!(message.contains("status 1"));
    }

    #[test]
    fn test_before_hook_failure_skips_dump_and_after_hooks() {
        let executor = Arc::new(FakeExecutor::new().fail_on("maintenance_mode 1", 1));
        let err = orchestrator(
            sample_config(),
            executor.clone(),
            RetentionTier::manual(),
            Some("drupal8"),
            &["app"],
        )
        .run()
        .unwrap_err();

        assert!(matches!(err.root(), Error::CommandFailure { .. }));
        assert_eq!(executor.count("mysqldump"), 0);
        assert_eq!(executor.count("maintenance_mode 0"), 0);
    }

    #[test]
    fn test_unknown_profile_fails_before_any_command() {
        let executor = Arc::new(FakeExecutor::new());
        let err = orchestrator(
            sample_config(),
            executor.clone(),
            RetentionTier::manual(),
            Some("wordpress"),
            &[],
        )
        .run()
        .unwrap_err();

        assert!(matches!(err, Error::UnknownProfile(_)));
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn test_empty_catalog_ends_without_work() {
        let executor = Arc::new(
            FakeExecutor::new().respond("SHOW DATABASES", "Database\ninformation_schema\nsys\n"),
        );
        let report = orchestrator(
            sample_config(),
            executor.clone(),
            RetentionTier::new(Tier::Hourly, 3),
            None,
            &["all"],
        )
        .run()
        .unwrap();

        assert_eq!(report, RunReport::default());
        assert_eq!(executor.calls().len(), 1);
    }

    #[test]
    fn test_every_database_is_dumped_then_pruned() {
        let root = TempDir::new().unwrap();
        let app = root.path().join("app").join("weekly");
        let shop = root.path().join("shop").join("weekly");
        let other_tier = root.path().join("app").join("daily");
        seed(&app, 6);
        seed(&shop, 2);
        seed(&other_tier, 6);

        let executor = Arc::new(
            FakeExecutor::new()
                .respond("SHOW DATABASES", "Database\napp\nshop\nmysql\n")
                .respond("SHOW TABLES", TABLES),
        );
        let report = orchestrator(
            config_with_root(root.path()),
            executor.clone(),
            RetentionTier::new(Tier::Weekly, 4),
            None,
            &[],
        )
        .run()
        .unwrap();

        assert_eq!(report.databases, vec!["app", "shop"]);
        assert_eq!(executor.count("gzip"), 2);
        assert_eq!(report.prune.removed_count(), 2);
        assert_eq!(file_count(&app), 4);
        assert_eq!(file_count(&shop), 2);
        assert_eq!(file_count(&other_tier), 6);
    }

    #[test]
    fn test_keep_count_zero_deletes_nothing() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("app").join("hourly");
        seed(&dir, 3);

        let executor = Arc::new(FakeExecutor::new().respond("SHOW TABLES", TABLES));
        let report = orchestrator(
            config_with_root(root.path()),
            executor,
            RetentionTier::new(Tier::Hourly, 0),
            None,
            &["app"],
        )
        .run()
        .unwrap();

        assert!(report.prune.leaves.is_empty());
        assert_eq!(file_count(&dir), 3);
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("app").join("monthly");
        seed(&dir, 3);

        let executor = Arc::new(FakeExecutor::new().respond("SHOW TABLES", TABLES));
        let report = Orchestrator::builder()
            .config(Arc::new(config_with_root(root.path())))
            .executor(executor.clone())
            .retention(RetentionTier::new(Tier::Monthly, 1))
            .dry_run(true)
            .databases(vec!["app".to_string()])
            .build()
            .run()
            .unwrap();

        assert_eq!(report.prune.would_remove_count(), 2);
        assert_eq!(file_count(&dir), 3);
        assert!(executor
            .calls()
            .iter()
            .filter(|c| !c.script.contains("SHOW TABLES"))
            .all(|c| c.dry_run));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_tier_dir_does_not_stop_pruning_of_other_databases() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let app = root.path().join("app").join("weekly");
        let shop = root.path().join("shop").join("weekly");
        seed(&app, 6);
        seed(&shop, 6);
        fs::set_permissions(&app, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&app).is_ok() {
            fs::set_permissions(&app, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let executor = Arc::new(FakeExecutor::new().respond("SHOW TABLES", TABLES));
        let result = orchestrator(
            config_with_root(root.path()),
            executor,
            RetentionTier::new(Tier::Weekly, 4),
            None,
            &["app", "shop"],
        )
        .run();
        fs::set_permissions(&app, fs::Permissions::from_mode(0o755)).unwrap();

        let report = result.unwrap();
        assert_eq!(report.prune.failed_count(), 1);
        assert_eq!(report.prune.removed_count(), 2);
        assert_eq!(file_count(&app), 6);
        assert_eq!(file_count(&shop), 4);
    }
}
