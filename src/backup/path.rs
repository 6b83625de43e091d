use crate::backup::backup_config::AppConfig;
use crate::backup::commands;
use crate::backup::exec::Executor;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::tier::Tier;
use crate::backup::validate::validate_path_component;
use getset::Getters;
use std::path::{Path, PathBuf};

/// `<root>/<database>/<tier>`, once as this process sees it and once as the database
/// environment sees it.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct BackupPath {
    host_dir: PathBuf,
    environment_dir: PathBuf,
}

impl BackupPath {
    pub fn new(config: &AppConfig, database: &str, tier: Tier) -> Result<Self> {
        validate_path_component(database).map_err(|_| Error::InvalidName(database.to_string()))?;
        let relative = Path::new(database).join(tier.to_string());
        Ok(Self {
            host_dir: config.storage().root().join(&relative),
            environment_dir: config
                .storage()
                .effective_environment_root()
                .join(&relative),
        })
    }
}

/// Creates the tier directory inside the database environment and opens the database
/// directory to the identity the dump runs as.
pub fn resolve_path(
    executor: &dyn Executor,
    config: &AppConfig,
    database: &str,
    tier: Tier,
    dry_run: bool,
) -> Result<BackupPath> {
    let path = BackupPath::new(config, database, tier)?;
    let environment = config.database_environment()?;
    let database_dir = path
        .environment_dir
        .parent()
        .unwrap_or(&path.environment_dir)
        .to_path_buf();

    executor
        .run_checked(&environment, &commands::mkdir_all(&path.environment_dir), dry_run)
        .and_then(|_| {
            executor.run_checked(
                &environment,
                &commands::chmod(config.storage().directory_mode(), &database_dir, true),
                dry_run,
            )
        })
        .with_msg(format!(
            "Preparing backup directory {:?} failed",
            path.environment_dir
        ))?;
    Ok(path)
}
