use crate::backup::backup_config::AppConfig;
use crate::backup::catalog;
use crate::backup::commands;
use crate::backup::exec::Executor;
use crate::backup::path::BackupPath;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::path::PathBuf;
use tracing::info;

/// Lexicographic order of this format is chronological order; retention relies on it.
pub static TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
pub static DUMP_FILE_EXT: &str = "sql";
pub static COMPRESSED_FILE_EXT: &str = "gz";

/// `<database>_<timestamp>`
pub fn artifact_stem<O: Display, T: TimeZone<Offset = O>>(database: &str, dt: &DateTime<T>) -> String {
    format!("{}_{}", database, dt.format(TIMESTAMP_FORMAT))
}

/// Dumps `database` into `destination` and returns the artifact path as this process sees it.
pub fn dump<O: Display, T: TimeZone<Offset = O>>(
    executor: &dyn Executor,
    config: &AppConfig,
    database: &str,
    destination: &BackupPath,
    profile_name: Option<&str>,
    dt: &DateTime<T>,
    dry_run: bool,
) -> Result<PathBuf> {
    let file_name = format!("{}.{}", artifact_stem(database, dt), DUMP_FILE_EXT);
    let dump_file = destination.environment_dir().join(&file_name);
    let compressed_name = format!("{}.{}", file_name, COMPRESSED_FILE_EXT);
    let compressed_file = destination.environment_dir().join(&compressed_name);

    let exclusion_patterns = config.excluded_table_patterns(profile_name)?;
    let included_tables =
        catalog::list_included_tables(executor, config, database, exclusion_patterns)?;

    let environment = config.database_environment()?;
    let db = config.database();

    info!("Dumping schema of {:?} to {:?}", database, dump_file);
    executor
        .run_checked(&environment, &commands::dump_schema(db, database, &dump_file), dry_run)
        .with_msg(format!("Schema dump of {database:?} failed"))?;

    if included_tables.is_empty() {
        info!("No table rows to dump for {:?}", database);
    } else {
        info!("Dumping rows of {} tables of {:?}", included_tables.len(), database);
        executor
            .run_checked(
                &environment,
                &commands::dump_data(db, database, &included_tables, &dump_file),
                dry_run,
            )
            .with_msg(format!("Data dump of {database:?} failed"))?;
    }

    executor
        .run_checked(&environment, &commands::compress(&dump_file), dry_run)
        .and_then(|_| {
            executor.run_checked(
                &environment,
                &commands::chmod(config.storage().artifact_mode(), &compressed_file, false),
                dry_run,
            )
        })
        .with_msg(format!("Compressing {dump_file:?} failed"))?;

    let artifact = destination.host_dir().join(compressed_name);
    info!("Created backup file: {:?}", artifact);
    Ok(artifact)
}
