use crate::backup::backup_config::AppConfig;
use crate::backup::commands;
use crate::backup::exec::{Executor, ShellCommand};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use itertools::Itertools;
use tracing::{debug, info};

/// Sentinel meaning every database on the server
pub static ALL_DATABASES: &str = "all";

/// Resolves the databases of this run.
///
/// An empty `explicit` list, or just `all`, asks the server and drops the excluded schemas;
/// anything else is returned unchanged without checking that the databases exist.
pub fn list_databases<S: AsRef<str>>(
    executor: &dyn Executor,
    config: &AppConfig,
    explicit: &[S],
) -> Result<Vec<String>> {
    let asks_for_all = explicit.is_empty()
        || (explicit.len() == 1 && explicit[0].as_ref() == ALL_DATABASES);
    if !asks_for_all {
        return Ok(explicit.iter().map(|s| s.as_ref().to_string()).collect());
    }

    let excluded = config.database().excluded_databases();
    let databases = run_name_query(executor, config, &commands::show_databases(config.database()))
        .with_msg("Listing databases failed")?
        .into_iter()
        .filter(|db| !excluded.contains(db))
        .collect_vec();

    if databases.is_empty() {
        return Err(Error::EmptyCatalog);
    }
    info!("Found {} databases: {:?}", databases.len(), databases);
    Ok(databases)
}

/// Tables of `database` whose rows are dumped: all of them minus those matching a pattern.
pub fn list_included_tables<S: AsRef<str>>(
    executor: &dyn Executor,
    config: &AppConfig,
    database: &str,
    exclusion_patterns: &[S],
) -> Result<Vec<String>> {
    let tables = run_name_query(
        executor,
        config,
        &commands::show_tables(config.database(), database),
    )
    .with_msg(format!("Listing tables of {database:?} failed"))?;

    let (included, excluded): (Vec<_>, Vec<_>) = tables
        .into_iter()
        .partition(|table| !is_excluded(table, exclusion_patterns));
    if !excluded.is_empty() {
        info!("Rows of {} tables in {:?} are skipped: {:?}", excluded.len(), database, excluded);
    }
    Ok(included)
}

/// Substring match, so `cache_` also excludes `mycache_report`.
pub fn is_excluded<S: AsRef<str>>(table: &str, exclusion_patterns: &[S]) -> bool {
    exclusion_patterns
        .iter()
        .any(|pattern| table.contains(pattern.as_ref()))
}

// Read-only, so it runs for real in dry mode too.
fn run_name_query(
    executor: &dyn Executor,
    config: &AppConfig,
    command: &ShellCommand,
) -> Result<Vec<String>> {
    let output = executor.run_checked(&config.database_environment()?, command, false)?;
    let names = parse_name_list(&output.stdout_string()?);
    debug!("Query returned {} names", names.len());
    Ok(names)
}

/// Client output is one name per line below a one-line header.
fn parse_name_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
