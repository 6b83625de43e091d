use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use tier_backup::backup::backup_config::AppConfig;
use tier_backup::backup::exec::ShellExecutor;
use tier_backup::backup::orchestrator::Orchestrator;
use tier_backup::backup::result_error::result::Result;
use tier_backup::backup::tier::{RetentionTier, Tier};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Dump MySQL databases into tier directories and delete the oldest dumps of the tier
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("tier").args(["hourly", "daily", "weekly", "monthly"])))]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,
    /// Hourly backup, keeping the N newest
    #[arg(long, value_name = "N")]
    hourly: Option<usize>,
    /// Daily backup, keeping the N newest
    #[arg(long, value_name = "N")]
    daily: Option<usize>,
    /// Weekly backup, keeping the N newest
    #[arg(long, value_name = "N")]
    weekly: Option<usize>,
    /// Monthly backup, keeping the N newest
    #[arg(long, value_name = "N")]
    monthly: Option<usize>,
    /// Only log what would be done
    #[arg(short, long)]
    dry: bool,
    /// Maintenance profile wrapping each dump
    #[arg(short, long)]
    profile: Option<String>,
    /// Databases to back up, nothing or `all` for every database
    databases: Vec<String>,
}

impl Args {
    fn retention(&self) -> RetentionTier {
        [
            (Tier::Hourly, self.hourly),
            (Tier::Daily, self.daily),
            (Tier::Weekly, self.weekly),
            (Tier::Monthly, self.monthly),
        ]
        .into_iter()
        .find_map(|(tier, keep)| keep.map(|keep| RetentionTier::new(tier, keep)))
        .unwrap_or_default()
    }
}

fn run(args: Args) -> Result<()> {
    let config = AppConfig::from_path(&args.config)?;
    if let Some(profile) = &args.profile {
        config.profile(profile)?;
    }
    if args.dry {
        warn!("DRY RUN: commands are only logged, nothing is created or deleted");
    }

    let executor = ShellExecutor::new(*config.command_timeout());
    let retention = args.retention();
    let report = Orchestrator::builder()
        .config(Arc::new(config))
        .executor(Arc::new(executor))
        .retention(retention)
        .dry_run(args.dry)
        .maybe_profile(args.profile)
        .databases(args.databases)
        .build()
        .run()?;

    info!(
        "Backed up {} databases, {} files pruned, {} would be pruned, {} failed to prune",
        report.artifacts.len(),
        report.prune.removed_count(),
        report.prune.would_remove_count(),
        report.prune.failed_count()
    );
    if report.prune.failed_count() > 0 {
        warn!("Some old backups could not be deleted");
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        error!("{e}");
        exit(1);
    }
}
