//! # tier_backup
//!
//! Tiered MySQL backups with maintenance hooks and per-tier retention.
//!
//! ## Features
//!
//! - **Tiers**: hourly, daily, weekly and monthly directories, each keeping its own newest N dumps
//! - **Selective dumps**: schema of every table, rows only of the tables a profile does not exclude
//! - **Maintenance hooks**: commands run before and after a dump, e.g. toggling a CMS maintenance mode
//! - **Execution environments**: commands run on the host or behind a prefix such as `docker exec`
//! - **Dry run**: every mutating command and deletion is only logged
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tier_backup::backup::backup_config::AppConfig;
//! use tier_backup::backup::exec::ShellExecutor;
//! use tier_backup::backup::orchestrator::Orchestrator;
//! use tier_backup::backup::tier::{RetentionTier, Tier};
//!
//! let config = AppConfig::from_path("config.yml")?;
//! let executor = ShellExecutor::new(*config.command_timeout());
//! let report = Orchestrator::builder()
//!     .config(Arc::new(config))
//!     .executor(Arc::new(executor))
//!     .retention(RetentionTier::new(Tier::Daily, 7))
//!     .build()
//!     .run()?;
//! println!("{} backups written", report.artifacts.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
