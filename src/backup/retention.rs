use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithFunctionName;
use derive_more::Display;
use function_name::named;
use itertools::Itertools;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum PruneOutcome {
    #[display("removed")]
    Removed,
    #[display("would be removed")]
    WouldRemove,
    #[display("failed: {_0}")]
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrunedFile {
    pub path: PathBuf,
    pub outcome: PruneOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeafReport {
    pub dir: PathBuf,
    pub kept: Vec<PathBuf>,
    pub pruned: Vec<PrunedFile>,
    /// Set when the files of the leaf could not be listed; nothing was pruned there
    pub listing_error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub leaves: Vec<LeafReport>,
}

impl PruneReport {
    fn count(&self, f: impl Fn(&PruneOutcome) -> bool) -> usize {
        self.leaves
            .iter()
            .flat_map(|leaf| leaf.pruned.iter())
            .filter(|file| f(&file.outcome))
            .count()
    }

    pub fn removed_count(&self) -> usize {
        self.count(|o| *o == PruneOutcome::Removed)
    }

    pub fn would_remove_count(&self) -> usize {
        self.count(|o| *o == PruneOutcome::WouldRemove)
    }

    /// Files that could not be deleted plus leaves that could not be listed.
    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, PruneOutcome::Failed(_)))
            + self
                .leaves
                .iter()
                .filter(|leaf| leaf.listing_error.is_some())
                .count()
    }

    pub fn merge(&mut self, other: PruneReport) {
        self.leaves.extend(other.leaves);
    }
}

/// Every directory below (and including) `root` that has no subdirectory.
///
/// A missing `root` has no leaves. Entries that cannot be read are logged and skipped, an
/// unreadable directory is then seen as a leaf.
#[named]
pub fn leaf_dirs<P: AsRef<Path>>(root: P) -> Vec<PathBuf> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Vec::new();
    }

    let dirs = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|res| match res {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("{}", Error::from(e).with_fn_name(function_path!()));
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .map(walkdir::DirEntry::into_path)
        .collect_vec();

    let parents: HashSet<&Path> = dirs
        .iter()
        .filter(|dir| dir.as_path() != root)
        .filter_map(|dir| dir.parent())
        .collect();

    dirs.iter()
        .filter(|dir| !parents.contains(dir.as_path()))
        .cloned()
        .collect()
}

/// Splits `files` into the `keep_count` newest and the rest, both newest first.
pub fn select_for_removal(files: Vec<PathBuf>, keep_count: usize) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut keep = files
        .into_iter()
        .sorted_unstable_by(|a, b| b.file_name().cmp(&a.file_name()))
        .collect_vec();
    let remove = keep.split_off(keep_count.min(keep.len()));
    (keep, remove)
}

/// Prunes every leaf below `root` down to its `keep_count` newest files.
///
/// Newest first is descending file name order. A `keep_count` of 0 prunes nothing, with
/// `dry_run` the files are only reported. Filesystem errors never stop the pass: they are
/// recorded per file, or per leaf when a leaf cannot be listed.
pub fn prune<P: AsRef<Path>>(root: P, keep_count: usize, dry_run: bool) -> PruneReport {
    let root = root.as_ref();
    if keep_count == 0 {
        debug!("Keep count is 0, not pruning {:?}", root);
        return PruneReport::default();
    }

    let leaves = leaf_dirs(root)
        .into_iter()
        .map(|dir| match list_files(&dir) {
            Ok(files) => prune_leaf(dir, files, keep_count, dry_run),
            Err(e) => {
                error!("Skipping {:?}, listing files failed: {}", dir, e);
                LeafReport {
                    dir,
                    listing_error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        })
        .collect();
    PruneReport { leaves }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    fs::read_dir(dir)?
        .filter_ok(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map_ok(|entry| entry.path())
        .try_collect::<_, Vec<_>, _>()
        .map_err(Error::from)
}

fn prune_leaf(dir: PathBuf, files: Vec<PathBuf>, keep_count: usize, dry_run: bool) -> LeafReport {
    let (kept, remove) = select_for_removal(files, keep_count);
    if remove.is_empty() {
        info!("Nothing to prune in {:?} ({} files kept)", dir, kept.len());
    }

    let pruned = remove
        .into_iter()
        .map(|path| {
            let outcome = if dry_run {
                PruneOutcome::WouldRemove
            } else {
                match fs::remove_file(&path) {
                    Ok(()) => PruneOutcome::Removed,
                    Err(e) => PruneOutcome::Failed(e.to_string()),
                }
            };
            match &outcome {
                PruneOutcome::Failed(e) => error!("Failed to delete {:?}: {}", path, e),
                PruneOutcome::WouldRemove => info!("[dry run] {:?} would be removed", path),
                PruneOutcome::Removed => info!("Deleted {:?}", path),
            }
            PrunedFile { path, outcome }
        })
        .collect();

    LeafReport {
        dir,
        kept,
        pruned,
        listing_error: None,
    }
}
