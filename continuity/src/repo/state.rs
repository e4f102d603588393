//! Repository state snapshots
//!
//! Cheap state (head + changed files) feeds every cache key; the diff size
//! is a separate, more expensive read used only by the governor. Neither is
//! cached here. Both never fail: a broken or missing repository yields a
//! sentinel value.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::git::{CommandLimits, VersionControl};
use crate::text::sha256_hex;

/// Head revision used when the directory is not a usable repository.
pub const NO_GIT_REVISION: &str = "no-git";

/// Changed-files hash used when nothing is changed.
pub const NO_CHANGES_HASH: &str = "no-changes";

/// Snapshot of the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    pub head_revision: String,
    /// Sorted, de-duplicated changed paths.
    pub changed_files: Vec<String>,
    pub changed_files_hash: String,
}

impl RepoState {
    /// State reported for directories without a readable repository.
    pub fn no_git() -> Self {
        Self {
            head_revision: NO_GIT_REVISION.to_string(),
            changed_files: Vec::new(),
            changed_files_hash: NO_CHANGES_HASH.to_string(),
        }
    }

    /// Build a state from raw changed paths, normalizing order.
    pub fn from_parts(head_revision: impl Into<String>, mut changed: Vec<String>) -> Self {
        changed.sort();
        changed.dedup();
        let changed_files_hash = hash_changed_files(&changed);
        Self {
            head_revision: head_revision.into(),
            changed_files: changed,
            changed_files_hash,
        }
    }

    pub fn is_no_git(&self) -> bool {
        self.head_revision == NO_GIT_REVISION
    }
}

/// Digest of a sorted changed-file list.
pub fn hash_changed_files(files: &[String]) -> String {
    if files.is_empty() {
        return NO_CHANGES_HASH.to_string();
    }
    sha256_hex(files.join("\n").as_bytes())
}

/// Working-tree diff size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    /// Added plus removed lines across all files.
    pub total_lines: u64,
}

/// Sum added+removed columns of `git diff --numstat` output.
///
/// Binary files report `-` and count as zero.
pub fn parse_numstat(stdout: &str) -> u64 {
    stdout
        .lines()
        .filter_map(|line| {
            let mut cols = line.split('\t');
            let added = cols.next()?.trim().parse::<u64>().unwrap_or(0);
            let removed = cols.next()?.trim().parse::<u64>().unwrap_or(0);
            Some(added + removed)
        })
        .sum()
}

/// Reads [`RepoState`] and [`DiffStats`] through a [`VersionControl`] binding.
pub struct RepoStateReader {
    vcs: Arc<dyn VersionControl>,
    limits: CommandLimits,
}

impl RepoStateReader {
    pub fn new(vcs: Arc<dyn VersionControl>, limits: CommandLimits) -> Self {
        Self { vcs, limits }
    }

    /// Current head and changed files. Never fails.
    pub async fn repo_state(&self, root: &Path) -> RepoState {
        let head = match self.vcs.head_revision(root).await {
            Ok(head) => head,
            Err(e) => {
                debug!(root = %root.display(), error = %e, "no readable repository");
                return RepoState::no_git();
            }
        };
        match self.vcs.changed_paths(root).await {
            Ok(changed) => RepoState::from_parts(head, changed),
            Err(e) => {
                debug!(root = %root.display(), error = %e, "git status failed");
                RepoState::no_git()
            }
        }
    }

    /// Added+removed lines across the working tree. Zero on any failure.
    pub async fn diff_stats(&self, root: &Path) -> DiffStats {
        let args = ["diff", "--numstat", "HEAD"].map(String::from);
        match self.vcs.raw_command(root, &args, self.limits).await {
            Ok(stdout) => DiffStats {
                total_lines: parse_numstat(&stdout),
            },
            Err(e) => {
                debug!(root = %root.display(), error = %e, "diff stats unavailable");
                DiffStats::default()
            }
        }
    }
}
