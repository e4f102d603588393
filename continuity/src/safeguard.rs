//! Auto-commit safeguard
//!
//! Automatic continuity commits may only ever land on the configured
//! memory branch. Anything else, including an unreadable branch, is
//! disallowed.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::repo::VersionControl;

/// Branch name reported when the current branch cannot be read.
pub const UNKNOWN_BRANCH: &str = "unknown";

/// Where artifacts go once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactPolicy {
    /// Artifacts are stored; committing them is left to the user.
    #[default]
    AutoWriteManualCommit,
    /// Artifacts may be committed automatically to the memory branch.
    AutoWriteMemoryBranch,
}

/// Global safeguard settings, created with defaults on first read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeguardSettings {
    pub artifact_policy: ArtifactPolicy,
    pub auto_commit_to_memory_branch: bool,
    pub memory_branch: String,
}

impl Default for SafeguardSettings {
    fn default() -> Self {
        Self {
            artifact_policy: ArtifactPolicy::AutoWriteManualCommit,
            auto_commit_to_memory_branch: false,
            memory_branch: "continuity/memory".to_string(),
        }
    }
}

impl SafeguardSettings {
    /// Policy and toggle both ask for automatic commits.
    pub fn auto_commit_requested(&self) -> bool {
        self.artifact_policy == ArtifactPolicy::AutoWriteMemoryBranch
            && self.auto_commit_to_memory_branch
    }
}

/// Outcome of the auto-commit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeguardAssessment {
    pub requested: bool,
    pub allowed: bool,
    pub current_branch: String,
}

/// Pure decision given an already-resolved branch name.
pub fn evaluate_policy(settings: &SafeguardSettings, current_branch: &str) -> SafeguardAssessment {
    let requested = settings.auto_commit_requested();
    let allowed = requested
        && current_branch != UNKNOWN_BRANCH
        && !settings.memory_branch.is_empty()
        && current_branch == settings.memory_branch;
    SafeguardAssessment {
        requested,
        allowed,
        current_branch: current_branch.to_string(),
    }
}

/// Read the current branch and evaluate the policy.
pub async fn assess_auto_commit_policy(
    vcs: &dyn VersionControl,
    root: &Path,
    settings: &SafeguardSettings,
) -> SafeguardAssessment {
    let branch = match vcs.current_branch(root).await {
        Ok(branch) if !branch.trim().is_empty() => branch.trim().to_string(),
        Ok(_) => UNKNOWN_BRANCH.to_string(),
        Err(e) => {
            debug!(root = %root.display(), error = %e, "branch detection failed");
            UNKNOWN_BRANCH.to_string()
        }
    };
    evaluate_policy(settings, &branch)
}
