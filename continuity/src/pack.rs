//! Context pack assembly
//!
//! A pack is three labeled sections followed by an end marker:
//!
//! ```text
//! [continuity:anchor]   project docs (AGENTS.md, CLAUDE.md, README.md)
//! [continuity:context]  summaries of changed + keyword-relevant files
//! [continuity:delta]    what changed since the conversation's last turn
//! [continuity:end]
//! ```
//!
//! The composite is clamped to the configured byte budget. Assembly is a
//! pure function of the prompt, repository state, previous changed-files
//! hash and file contents; caching of the finished pack lives in the
//! service, keyed by [`pack_cache_key`].

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::config::{PackBudget, SearchTuning};
use crate::repo::RepoState;
use crate::search::RelevanceSearch;
use crate::summary::FileSummarizer;
use crate::text::{clamp_to_budget, extract_keywords, truncate_bytes};

pub const ANCHOR_LABEL: &str = "[continuity:anchor]";
pub const CONTEXT_LABEL: &str = "[continuity:context]";
pub const DELTA_LABEL: &str = "[continuity:delta]";
pub const END_MARKER: &str = "[continuity:end]";

const NO_ANCHOR_PLACEHOLDER: &str = "(no project docs found)";
const NO_CONTEXT_PLACEHOLDER: &str = "(no relevant files resolved)";
const FILE_SEPARATOR: &str = "\n---\n";

/// Cached pack value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPack {
    pub pack: String,
}

/// Components of a pack cache key.
#[derive(Debug, Clone, Copy)]
pub struct PackKey<'a> {
    pub task_fingerprint: &'a str,
    pub changed_files_hash: &'a str,
    pub head_revision: &'a str,
    pub provider: &'a str,
    pub mode: &'a str,
    pub budget_bytes: usize,
}

/// `fingerprint:changedHash:head:provider:mode:budget`
pub fn pack_cache_key(key: PackKey<'_>) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}",
        key.task_fingerprint,
        key.changed_files_hash,
        key.head_revision,
        key.provider,
        key.mode,
        key.budget_bytes
    )
}

/// Delta section relative to the conversation's previous changed-files hash.
pub fn delta_section(state: &RepoState, previous_hash: Option<&str>) -> String {
    match previous_hash {
        None => format!("first run\n{}", file_list(&state.changed_files)),
        Some(prev) if prev == state.changed_files_hash => {
            "unchanged since last turn".to_string()
        }
        Some(_) => format!(
            "changed since last turn\n{}",
            file_list(&state.changed_files)
        ),
    }
}

fn file_list(files: &[String]) -> String {
    if files.is_empty() {
        return "changed files: (none)".to_string();
    }
    let mut out = String::from("changed files:");
    for f in files {
        out.push_str("\n- ");
        out.push_str(f);
    }
    out
}

/// Join sections with labels and clamp to `budget_bytes`.
pub fn compose(anchor: &str, context: &str, delta: &str, budget_bytes: usize) -> String {
    let composite = format!(
        "{ANCHOR_LABEL}\n{anchor}\n\n{CONTEXT_LABEL}\n{context}\n\n{DELTA_LABEL}\n{delta}\n{END_MARKER}"
    );
    clamp_to_budget(&composite, budget_bytes).to_string()
}

/// Builds packs from project docs, relevant-file summaries and the delta.
pub struct PackAssembler {
    search: RelevanceSearch,
    summarizer: FileSummarizer,
    budget: PackBudget,
    search_tuning: SearchTuning,
}

impl PackAssembler {
    pub fn new(
        search: RelevanceSearch,
        summarizer: FileSummarizer,
        budget: PackBudget,
        search_tuning: SearchTuning,
    ) -> Self {
        Self {
            search,
            summarizer,
            budget,
            search_tuning,
        }
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget.total_bytes
    }

    /// Assemble a clamped pack.
    pub async fn build(
        &self,
        root: &Path,
        prompt: &str,
        state: &RepoState,
        previous_hash: Option<&str>,
    ) -> String {
        let anchor = self.anchor_section(root).await;
        let context = self.context_section(root, prompt, state).await;
        let delta = delta_section(state, previous_hash);
        compose(&anchor, &context, &delta, self.budget.total_bytes)
    }

    /// Concatenated project docs, each clamped, or a placeholder.
    pub async fn anchor_section(&self, root: &Path) -> String {
        let mut parts = Vec::new();
        for name in &self.budget.anchor_files {
            let path = root.join(name);
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    let clamped = truncate_bytes(content.trim(), self.budget.anchor_file_bytes);
                    parts.push(format!("## {name}\n{clamped}"));
                }
                Err(_) => debug!(file = %name, "anchor doc absent"),
            }
        }
        if parts.is_empty() {
            NO_ANCHOR_PLACEHOLDER.to_string()
        } else {
            parts.join("\n\n")
        }
    }

    /// Files the context section should summarize: currently changed files
    /// first, then search hits, de-duplicated and capped.
    pub async fn context_files(&self, root: &Path, prompt: &str, state: &RepoState) -> Vec<String> {
        let keywords = extract_keywords(prompt, &self.search_tuning);
        let hits = self
            .search
            .search(root, &keywords, &state.head_revision)
            .await;

        let mut files: Vec<String> = Vec::new();
        let changed = state
            .changed_files
            .iter()
            .take(self.budget.max_changed_in_context);
        for file in changed.chain(hits.iter()) {
            if files.len() >= self.budget.max_context_files {
                break;
            }
            if !files.contains(file) {
                files.push(file.clone());
            }
        }
        files
    }

    async fn context_section(&self, root: &Path, prompt: &str, state: &RepoState) -> String {
        let files = self.context_files(root, prompt, state).await;
        let summaries: Vec<String> = join_all(
            files
                .iter()
                .map(|file| self.summarizer.read_summary(root, file)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        debug!(
            candidates = files.len(),
            summarized = summaries.len(),
            "context section assembled"
        );
        if summaries.is_empty() {
            NO_CONTEXT_PLACEHOLDER.to_string()
        } else {
            summaries.join(FILE_SEPARATOR)
        }
    }
}
