//! Keyword relevance search over the repository file list.
//!
//! Scoring is purely path-based: a keyword found in the lowercased path is
//! worth `path_score`, and the same keyword in the basename adds
//! `basename_score` on top, so filename matches outrank directory matches.
//! Points accumulate across keywords.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{CacheTier, TtlPolicy};
use crate::config::SearchTuning;
use crate::error::try_persist;
use crate::repo::FileLister;
use crate::store::{ContinuityStore, Table};

/// Ranked search result as cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub files: Vec<String>,
}

/// Cache key for a search: `root:head:keyword-csv`, keywords sorted.
pub fn search_cache_key(root: &Path, head_revision: &str, keywords: &[String]) -> String {
    let mut sorted: Vec<&str> = keywords.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("{}:{}:{}", root.display(), head_revision, sorted.join(","))
}

/// Score and rank `files` against `keywords`, keeping the top `max_results`.
///
/// Ties keep listing order.
pub fn rank_files(files: &[String], keywords: &[String], tuning: &SearchTuning) -> Vec<String> {
    let mut scored: Vec<(u32, &String)> = files
        .iter()
        .filter_map(|file| {
            let lower = file.to_lowercase();
            let base = lower.rsplit('/').next().unwrap_or(lower.as_str());
            let score: u32 = keywords
                .iter()
                .filter(|k| lower.contains(k.as_str()))
                .map(|k| {
                    let mut points = tuning.path_score;
                    if base.contains(k.as_str()) {
                        points += tuning.basename_score;
                    }
                    points
                })
                .sum();
            (score > 0).then_some((score, file))
        })
        .collect();

    // Stable sort keeps listing order among equal scores.
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(tuning.max_results)
        .map(|(_, f)| f.clone())
        .collect()
}

/// Keyword search with a hot + durable cache in front of the file lister.
pub struct RelevanceSearch {
    lister: Arc<dyn FileLister>,
    cache: CacheTier<SearchResult>,
    tuning: SearchTuning,
    list_timeout: std::time::Duration,
}

impl RelevanceSearch {
    pub fn new(
        lister: Arc<dyn FileLister>,
        store: Arc<dyn ContinuityStore>,
        tuning: SearchTuning,
        list_timeout: std::time::Duration,
    ) -> Self {
        let cache = CacheTier::new(
            "search",
            Table::SearchCache,
            TtlPolicy::MaxAge(tuning.freshness),
            store,
        );
        Self {
            lister,
            cache,
            tuning,
            list_timeout,
        }
    }

    /// Ranked relevant files for `keywords` at `head_revision`.
    ///
    /// Empty keywords return immediately without listing the repository.
    /// A lister failure yields an empty (uncached) result.
    pub async fn search(
        &self,
        root: &Path,
        keywords: &[String],
        head_revision: &str,
    ) -> Vec<String> {
        if keywords.is_empty() {
            return Vec::new();
        }

        let key = search_cache_key(root, head_revision, keywords);
        if let Some((hit, source)) = self.cache.get(&key).await {
            debug!(?source, files = hit.files.len(), "search cache hit");
            return hit.files;
        }

        let Some(all_files) =
            try_persist("search.list_files", self.lister.list_files(root, self.list_timeout)).await
        else {
            return Vec::new();
        };

        let files = rank_files(&all_files, keywords, &self.tuning);
        debug!(
            candidates = all_files.len(),
            ranked = files.len(),
            "relevance search computed"
        );
        self.cache
            .put(&key, SearchResult { files: files.clone() })
            .await;
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ContinuityError, ContinuityResult};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedLister {
        files: Vec<String>,
        calls: AtomicUsize,
    }

    impl FixedLister {
        fn new(files: &[&str]) -> Self {
            Self {
                files: files.iter().map(|f| f.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FileLister for FixedLister {
        async fn list_files(&self, _root: &Path, _t: Duration) -> ContinuityResult<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.files.clone())
        }
    }

    struct FailingLister;

    #[async_trait]
    impl FileLister for FailingLister {
        async fn list_files(&self, root: &Path, _t: Duration) -> ContinuityResult<Vec<String>> {
            Err(ContinuityError::listing(root, "rg exploded"))
        }
    }

    fn kw(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_basename_outranks_path() {
        let files: Vec<String> = ["src/theme/index.ts", "src/components/theme_toggle.tsx", "docs/other.md"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let ranked = rank_files(&files, &kw(&["theme"]), &SearchTuning::default());
        assert_eq!(
            ranked,
            vec!["src/components/theme_toggle.tsx", "src/theme/index.ts"]
        );
    }

    #[test]
    fn test_scores_accumulate_across_keywords() {
        let files: Vec<String> = ["src/dark/mode.ts", "src/dark_mode_toggle.ts"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        // mode.ts: dark(3) + mode(3+4) = 10; dark_mode_toggle.ts: 7 + 7 + 7 = 21
        let ranked = rank_files(&files, &kw(&["dark", "mode", "toggle"]), &SearchTuning::default());
        assert_eq!(ranked[0], "src/dark_mode_toggle.ts");
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_rank_truncates_to_max_results() {
        let files: Vec<String> = (0..40).map(|i| format!("src/widget_{i}.rs")).collect();
        let ranked = rank_files(&files, &kw(&["widget"]), &SearchTuning::default());
        assert_eq!(ranked.len(), 24);
        assert_eq!(ranked[0], "src/widget_0.rs");
    }

    #[test]
    fn test_cache_key_ignores_keyword_order() {
        let root = Path::new("/repo");
        assert_eq!(
            search_cache_key(root, "abc", &kw(&["b", "a"])),
            search_cache_key(root, "abc", &kw(&["a", "b"]))
        );
        assert_ne!(
            search_cache_key(root, "abc", &kw(&["a"])),
            search_cache_key(root, "def", &kw(&["a"]))
        );
    }

    #[tokio::test]
    async fn test_empty_keywords_skip_listing() {
        let lister = Arc::new(FixedLister::new(&["a.rs"]));
        let search = RelevanceSearch::new(
            lister.clone(),
            Arc::new(InMemoryStore::new()),
            SearchTuning::default(),
            Duration::from_secs(8),
        );
        assert!(search.search(Path::new("/repo"), &[], "abc").await.is_empty());
        assert_eq!(lister.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_search_is_served_from_cache() {
        let lister = Arc::new(FixedLister::new(&["src/settings.ts", "src/other.ts"]));
        let search = RelevanceSearch::new(
            lister.clone(),
            Arc::new(InMemoryStore::new()),
            SearchTuning::default(),
            Duration::from_secs(8),
        );
        let root = Path::new("/repo");
        let first = search.search(root, &kw(&["settings"]), "abc").await;
        let second = search.search(root, &kw(&["settings"]), "abc").await;
        assert_eq!(first, vec!["src/settings.ts"]);
        assert_eq!(first, second);
        assert_eq!(lister.calls.load(Ordering::SeqCst), 1);

        // New head revision is a new key.
        search.search(root, &kw(&["settings"]), "def").await;
        assert_eq!(lister.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lister_failure_yields_empty() {
        let search = RelevanceSearch::new(
            Arc::new(FailingLister),
            Arc::new(InMemoryStore::new()),
            SearchTuning::default(),
            Duration::from_secs(8),
        );
        assert!(search
            .search(Path::new("/repo"), &kw(&["settings"]), "abc")
            .await
            .is_empty());
    }
}
