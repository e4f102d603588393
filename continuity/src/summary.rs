//! Structural file summaries: line count, first line, declared symbols.
//!
//! Summaries are keyed by content hash, so an edited file gets a new key
//! and old entries are simply never read again.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use crate::cache::{CacheTier, TtlPolicy};
use crate::config::SummaryTuning;
use crate::store::{ContinuityStore, Table};
use crate::text::{first_non_blank_line, sha256_hex, truncate_chars};

/// Lines that export or declare a top-level symbol in common languages.
static SYMBOL_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+(?:default\s+)?(?:declare\s+)?(?:async\s+)?(?:abstract\s+)?(?:function|class|const|let|var|type|interface|enum|namespace)\b|pub(?:\([^)]*\))?\s+(?:async\s+)?(?:unsafe\s+)?(?:fn|struct|enum|trait|type|const|static|mod)\b|(?:async\s+)?def\s+\w|class\s+\w|func\s+\w|(?:async\s+)?function\s+\w|interface\s+\w|module\.exports\b)",
    )
    .expect("SYMBOL_LINE_RE regex should compile")
});

/// Cached per-file summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub summary: String,
}

/// Cache key for a file version.
pub fn summary_cache_key(root: &Path, relative_path: &str, content_hash: &str) -> String {
    sha256_hex(format!("{}:{}:{}", root.display(), relative_path, content_hash).as_bytes())
}

/// Build the textual summary of `content`.
pub fn summarize_content(relative_path: &str, content: &str, tuning: &SummaryTuning) -> String {
    let line_count = content.lines().count();
    let first = first_non_blank_line(content)
        .map(|l| truncate_chars(l, tuning.first_line_chars))
        .unwrap_or("");

    let symbols: Vec<&str> = content
        .lines()
        .filter(|l| SYMBOL_LINE_RE.is_match(l))
        .map(str::trim)
        .take(tuning.max_symbol_lines)
        .collect();
    let symbols = symbols.join("\n");
    let symbols = truncate_chars(&symbols, tuning.symbols_chars);

    let mut out = format!("file: {relative_path}\nlines: {line_count}\nfirst: {first}");
    if !symbols.is_empty() {
        out.push_str("\nsymbols:\n");
        out.push_str(symbols);
    }
    out
}

/// Reads, summarizes and caches repository files.
pub struct FileSummarizer {
    cache: CacheTier<FileSummary>,
    tuning: SummaryTuning,
}

impl FileSummarizer {
    pub fn new(store: Arc<dyn ContinuityStore>, tuning: SummaryTuning) -> Self {
        Self {
            cache: CacheTier::new("summary", Table::SummaryCache, TtlPolicy::Forever, store),
            tuning,
        }
    }

    /// Summary of `root/relative_path`, or `None` when the path is not a
    /// regular file, is too large, or cannot be read.
    pub async fn read_summary(&self, root: &Path, relative_path: &str) -> Option<String> {
        let full_path = root.join(relative_path);
        let meta = tokio::fs::metadata(&full_path).await.ok()?;
        if !meta.is_file() || meta.len() > self.tuning.max_file_bytes {
            debug!(path = relative_path, size = meta.len(), "skipping summary");
            return None;
        }

        let bytes = tokio::fs::read(&full_path).await.ok()?;
        let content_hash = sha256_hex(&bytes);
        let key = summary_cache_key(root, relative_path, &content_hash);

        if let Some((hit, _)) = self.cache.get(&key).await {
            return Some(hit.summary);
        }

        let content = String::from_utf8_lossy(&bytes);
        let summary = summarize_content(relative_path, &content, &self.tuning);
        self.cache
            .put(
                &key,
                FileSummary {
                    summary: summary.clone(),
                },
            )
            .await;
        Some(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::fs;

    const TS_SOURCE: &str = "\n\nimport { x } from './x'\n\nexport function toggleDarkMode() {}\nexport const THEME = 'dark'\nfunction helper() {}\nconst local = 1\n";

    #[test]
    fn test_summarize_content_collects_symbols() {
        let summary = summarize_content("src/theme.ts", TS_SOURCE, &SummaryTuning::default());
        assert!(summary.starts_with("file: src/theme.ts\nlines: 8\nfirst: import { x } from './x'"));
        assert!(summary.contains("export function toggleDarkMode() {}"));
        assert!(summary.contains("export const THEME = 'dark'"));
        assert!(summary.contains("function helper() {}"));
        assert!(!summary.contains("const local"));
    }

    #[test]
    fn test_summarize_rust_and_python() {
        let rust = "//! crate docs\npub struct Pack;\npub(crate) fn build() {}\nfn private() {}\n";
        let summary = summarize_content("lib.rs", rust, &SummaryTuning::default());
        assert!(summary.contains("pub struct Pack;"));
        assert!(summary.contains("pub(crate) fn build() {}"));
        assert!(!summary.contains("fn private"));

        let py = "class Governor:\n    def decide(self):\n        pass\n";
        let summary = summarize_content("gov.py", py, &SummaryTuning::default());
        assert!(summary.contains("class Governor:"));
        assert!(summary.contains("def decide(self):"));
    }

    #[test]
    fn test_summarize_caps_symbol_lines() {
        let source: String = (0..30).map(|i| format!("export const C{i} = {i}\n")).collect();
        let summary = summarize_content("c.ts", &source, &SummaryTuning::default());
        assert!(summary.contains("C11"));
        assert!(!summary.contains("C12 "));
    }

    #[test]
    fn test_summarize_empty_file() {
        let summary = summarize_content("empty.txt", "", &SummaryTuning::default());
        assert_eq!(summary, "file: empty.txt\nlines: 0\nfirst: ");
    }

    #[tokio::test]
    async fn test_read_summary_caches_by_content() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("theme.ts"), TS_SOURCE).unwrap();

        let store = Arc::new(InMemoryStore::new());
        let summarizer = FileSummarizer::new(store.clone(), SummaryTuning::default());

        let first = summarizer.read_summary(dir.path(), "theme.ts").await.unwrap();
        let second = summarizer.read_summary(dir.path(), "theme.ts").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.row_count(Table::SummaryCache), 1);

        fs::write(dir.path().join("theme.ts"), "export class Changed {}\n").unwrap();
        let third = summarizer.read_summary(dir.path(), "theme.ts").await.unwrap();
        assert!(third.contains("export class Changed"));
        assert_eq!(store.row_count(Table::SummaryCache), 2);
    }

    #[tokio::test]
    async fn test_read_summary_skips_dirs_missing_and_large() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("big.txt"), "x".repeat(200_000)).unwrap();

        let summarizer = FileSummarizer::new(Arc::new(InMemoryStore::new()), SummaryTuning::default());
        assert!(summarizer.read_summary(dir.path(), "src").await.is_none());
        assert!(summarizer.read_summary(dir.path(), "missing.rs").await.is_none());
        assert!(summarizer.read_summary(dir.path(), "big.txt").await.is_none());
    }
}
