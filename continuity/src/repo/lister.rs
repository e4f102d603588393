//! Repository file listing
//!
//! Relevance search needs the full list of repository files. The default
//! [`RepoFileLister`] asks ripgrep (`rg --files`) first and falls back to an
//! in-process `.gitignore`-respecting walk when ripgrep is missing or fails.

use async_trait::async_trait;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use super::git::{run_bounded, CommandLimits};
use crate::error::{ContinuityError, ContinuityResult};

/// Lists repository files as `/`-separated paths relative to the root.
#[async_trait]
pub trait FileLister: Send + Sync {
    async fn list_files(&self, root: &Path, timeout: Duration) -> ContinuityResult<Vec<String>>;
}

/// Walks a directory, respecting .gitignore rules, using the `ignore` crate.
#[derive(Debug, Clone, Default)]
pub struct WalkLister;

impl WalkLister {
    fn walk(root: &Path) -> Vec<String> {
        let mut files = Vec::new();
        let walker = WalkBuilder::new(root)
            .hidden(true) // skip hidden dirs
            .git_ignore(true)
            .require_git(false)
            .build();

        for entry in walker.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Ok(relative) = path.strip_prefix(root) {
                files.push(to_slash(relative));
            }
        }

        files.sort();
        files
    }
}

#[async_trait]
impl FileLister for WalkLister {
    async fn list_files(&self, root: &Path, timeout: Duration) -> ContinuityResult<Vec<String>> {
        let owned: PathBuf = root.to_path_buf();
        let walk = tokio::task::spawn_blocking(move || Self::walk(&owned));
        match tokio::time::timeout(timeout, walk).await {
            Ok(Ok(files)) => Ok(files),
            Ok(Err(e)) => Err(ContinuityError::listing(root, e.to_string())),
            Err(_) => Err(ContinuityError::timeout(
                "walk",
                timeout.as_millis() as u64,
            )),
        }
    }
}

/// Ripgrep-first lister with a walk fallback.
///
/// The walk runs only when ripgrep is missing or exits with an error. A
/// ripgrep timeout is returned as-is so listing never exceeds its budget.
#[derive(Debug, Clone)]
pub struct RepoFileLister {
    program: &'static str,
    max_output_bytes: usize,
    fallback: WalkLister,
}

impl RepoFileLister {
    pub fn new(max_output_bytes: usize) -> Self {
        Self {
            program: "rg",
            max_output_bytes,
            fallback: WalkLister,
        }
    }

    #[cfg(test)]
    fn with_program(program: &'static str) -> Self {
        Self {
            program,
            ..Self::default()
        }
    }
}

/// Whether a ripgrep failure should be retried with the in-process walk.
fn falls_back_to_walk(error: &ContinuityError) -> bool {
    !matches!(error, ContinuityError::Timeout { .. })
}

impl Default for RepoFileLister {
    fn default() -> Self {
        Self::new(CommandLimits::default().max_output_bytes)
    }
}

#[async_trait]
impl FileLister for RepoFileLister {
    async fn list_files(&self, root: &Path, timeout: Duration) -> ContinuityResult<Vec<String>> {
        let limits = CommandLimits {
            timeout,
            max_output_bytes: self.max_output_bytes,
        };
        let args = vec!["--files".to_string()];
        match run_bounded(self.program, &args, root, limits).await {
            Ok(stdout) => Ok(String::from_utf8_lossy(&stdout)
                .lines()
                .map(|l| l.trim_start_matches("./").replace('\\', "/"))
                .filter(|l| !l.is_empty())
                .collect()),
            Err(e) if falls_back_to_walk(&e) => {
                debug!(error = %e, "rg --files unavailable, walking repository");
                self.fallback.list_files(root, timeout).await
            }
            Err(e) => Err(e),
        }
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_walk_lists_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("README.md"), "# hi").unwrap();

        let files = WalkLister
            .list_files(dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(files, vec!["README.md", "src/main.rs"]);
    }

    #[tokio::test]
    async fn test_walk_respects_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("target/out.bin"), "x").unwrap();
        fs::write(dir.path().join("lib.rs"), "x").unwrap();

        let files = WalkLister
            .list_files(dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(files, vec!["lib.rs"]);
    }

    #[test]
    fn test_timeout_does_not_fall_back() {
        assert!(!falls_back_to_walk(&ContinuityError::timeout("rg --files", 8000)));
        assert!(falls_back_to_walk(&ContinuityError::vcs("rg --files", "failed to execute")));
        assert!(falls_back_to_walk(&ContinuityError::overflow("rg --files", 1024)));
    }

    #[tokio::test]
    async fn test_missing_rg_falls_back_to_walk() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("theme.ts"), "x").unwrap();

        let files = RepoFileLister::with_program("continuity-no-such-binary")
            .list_files(dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(files, vec!["theme.ts"]);
    }

    #[tokio::test]
    async fn test_repo_lister_finds_files_with_or_without_rg() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("settings_panel.ts"), "x").unwrap();

        let files = RepoFileLister::default()
            .list_files(dir.path(), Duration::from_secs(8))
            .await
            .unwrap();
        assert_eq!(files, vec!["settings_panel.ts"]);
    }
}
