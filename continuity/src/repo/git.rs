//! Version-control binding
//!
//! [`VersionControl`] is the seam the engine reads repository state
//! through. [`GitCli`] implements it by shelling out to `git` with a hard
//! timeout and a bounded output buffer; both limits surface as ordinary
//! errors that callers turn into sentinel values.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{ContinuityError, ContinuityResult};

/// Limits for one external command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_output_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Read-side version-control operations the engine depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Full revision id of `HEAD`.
    async fn head_revision(&self, root: &Path) -> ContinuityResult<String>;

    /// Paths with working-tree or index changes, relative to `root`.
    async fn changed_paths(&self, root: &Path) -> ContinuityResult<Vec<String>>;

    /// Name of the checked-out branch.
    async fn current_branch(&self, root: &Path) -> ContinuityResult<String>;

    /// Run an arbitrary subcommand and return its stdout.
    async fn raw_command(
        &self,
        root: &Path,
        args: &[String],
        limits: CommandLimits,
    ) -> ContinuityResult<String>;
}

/// Run a command with a timeout and an output cap.
///
/// The child is killed if the timeout elapses.
pub(crate) async fn run_bounded(
    program: &str,
    args: &[String],
    cwd: &Path,
    limits: CommandLimits,
) -> ContinuityResult<Vec<u8>> {
    let label = format!("{} {}", program, args.join(" "));
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(limits.timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(ContinuityError::vcs(label, format!("failed to execute: {e}"))),
        Err(_) => {
            return Err(ContinuityError::timeout(
                label,
                limits.timeout.as_millis() as u64,
            ))
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ContinuityError::vcs(label, stderr.trim().to_string()));
    }
    if output.stdout.len() > limits.max_output_bytes {
        return Err(ContinuityError::overflow(label, limits.max_output_bytes));
    }

    Ok(output.stdout)
}

/// Parse `git status --porcelain=v1 -z` output into paths.
///
/// Renames and copies contribute both the new and the original path.
pub fn parse_porcelain_z(stdout: &[u8]) -> Vec<String> {
    let mut files = Vec::new();
    let mut iter = stdout.split(|b| *b == b'\0').peekable();

    while let Some(entry) = iter.next() {
        if entry.is_empty() {
            continue;
        }

        let line = String::from_utf8_lossy(entry);
        // Porcelain v1: two-char status, space, then path
        if line.len() > 3 {
            let status = &line[..2];
            let path = &line[3..];
            if !path.is_empty() {
                files.push(path.to_string());
            }

            // In -z mode the rename source follows as a separate NUL entry
            if status.starts_with('R') || status.starts_with('C') {
                if let Some(source_bytes) = iter.next() {
                    if !source_bytes.is_empty() {
                        files.push(String::from_utf8_lossy(source_bytes).to_string());
                    }
                }
            }
        }
    }

    files
}

/// `git` command-line binding.
#[derive(Debug, Clone)]
pub struct GitCli {
    limits: CommandLimits,
}

impl GitCli {
    pub fn new(limits: CommandLimits) -> Self {
        Self { limits }
    }

    async fn run_git(&self, root: &Path, args: &[&str]) -> ContinuityResult<String> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let stdout = run_bounded("git", &args, root, self.limits).await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(CommandLimits::default())
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn head_revision(&self, root: &Path) -> ContinuityResult<String> {
        self.run_git(root, &["rev-parse", "HEAD"]).await
    }

    async fn changed_paths(&self, root: &Path) -> ContinuityResult<Vec<String>> {
        let args = ["status", "--porcelain=v1", "-z"].map(String::from);
        let stdout = run_bounded("git", &args, root, self.limits).await?;
        Ok(parse_porcelain_z(&stdout))
    }

    async fn current_branch(&self, root: &Path) -> ContinuityResult<String> {
        self.run_git(root, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
    }

    async fn raw_command(
        &self,
        root: &Path,
        args: &[String],
        limits: CommandLimits,
    ) -> ContinuityResult<String> {
        let stdout = run_bounded("git", args, root, limits).await?;
        Ok(String::from_utf8_lossy(&stdout).to_string())
    }
}
