//! Continuity configuration
//!
//! Every tunable the engine uses lives here and is injected into
//! [`ContinuityService`](crate::service::ContinuityService) at construction.
//! Nothing reads the environment behind the caller's back;
//! [`ContinuityConfig::from_env`] is an explicit opt-in.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `CONTINUITY_MODE` | `active` | `off`, `passive` or `active` |
//! | `CONTINUITY_SNAPSHOT_ENABLED` | `true` | Allow governor snapshots |
//! | `CONTINUITY_REHYDRATE_ENABLED` | `true` | Allow governor rehydrates |
//! | `CONTINUITY_BUDGET_BYTES` | `12000` | Total byte budget for one pack |
//!
//! The threshold constants below were tuned empirically. They are kept as
//! defaults rather than literals so they can be retuned per deployment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Master switch for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContinuityMode {
    /// No I/O, no injection, governor always returns ok.
    Off,
    /// Packs are built, cached and tracked but never injected; no artifacts
    /// and no rehydrate side effect.
    Passive,
    /// Full behavior.
    #[default]
    Active,
}

impl ContinuityMode {
    /// Parse a mode string, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "off" | "disabled" => Some(Self::Off),
            "passive" => Some(Self::Passive),
            "active" | "on" => Some(Self::Active),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Passive => "passive",
            Self::Active => "active",
        }
    }
}

impl std::fmt::Display for ContinuityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Governor interventions an operator may disable without touching scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub snapshot_enabled: bool,
    pub rehydrate_enabled: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            snapshot_enabled: true,
            rehydrate_enabled: true,
        }
    }
}

/// Byte budgets and fan-out limits for pack assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackBudget {
    /// Hard cap on the whole assembled pack.
    pub total_bytes: usize,
    /// Cap on each anchor document.
    pub anchor_file_bytes: usize,
    /// Project documents read into the anchor section, in order.
    pub anchor_files: Vec<String>,
    /// Files summarized into the context section.
    pub max_context_files: usize,
    /// Currently-changed files merged into the context section.
    pub max_changed_in_context: usize,
    /// Cap on each carried-forward artifact line during rehydrate.
    pub carried_line_bytes: usize,
    /// Cap on the latest user prompt embedded in the rehydrate message.
    pub rehydrate_prompt_bytes: usize,
}

impl Default for PackBudget {
    fn default() -> Self {
        Self {
            total_bytes: 12_000,
            anchor_file_bytes: 3_000,
            anchor_files: vec![
                "AGENTS.md".to_string(),
                "CLAUDE.md".to_string(),
                "README.md".to_string(),
            ],
            max_context_files: 8,
            max_changed_in_context: 4,
            carried_line_bytes: 180,
            rehydrate_prompt_bytes: 600,
        }
    }
}

/// Keyword extraction and relevance search tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTuning {
    pub max_keywords: usize,
    pub min_keyword_len: usize,
    pub max_results: usize,
    /// Search results older than this are treated as misses.
    #[serde(with = "duration_secs")]
    pub freshness: Duration,
    /// Points for a keyword anywhere in the lowercased path.
    pub path_score: u32,
    /// Extra points for a keyword in the lowercased basename.
    pub basename_score: u32,
    pub stopwords: Vec<String>,
}

const DEFAULT_STOPWORDS: &[&str] = &[
    "about", "after", "again", "also", "because", "been", "before", "being", "could", "does",
    "doing", "done", "each", "from", "have", "here", "into", "just", "like", "make", "more",
    "most", "much", "need", "only", "other", "over", "please", "same", "should", "some", "such",
    "than", "that", "their", "them", "then", "there", "these", "they", "this", "those", "very",
    "want", "what", "when", "where", "which", "while", "will", "with", "would", "your",
];

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            max_keywords: 6,
            min_keyword_len: 4,
            max_results: 24,
            freshness: Duration::from_secs(60),
            path_score: 3,
            basename_score: 4,
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Per-file summary limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryTuning {
    pub max_file_bytes: u64,
    pub first_line_chars: usize,
    pub max_symbol_lines: usize,
    pub symbols_chars: usize,
}

impl Default for SummaryTuning {
    fn default() -> Self {
        Self {
            max_file_bytes: 180_000,
            first_line_chars: 120,
            max_symbol_lines: 12,
            symbols_chars: 900,
        }
    }
}

/// A soft/hard threshold pair for one pressure signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalThreshold {
    pub soft: u64,
    pub hard: u64,
}

impl SignalThreshold {
    pub const fn new(soft: u64, hard: u64) -> Self {
        Self { soft, hard }
    }
}

/// Governor pressure thresholds and meaningful-event triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorThresholds {
    pub turns: SignalThreshold,
    pub injected_bytes: SignalThreshold,
    pub changed_files: SignalThreshold,
    pub diff_lines: SignalThreshold,
    /// Milliseconds since the last reset.
    pub elapsed_ms: SignalThreshold,
    /// Signals that must fire together before an action is taken.
    pub min_signals: usize,
    /// Devlog when the diff is at least this many lines.
    pub devlog_diff_lines: u64,
    /// Devlog when at least this many files changed.
    pub devlog_changed_files: u64,
    /// Path prefixes whose modification warrants an ADR.
    pub boundary_prefixes: Vec<String>,
}

impl Default for GovernorThresholds {
    fn default() -> Self {
        Self {
            turns: SignalThreshold::new(7, 12),
            injected_bytes: SignalThreshold::new(90_000, 150_000),
            changed_files: SignalThreshold::new(10, 18),
            diff_lines: SignalThreshold::new(160, 280),
            elapsed_ms: SignalThreshold::new(25 * 60 * 1000, 50 * 60 * 1000),
            min_signals: 2,
            devlog_diff_lines: 120,
            devlog_changed_files: 6,
            boundary_prefixes: vec![
                "src/main/lib/db/".to_string(),
                "src/main/lib/trpc/".to_string(),
                "src/preload/".to_string(),
                "migrations/".to_string(),
                "drizzle/".to_string(),
                "schema/".to_string(),
            ],
        }
    }
}

/// Artifact bookkeeping limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactTuning {
    /// Recent artifacts of the same type checked for a duplicate fingerprint.
    pub dedupe_window: usize,
    /// Recent artifacts carried forward into a rehydrate message.
    pub rehydrate_carry: usize,
}

impl Default for ArtifactTuning {
    fn default() -> Self {
        Self {
            dedupe_window: 12,
            rehydrate_carry: 6,
        }
    }
}

/// Limits applied to every external process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessLimits {
    #[serde(with = "duration_secs")]
    pub vcs_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub list_timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for ProcessLimits {
    fn default() -> Self {
        Self {
            vcs_timeout: Duration::from_secs(5),
            list_timeout: Duration::from_secs(8),
            max_output_bytes: 8 * 1024 * 1024,
        }
    }
}

/// Top-level continuity configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContinuityConfig {
    pub mode: ContinuityMode,
    pub capabilities: Capabilities,
    pub budget: PackBudget,
    pub search: SearchTuning,
    pub summary: SummaryTuning,
    pub thresholds: GovernorThresholds,
    pub artifacts: ArtifactTuning,
    pub process: ProcessLimits,
}

impl ContinuityConfig {
    /// Defaults with the given mode.
    pub fn with_mode(mode: ContinuityMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Read the `CONTINUITY_*` environment variables over the defaults.
    ///
    /// Unparseable values keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(mode) = std::env::var("CONTINUITY_MODE")
            .ok()
            .and_then(|v| ContinuityMode::parse(&v))
        {
            config.mode = mode;
        }
        if let Some(v) = parse_bool_env("CONTINUITY_SNAPSHOT_ENABLED") {
            config.capabilities.snapshot_enabled = v;
        }
        if let Some(v) = parse_bool_env("CONTINUITY_REHYDRATE_ENABLED") {
            config.capabilities.rehydrate_enabled = v;
        }
        if let Some(bytes) = std::env::var("CONTINUITY_BUDGET_BYTES")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
        {
            config.budget.total_bytes = bytes;
        }
        config
    }
}

/// Parse a boolean env var. `None` when unset or unrecognized.
fn parse_bool_env(var: &str) -> Option<bool> {
    std::env::var(var).ok().and_then(|v| parse_bool(&v))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
