//! Governor: deterministic pressure scoring for continuity interventions
//!
//! Consumes per-turn pressure signals and produces a [`GovernorDecision`]:
//! `ok`, `snapshot` (compaction) or `rehydrate` (full context rebuild).
//! Independently detects meaningful events that warrant durable artifacts.
//! Everything here is pure; the service owns I/O and state transitions.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::artifacts::ArtifactKind;
use crate::config::{Capabilities, GovernorThresholds, SignalThreshold};
use crate::text::{sha256_hex, truncate_chars};

/// Phrases signalling that an approach was abandoned or replaced.
static PIVOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(instead|alternatively|alternative approach|different approach|another approach|rather than|switch(?:ing|ed)? to|won't work|doesn't work|didn't work|did not work|does not work|abandon(?:ing|ed)?|revert(?:ing|ed)?|roll(?:ing|ed)? back|pivot(?:ing|ed)?)\b",
    )
    .expect("PIVOT_RE regex should compile")
});

/// Response characters folded into the event fingerprint.
const FINGERPRINT_RESPONSE_CHARS: usize = 160;

/// Changed paths listed in artifact bodies.
const ARTIFACT_FILE_LIMIT: usize = 12;

/// Governor action, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GovernorAction {
    Ok,
    Snapshot,
    Rehydrate,
}

impl GovernorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Snapshot => "snapshot",
            Self::Rehydrate => "rehydrate",
        }
    }

    /// Whether this action resets the conversation's counters.
    pub fn is_intervention(&self) -> bool {
        !matches!(self, Self::Ok)
    }
}

impl std::fmt::Display for GovernorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Measured pressure for one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PressureSignals {
    pub turns: u64,
    pub injected_bytes: u64,
    pub changed_files: u64,
    pub diff_lines: u64,
    pub elapsed_ms: u64,
}

/// Soft and hard signal labels that fired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PressureAssessment {
    pub soft: Vec<String>,
    pub hard: Vec<String>,
}

/// Action plus the labels that justified it. `reasons` is empty for `ok`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorDecision {
    pub action: GovernorAction,
    pub reasons: Vec<String>,
}

impl GovernorDecision {
    pub fn ok() -> Self {
        Self {
            action: GovernorAction::Ok,
            reasons: Vec::new(),
        }
    }
}

/// Check every signal against its soft and hard threshold.
pub fn assess_pressure(signals: &PressureSignals, thresholds: &GovernorThresholds) -> PressureAssessment {
    let checks: [(&str, u64, SignalThreshold); 5] = [
        ("turn-pressure", signals.turns, thresholds.turns),
        ("context-pressure", signals.injected_bytes, thresholds.injected_bytes),
        ("file-churn", signals.changed_files, thresholds.changed_files),
        ("diff-pressure", signals.diff_lines, thresholds.diff_lines),
        ("time-pressure", signals.elapsed_ms, thresholds.elapsed_ms),
    ];

    let mut assessment = PressureAssessment::default();
    for (label, value, threshold) in checks {
        if value >= threshold.soft {
            assessment.soft.push(label.to_string());
        }
        if value >= threshold.hard {
            assessment.hard.push(format!("{label}-high"));
        }
    }
    assessment
}

/// Score pressure and apply capability gating.
///
/// Two or more hard signals ask for a rehydrate, two or more soft signals
/// for a snapshot. A disabled capability downgrades the action one step at
/// a time; a downgraded rehydrate reports the soft reasons.
pub fn decide(
    signals: &PressureSignals,
    thresholds: &GovernorThresholds,
    capabilities: &Capabilities,
) -> GovernorDecision {
    let assessment = assess_pressure(signals, thresholds);
    let min = thresholds.min_signals.max(1);

    if assessment.hard.len() >= min && capabilities.rehydrate_enabled {
        return GovernorDecision {
            action: GovernorAction::Rehydrate,
            reasons: assessment.hard,
        };
    }
    // Hard signals always imply soft ones, so a gated rehydrate falls here.
    if assessment.soft.len() >= min && capabilities.snapshot_enabled {
        return GovernorDecision {
            action: GovernorAction::Snapshot,
            reasons: assessment.soft,
        };
    }
    GovernorDecision::ok()
}

/// Meaningful events detected for one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeaningfulEvents {
    pub devlog: bool,
    pub adr: bool,
    pub rejected_approach: bool,
}

impl MeaningfulEvents {
    pub fn any(&self) -> bool {
        self.devlog || self.adr || self.rejected_approach
    }

    /// Artifact kinds to write, in a fixed order.
    pub fn kinds(&self) -> Vec<ArtifactKind> {
        let mut kinds = Vec::new();
        if self.devlog {
            kinds.push(ArtifactKind::Devlog);
        }
        if self.adr {
            kinds.push(ArtifactKind::Adr);
        }
        if self.rejected_approach {
            kinds.push(ArtifactKind::RejectedApproach);
        }
        kinds
    }
}

/// What a turn did, as seen by event detection.
#[derive(Debug, Clone, Copy)]
pub struct TurnFacts<'a> {
    pub head_revision: &'a str,
    pub changed_files_hash: &'a str,
    pub changed_files: &'a [String],
    pub diff_lines: u64,
    pub was_error: bool,
    pub response_text: &'a str,
}

/// Changed paths under a boundary-sensitive prefix.
pub fn boundary_paths<'a>(changed: &'a [String], prefixes: &[String]) -> Vec<&'a str> {
    changed
        .iter()
        .filter(|f| prefixes.iter().any(|p| f.starts_with(p.as_str())))
        .map(String::as_str)
        .collect()
}

/// Whether the response talks about dropping or replacing an approach.
pub fn mentions_pivot(response_text: &str) -> bool {
    PIVOT_RE.is_match(response_text)
}

pub fn detect_events(facts: &TurnFacts<'_>, thresholds: &GovernorThresholds) -> MeaningfulEvents {
    let boundary_touched = !boundary_paths(facts.changed_files, &thresholds.boundary_prefixes).is_empty();
    let large = facts.diff_lines >= thresholds.devlog_diff_lines
        || facts.changed_files.len() as u64 >= thresholds.devlog_changed_files;

    MeaningfulEvents {
        devlog: large || boundary_touched || facts.was_error,
        adr: boundary_touched,
        rejected_approach: facts.was_error || mentions_pivot(facts.response_text),
    }
}

/// Idempotency fingerprint for the turn's artifacts.
pub fn event_fingerprint(facts: &TurnFacts<'_>) -> String {
    let lowered = facts.response_text.to_lowercase();
    let response = truncate_chars(&lowered, FINGERPRINT_RESPONSE_CHARS);
    sha256_hex(
        format!(
            "{}:{}:{}:{}:{}",
            facts.head_revision,
            facts.changed_files_hash,
            facts.diff_lines,
            facts.was_error,
            response
        )
        .as_bytes(),
    )
}

/// Draft body for an artifact. The first line is a self-contained summary,
/// which is what a rehydrate carries forward.
pub fn artifact_content(
    kind: ArtifactKind,
    facts: &TurnFacts<'_>,
    thresholds: &GovernorThresholds,
) -> String {
    let headline = match kind {
        ArtifactKind::Devlog => format!(
            "devlog: {} changed files, {} diff lines{}",
            facts.changed_files.len(),
            facts.diff_lines,
            if facts.was_error { ", run errored" } else { "" }
        ),
        ArtifactKind::Adr => {
            let touched = boundary_paths(facts.changed_files, &thresholds.boundary_prefixes);
            format!("adr: boundary-sensitive change in {}", touched.join(", "))
        }
        ArtifactKind::RejectedApproach => {
            if facts.was_error {
                "rejected-approach: run ended in error".to_string()
            } else {
                "rejected-approach: response pivoted away from the previous approach".to_string()
            }
        }
    };

    let mut body = headline;
    body.push_str(&format!("\nhead: {}", facts.head_revision));
    if !facts.changed_files.is_empty() {
        body.push_str("\nfiles:");
        for f in facts.changed_files.iter().take(ARTIFACT_FILE_LIMIT) {
            body.push_str("\n- ");
            body.push_str(f);
        }
        let hidden = facts.changed_files.len().saturating_sub(ARTIFACT_FILE_LIMIT);
        if hidden > 0 {
            body.push_str(&format!("\n- ... {hidden} more"));
        }
    }
    let excerpt = truncate_chars(facts.response_text.trim(), FINGERPRINT_RESPONSE_CHARS);
    if !excerpt.is_empty() {
        body.push_str("\nresponse: ");
        body.push_str(excerpt);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> GovernorThresholds {
        GovernorThresholds::default()
    }

    fn all_enabled() -> Capabilities {
        Capabilities::default()
    }

    fn facts<'a>(changed: &'a [String], diff_lines: u64, was_error: bool, response: &'a str) -> TurnFacts<'a> {
        TurnFacts {
            head_revision: "abc123",
            changed_files_hash: "hash",
            changed_files: changed,
            diff_lines,
            was_error,
            response_text: response,
        }
    }

    #[test]
    fn test_quiet_turn_is_ok() {
        let d = decide(&PressureSignals::default(), &thresholds(), &all_enabled());
        assert_eq!(d, GovernorDecision::ok());
    }

    #[test]
    fn test_single_soft_signal_is_ok() {
        let signals = PressureSignals {
            turns: 11,
            ..Default::default()
        };
        assert_eq!(decide(&signals, &thresholds(), &all_enabled()).action, GovernorAction::Ok);
    }

    #[test]
    fn test_two_soft_signals_snapshot() {
        let signals = PressureSignals {
            turns: 7,
            changed_files: 10,
            ..Default::default()
        };
        let d = decide(&signals, &thresholds(), &all_enabled());
        assert_eq!(d.action, GovernorAction::Snapshot);
        assert_eq!(d.reasons, vec!["turn-pressure", "file-churn"]);
    }

    #[test]
    fn test_two_hard_signals_rehydrate() {
        let signals = PressureSignals {
            turns: 13,
            injected_bytes: 150_001,
            ..Default::default()
        };
        let d = decide(&signals, &thresholds(), &all_enabled());
        assert_eq!(d.action, GovernorAction::Rehydrate);
        assert_eq!(d.reasons, vec!["turn-pressure-high", "context-pressure-high"]);
    }

    #[test]
    fn test_one_hard_plus_one_soft_is_snapshot() {
        let signals = PressureSignals {
            turns: 12,
            diff_lines: 160,
            ..Default::default()
        };
        let d = decide(&signals, &thresholds(), &all_enabled());
        assert_eq!(d.action, GovernorAction::Snapshot);
        assert_eq!(d.reasons, vec!["turn-pressure", "diff-pressure"]);
    }

    #[test]
    fn test_time_pressure_labels() {
        let signals = PressureSignals {
            elapsed_ms: 50 * 60 * 1000,
            injected_bytes: 200_000,
            ..Default::default()
        };
        let d = decide(&signals, &thresholds(), &all_enabled());
        assert_eq!(d.reasons, vec!["context-pressure-high", "time-pressure-high"]);
    }

    #[test]
    fn test_rehydrate_disabled_downgrades_to_snapshot() {
        let caps = Capabilities {
            snapshot_enabled: true,
            rehydrate_enabled: false,
        };
        let signals = PressureSignals {
            turns: 13,
            injected_bytes: 160_000,
            ..Default::default()
        };
        let d = decide(&signals, &thresholds(), &caps);
        assert_eq!(d.action, GovernorAction::Snapshot);
        assert_eq!(d.reasons, vec!["turn-pressure", "context-pressure"]);
    }

    #[test]
    fn test_all_disabled_downgrades_to_ok() {
        let caps = Capabilities {
            snapshot_enabled: false,
            rehydrate_enabled: false,
        };
        let signals = PressureSignals {
            turns: 13,
            injected_bytes: 160_000,
            ..Default::default()
        };
        assert_eq!(decide(&signals, &thresholds(), &caps), GovernorDecision::ok());
    }

    #[test]
    fn test_snapshot_disabled_keeps_rehydrate() {
        let caps = Capabilities {
            snapshot_enabled: false,
            rehydrate_enabled: true,
        };
        let hard = PressureSignals {
            turns: 13,
            injected_bytes: 160_000,
            ..Default::default()
        };
        assert_eq!(decide(&hard, &thresholds(), &caps).action, GovernorAction::Rehydrate);

        let soft = PressureSignals {
            turns: 8,
            injected_bytes: 100_000,
            ..Default::default()
        };
        assert_eq!(decide(&soft, &thresholds(), &caps).action, GovernorAction::Ok);
    }

    #[test]
    fn test_turns_never_decrease_severity() {
        let bases = [
            PressureSignals::default(),
            PressureSignals {
                injected_bytes: 95_000,
                ..Default::default()
            },
            PressureSignals {
                injected_bytes: 155_000,
                ..Default::default()
            },
            PressureSignals {
                changed_files: 20,
                diff_lines: 170,
                ..Default::default()
            },
            PressureSignals {
                elapsed_ms: 60 * 60 * 1000,
                diff_lines: 300,
                ..Default::default()
            },
        ];
        let cap_sets = [
            all_enabled(),
            Capabilities {
                snapshot_enabled: true,
                rehydrate_enabled: false,
            },
            Capabilities {
                snapshot_enabled: false,
                rehydrate_enabled: true,
            },
        ];

        for caps in &cap_sets {
            for base in &bases {
                let mut previous = GovernorAction::Ok;
                for turns in 0..40 {
                    let signals = PressureSignals { turns, ..*base };
                    let action = decide(&signals, &thresholds(), caps).action;
                    assert!(
                        action >= previous,
                        "severity dropped at turns={turns}: {previous} -> {action}"
                    );
                    previous = action;
                }
            }
        }
    }

    #[test]
    fn test_detect_large_diff_devlog_only() {
        let changed = vec!["src/app.ts".to_string()];
        let events = detect_events(&facts(&changed, 120, false, "done"), &thresholds());
        assert_eq!(
            events,
            MeaningfulEvents {
                devlog: true,
                adr: false,
                rejected_approach: false
            }
        );
    }

    #[test]
    fn test_detect_many_files_devlog() {
        let changed: Vec<String> = (0..6).map(|i| format!("src/f{i}.ts")).collect();
        assert!(detect_events(&facts(&changed, 0, false, ""), &thresholds()).devlog);
        assert!(!detect_events(&facts(&changed[..5], 0, false, ""), &thresholds()).devlog);
    }

    #[test]
    fn test_detect_boundary_triggers_adr_and_devlog() {
        let changed = vec!["migrations/0004_add_theme.sql".to_string()];
        let events = detect_events(&facts(&changed, 3, false, "added a column"), &thresholds());
        assert!(events.adr);
        assert!(events.devlog);
        assert!(!events.rejected_approach);
    }

    #[test]
    fn test_detect_error_triggers_devlog_and_rejected() {
        let events = detect_events(&facts(&[], 0, true, ""), &thresholds());
        assert!(events.devlog);
        assert!(events.rejected_approach);
        assert!(!events.adr);
    }

    #[test]
    fn test_detect_pivot_language() {
        assert!(mentions_pivot("That didn't work, so I switched to a reducer instead."));
        assert!(mentions_pivot("Reverting the migration and trying another approach"));
        assert!(!mentions_pivot("Added the dark mode toggle to settings."));

        let events = detect_events(&facts(&[], 0, false, "Let's use CSS variables instead"), &thresholds());
        assert_eq!(events.kinds(), vec![ArtifactKind::RejectedApproach]);
    }

    #[test]
    fn test_quiet_turn_has_no_events() {
        let events = detect_events(&facts(&[], 10, false, "Done."), &thresholds());
        assert!(!events.any());
        assert!(events.kinds().is_empty());
    }

    #[test]
    fn test_event_fingerprint_inputs() {
        let changed: Vec<String> = vec![];
        let a = event_fingerprint(&facts(&changed, 5, false, "Same RESPONSE"));
        let b = event_fingerprint(&facts(&changed, 5, false, "same response"));
        assert_eq!(a, b, "response is lowercased");
        assert_ne!(a, event_fingerprint(&facts(&changed, 6, false, "same response")));
        assert_ne!(a, event_fingerprint(&facts(&changed, 5, true, "same response")));

        let long_a = format!("{}{}", "x".repeat(160), "tail one");
        let long_b = format!("{}{}", "x".repeat(160), "tail two");
        assert_eq!(
            event_fingerprint(&facts(&changed, 5, false, &long_a)),
            event_fingerprint(&facts(&changed, 5, false, &long_b))
        );
    }

    #[test]
    fn test_artifact_content_headlines() {
        let changed = vec!["src/preload/index.ts".to_string(), "src/app.ts".to_string()];
        let f = facts(&changed, 200, true, "It failed.");
        let devlog = artifact_content(ArtifactKind::Devlog, &f, &thresholds());
        assert!(devlog.starts_with("devlog: 2 changed files, 200 diff lines, run errored\n"));
        assert!(devlog.contains("\n- src/app.ts"));
        assert!(devlog.ends_with("response: It failed."));

        let adr = artifact_content(ArtifactKind::Adr, &f, &thresholds());
        assert!(adr.starts_with("adr: boundary-sensitive change in src/preload/index.ts\n"));

        let rejected = artifact_content(ArtifactKind::RejectedApproach, &f, &thresholds());
        assert!(rejected.starts_with("rejected-approach: run ended in error"));
    }

    #[test]
    fn test_artifact_content_caps_file_list() {
        let changed: Vec<String> = (0..15).map(|i| format!("src/f{i}.ts")).collect();
        let body = artifact_content(ArtifactKind::Devlog, &facts(&changed, 0, false, ""), &thresholds());
        assert!(body.contains("- ... 3 more"));
        assert!(!body.contains("response:"));
    }
}
