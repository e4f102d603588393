//! Continuity service: the two entry points the agent caller uses.
//!
//! `apply` runs before a model turn and returns the prompt to send.
//! `record_run_outcome` runs after the turn and decides whether the
//! conversation needs a snapshot or a rehydrate.
//!
//! Neither operation returns an error. Every collaborator failure degrades
//! to a sentinel or empty value; in the worst case `apply` returns the
//! bare prompt and `record_run_outcome` returns `ok`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactKind, ArtifactRequest, ArtifactWriter, ContinuityArtifact};
use crate::cache::{CacheTier, TtlPolicy};
use crate::config::{ContinuityConfig, ContinuityMode};
use crate::error::try_persist;
use crate::governor::{
    artifact_content, decide, detect_events, event_fingerprint, GovernorAction, GovernorDecision,
    PressureSignals, TurnFacts,
};
use crate::pack::{pack_cache_key, ContextPack, PackAssembler, PackKey};
use crate::rehydrate::{apply_rehydrate, build_rehydrate_message, ConversationStore, RehydrateRequest};
use crate::repo::{
    CommandLimits, FileLister, GitCli, RepoFileLister, RepoStateReader, VersionControl,
};
use crate::safeguard::{assess_auto_commit_policy, SafeguardAssessment, SafeguardSettings};
use crate::search::RelevanceSearch;
use crate::store::schema::keys;
use crate::store::{get_json, put_json, ContinuityStore, Table};
use crate::summary::FileSummarizer;
use crate::telemetry::{PackStats, PackStatsSnapshot, TelemetryEvent, TelemetrySink, TracingTelemetry};
use crate::text::task_fingerprint;

/// Input to [`ContinuityService::apply`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuityInput {
    pub conversation_id: String,
    pub cwd: PathBuf,
    /// Repository root when it differs from `cwd`.
    pub project_path: Option<PathBuf>,
    pub prompt: String,
    /// Conversation mode of the agent (e.g. `agent`, `plan`).
    pub mode: String,
    pub provider: String,
}

/// Prompt to send plus whether the pack came from cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub prompt: String,
    pub cache_hit: bool,
}

/// Input to [`ContinuityService::record_run_outcome`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcomeInput {
    pub conversation_id: String,
    pub cwd: PathBuf,
    pub project_path: Option<PathBuf>,
    pub mode: String,
    /// Latest user prompt, carried into a rehydrate message.
    pub prompt: String,
    pub response_text: String,
    pub was_error: bool,
    /// Bytes injected this turn. Negative values count as zero.
    pub injected_bytes: i64,
}

/// Result of [`ContinuityService::record_run_outcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub action: GovernorAction,
    pub reasons: Vec<String>,
    /// Artifact kinds inserted this turn (duplicates are not listed).
    pub artifacts_written: Vec<ArtifactKind>,
    /// Present when an auto-commit was requested.
    pub safeguard: Option<SafeguardAssessment>,
    pub rehydrated: bool,
}

impl RunOutcome {
    pub fn ok() -> Self {
        Self {
            action: GovernorAction::Ok,
            reasons: Vec::new(),
            artifacts_written: Vec::new(),
            safeguard: None,
            rehydrated: false,
        }
    }
}

/// Per-conversation continuity counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationState {
    /// Changed-files hash seen by the last pack build.
    pub last_changed_files_hash: Option<String>,
    pub turns_since_reset: u64,
    pub total_injected_bytes: u64,
    pub last_reset_at: Option<DateTime<Utc>>,
    /// Size of the latest pack built for this conversation.
    pub last_pack_bytes: u64,
}

impl ConversationState {
    /// State for a conversation seen for the first time.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            last_reset_at: Some(now),
            ..Self::default()
        }
    }

    /// Milliseconds since the last reset; zero when unknown or in the future.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        self.last_reset_at
            .map(|at| now.signed_duration_since(at).num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }
}

/// Builder for [`ContinuityService`].
pub struct ContinuityServiceBuilder {
    config: ContinuityConfig,
    store: Arc<dyn ContinuityStore>,
    vcs: Option<Arc<dyn VersionControl>>,
    lister: Option<Arc<dyn FileLister>>,
    conversations: Option<Arc<dyn ConversationStore>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl ContinuityServiceBuilder {
    pub fn new(config: ContinuityConfig, store: Arc<dyn ContinuityStore>) -> Self {
        Self {
            config,
            store,
            vcs: None,
            lister: None,
            conversations: None,
            telemetry: None,
        }
    }

    /// Version-control binding (default: `git` CLI).
    pub fn vcs(mut self, vcs: Arc<dyn VersionControl>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    /// File lister (default: ripgrep with a walk fallback).
    pub fn lister(mut self, lister: Arc<dyn FileLister>) -> Self {
        self.lister = Some(lister);
        self
    }

    /// Conversation store used by rehydrate. Without one, rehydrate is skipped.
    pub fn conversations(mut self, conversations: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(conversations);
        self
    }

    /// Telemetry sink (default: tracing).
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn build(self) -> ContinuityService {
        let process = self.config.process;
        let vcs_limits = CommandLimits {
            timeout: process.vcs_timeout,
            max_output_bytes: process.max_output_bytes,
        };
        let vcs: Arc<dyn VersionControl> = match self.vcs {
            Some(vcs) => vcs,
            None => Arc::new(GitCli::new(vcs_limits)),
        };
        let lister: Arc<dyn FileLister> = match self.lister {
            Some(lister) => lister,
            None => Arc::new(RepoFileLister::new(process.max_output_bytes)),
        };

        let search = RelevanceSearch::new(
            lister,
            self.store.clone(),
            self.config.search.clone(),
            process.list_timeout,
        );
        let summarizer = FileSummarizer::new(self.store.clone(), self.config.summary.clone());
        let assembler = PackAssembler::new(
            search,
            summarizer,
            self.config.budget.clone(),
            self.config.search.clone(),
        );

        ContinuityService {
            repo: RepoStateReader::new(vcs.clone(), vcs_limits),
            vcs,
            assembler,
            packs: CacheTier::new("pack", Table::PackCache, TtlPolicy::Forever, self.store.clone()),
            artifacts: ArtifactWriter::new(self.store.clone(), self.config.artifacts.dedupe_window),
            conversations: self.conversations,
            telemetry: self
                .telemetry
                .unwrap_or_else(|| Arc::new(TracingTelemetry) as Arc<dyn TelemetrySink>),
            stats: PackStats::default(),
            store: self.store,
            config: self.config,
        }
    }
}

/// The continuity engine. Share one instance behind an `Arc`.
pub struct ContinuityService {
    config: ContinuityConfig,
    store: Arc<dyn ContinuityStore>,
    vcs: Arc<dyn VersionControl>,
    repo: RepoStateReader,
    assembler: PackAssembler,
    packs: CacheTier<ContextPack>,
    artifacts: ArtifactWriter,
    conversations: Option<Arc<dyn ConversationStore>>,
    telemetry: Arc<dyn TelemetrySink>,
    stats: PackStats,
}

impl ContinuityService {
    pub fn builder(config: ContinuityConfig, store: Arc<dyn ContinuityStore>) -> ContinuityServiceBuilder {
        ContinuityServiceBuilder::new(config, store)
    }

    pub fn config(&self) -> &ContinuityConfig {
        &self.config
    }

    pub fn stats(&self) -> PackStatsSnapshot {
        self.stats.snapshot()
    }

    /// Build or fetch the context pack and return the prompt to send.
    pub async fn apply(&self, input: &ContinuityInput) -> ApplyOutcome {
        let mode = self.config.mode;
        if mode == ContinuityMode::Off {
            return ApplyOutcome {
                prompt: input.prompt.clone(),
                cache_hit: false,
            };
        }

        let root = repo_root(&input.cwd, input.project_path.as_deref());
        let fingerprint = task_fingerprint(&input.prompt);
        let state = self.repo.repo_state(root).await;
        let key = pack_cache_key(PackKey {
            task_fingerprint: &fingerprint,
            changed_files_hash: &state.changed_files_hash,
            head_revision: &state.head_revision,
            provider: &input.provider,
            mode: &input.mode,
            budget_bytes: self.assembler.budget_bytes(),
        });

        if let Some((cached, source)) = self.packs.get(&key).await {
            debug!(conversation_id = %input.conversation_id, ?source, "pack cache hit");
            return self.finish_apply(input, mode, cached.pack, true);
        }

        let previous = self.load_state(&input.conversation_id).await;
        let pack = self
            .assembler
            .build(
                root,
                &input.prompt,
                &state,
                previous
                    .as_ref()
                    .and_then(|s| s.last_changed_files_hash.as_deref()),
            )
            .await;
        self.packs
            .put(&key, ContextPack { pack: pack.clone() })
            .await;

        let mut conversation = previous.unwrap_or_else(|| ConversationState::fresh(Utc::now()));
        conversation.last_changed_files_hash = Some(state.changed_files_hash.clone());
        conversation.last_pack_bytes = pack.len() as u64;
        self.save_state(&input.conversation_id, &conversation).await;

        self.finish_apply(input, mode, pack, false)
    }

    fn finish_apply(
        &self,
        input: &ContinuityInput,
        mode: ContinuityMode,
        pack: String,
        cache_hit: bool,
    ) -> ApplyOutcome {
        let injected = mode == ContinuityMode::Active;
        self.stats.record(cache_hit, pack.len());
        self.telemetry.emit(TelemetryEvent::PackMetrics {
            conversation_id: input.conversation_id.clone(),
            provider: input.provider.clone(),
            mode: input.mode.clone(),
            pack_bytes: pack.len(),
            cache_hit,
            injected,
        });

        let prompt = if injected {
            format!("{pack}\n\n{}", input.prompt)
        } else {
            input.prompt.clone()
        };
        ApplyOutcome { prompt, cache_hit }
    }

    /// Score the finished turn, write artifacts and apply interventions.
    pub async fn record_run_outcome(&self, input: &RunOutcomeInput) -> RunOutcome {
        let mode = self.config.mode;
        if mode == ContinuityMode::Off {
            return RunOutcome::ok();
        }

        let root = repo_root(&input.cwd, input.project_path.as_deref());
        let repo_state = self.repo.repo_state(root).await;
        let diff = self.repo.diff_stats(root).await;
        let now = Utc::now();

        let current = self
            .load_state(&input.conversation_id)
            .await
            .unwrap_or_else(|| ConversationState::fresh(now));
        let next_turns = current.turns_since_reset.saturating_add(1);
        let next_bytes = current
            .total_injected_bytes
            .saturating_add(input.injected_bytes.max(0) as u64);

        let signals = PressureSignals {
            turns: next_turns,
            injected_bytes: next_bytes,
            changed_files: repo_state.changed_files.len() as u64,
            diff_lines: diff.total_lines,
            elapsed_ms: current.elapsed_ms(now),
        };
        let GovernorDecision { action, reasons } =
            decide(&signals, &self.config.thresholds, &self.config.capabilities);

        let facts = TurnFacts {
            head_revision: &repo_state.head_revision,
            changed_files_hash: &repo_state.changed_files_hash,
            changed_files: &repo_state.changed_files,
            diff_lines: diff.total_lines,
            was_error: input.was_error,
            response_text: &input.response_text,
        };
        let events = detect_events(&facts, &self.config.thresholds);

        let mut outcome = RunOutcome {
            action,
            reasons,
            ..RunOutcome::ok()
        };

        if mode == ContinuityMode::Active && events.any() {
            let fingerprint = event_fingerprint(&facts);
            for kind in events.kinds() {
                let content = artifact_content(kind, &facts, &self.config.thresholds);
                let written = self
                    .artifacts
                    .write_if_new(ArtifactRequest {
                        conversation_id: &input.conversation_id,
                        kind,
                        event_fingerprint: &fingerprint,
                        content: &content,
                    })
                    .await;
                if written {
                    self.telemetry.emit(TelemetryEvent::ArtifactWritten {
                        conversation_id: input.conversation_id.clone(),
                        kind,
                    });
                    outcome.artifacts_written.push(kind);
                }
            }

            let settings = self.safeguard_settings().await;
            if settings.auto_commit_requested() {
                let assessment = assess_auto_commit_policy(self.vcs.as_ref(), root, &settings).await;
                self.telemetry.emit(TelemetryEvent::Safeguard {
                    conversation_id: input.conversation_id.clone(),
                    requested: assessment.requested,
                    allowed: assessment.allowed,
                    current_branch: assessment.current_branch.clone(),
                });
                outcome.safeguard = Some(assessment);
            }
        }

        let next_state = if action.is_intervention() {
            ConversationState {
                turns_since_reset: 0,
                total_injected_bytes: 0,
                last_reset_at: Some(now),
                ..current
            }
        } else {
            ConversationState {
                turns_since_reset: next_turns,
                total_injected_bytes: next_bytes,
                ..current
            }
        };
        self.save_state(&input.conversation_id, &next_state).await;

        if action == GovernorAction::Rehydrate && mode == ContinuityMode::Active {
            outcome.rehydrated = self.rehydrate(input, &outcome.reasons).await;
        }

        if action.is_intervention() {
            info!(
                conversation_id = %input.conversation_id,
                action = %action,
                reasons = ?outcome.reasons,
                "continuity intervention"
            );
        }
        self.telemetry.emit(TelemetryEvent::GovernorAction {
            conversation_id: input.conversation_id.clone(),
            action,
            reasons: outcome.reasons.clone(),
        });
        outcome
    }

    async fn rehydrate(&self, input: &RunOutcomeInput, reasons: &[String]) -> bool {
        let Some(conversations) = self.conversations.as_ref() else {
            debug!(
                conversation_id = %input.conversation_id,
                "no conversation store, skipping rehydrate"
            );
            return false;
        };

        let recent = self
            .artifacts
            .recent(&input.conversation_id, self.config.artifacts.rehydrate_carry)
            .await;
        let message = build_rehydrate_message(&RehydrateRequest {
            conversation_mode: &input.mode,
            reasons,
            artifacts: &recent,
            latest_prompt: &input.prompt,
            carried_line_bytes: self.config.budget.carried_line_bytes,
            prompt_bytes: self.config.budget.rehydrate_prompt_bytes,
        });
        try_persist(
            "conversation.rehydrate",
            apply_rehydrate(conversations.as_ref(), &input.conversation_id, message),
        )
        .await
        .is_some()
    }

    /// Global safeguard settings, created with defaults on first read.
    ///
    /// Defaults are persisted only when no row exists. An unreadable or
    /// corrupt row yields in-memory defaults and leaves storage untouched.
    pub async fn safeguard_settings(&self) -> SafeguardSettings {
        match get_json::<SafeguardSettings>(
            self.store.as_ref(),
            Table::Settings,
            keys::SAFEGUARD_SETTINGS,
        )
        .await
        {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                let defaults = SafeguardSettings::default();
                self.update_safeguard_settings(&defaults).await;
                defaults
            }
            Err(e) => {
                warn!(operation = "settings.get", error = %e, "continuity persistence degraded");
                SafeguardSettings::default()
            }
        }
    }

    /// Persist new safeguard settings. Returns whether they were stored.
    pub async fn update_safeguard_settings(&self, settings: &SafeguardSettings) -> bool {
        try_persist(
            "settings.put",
            put_json(self.store.as_ref(), Table::Settings, keys::SAFEGUARD_SETTINGS, settings),
        )
        .await
        .is_some()
    }

    /// Persisted state for a conversation, if any.
    pub async fn conversation_state(&self, conversation_id: &str) -> Option<ConversationState> {
        self.load_state(conversation_id).await
    }

    /// Most recent artifacts for a conversation, newest first.
    pub async fn recent_artifacts(&self, conversation_id: &str, limit: usize) -> Vec<ContinuityArtifact> {
        self.artifacts.recent(conversation_id, limit).await
    }

    async fn load_state(&self, conversation_id: &str) -> Option<ConversationState> {
        try_persist(
            "state.get",
            get_json(self.store.as_ref(), Table::ConversationState, conversation_id),
        )
        .await
        .flatten()
    }

    async fn save_state(&self, conversation_id: &str, state: &ConversationState) {
        let _ = try_persist(
            "state.put",
            put_json(self.store.as_ref(), Table::ConversationState, conversation_id, state),
        )
        .await;
    }
}

fn repo_root<'a>(cwd: &'a Path, project_path: Option<&'a Path>) -> &'a Path {
    project_path.unwrap_or(cwd)
}
