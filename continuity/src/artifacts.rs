//! Continuity artifacts: durable draft records of meaningful turns.
//!
//! Artifacts are append-only. Idempotency comes from the event fingerprint
//! stored in each row's provenance: a write whose fingerprint already
//! appears among the recent artifacts of the same kind is skipped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::try_persist;
use crate::store::ContinuityStore;

/// Kind of artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// Work log entry for a substantial or risky turn.
    Devlog,
    /// Architecture decision record draft for boundary-sensitive changes.
    Adr,
    /// Record of an approach that failed or was abandoned.
    RejectedApproach,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devlog => "devlog",
            Self::Adr => "adr",
            Self::RejectedApproach => "rejected-approach",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review status of an artifact. Everything the engine writes is a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Draft,
}

/// Where an artifact came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub event_fingerprint: String,
    pub created_by: String,
}

impl Provenance {
    pub fn new(event_fingerprint: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            event_fingerprint: event_fingerprint.into(),
            created_by: created_by.into(),
        }
    }
}

/// A stored artifact row.
///
/// `provenance` is kept as raw JSON text, the way it is stored, so a
/// corrupt row still loads and is simply never matched as a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuityArtifact {
    pub id: Uuid,
    pub conversation_id: String,
    pub kind: ArtifactKind,
    pub content: String,
    pub status: ArtifactStatus,
    pub provenance: String,
    pub created_at: DateTime<Utc>,
}

impl ContinuityArtifact {
    /// Build a new draft artifact.
    pub fn draft(
        conversation_id: &str,
        kind: ArtifactKind,
        content: &str,
        provenance: &Provenance,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id: conversation_id.to_string(),
            kind,
            content: content.to_string(),
            status: ArtifactStatus::Draft,
            provenance: serde_json::to_string(provenance).unwrap_or_default(),
            created_at: Utc::now(),
        }
    }

    /// Parsed provenance, `None` when the stored JSON is malformed.
    pub fn parsed_provenance(&self) -> Option<Provenance> {
        serde_json::from_str(&self.provenance).ok()
    }
}

/// Request to record one artifact.
#[derive(Debug, Clone)]
pub struct ArtifactRequest<'a> {
    pub conversation_id: &'a str,
    pub kind: ArtifactKind,
    pub event_fingerprint: &'a str,
    pub content: &'a str,
}

/// Writes artifacts exactly once per event fingerprint.
pub struct ArtifactWriter {
    store: Arc<dyn ContinuityStore>,
    dedupe_window: usize,
    created_by: String,
}

impl ArtifactWriter {
    pub fn new(store: Arc<dyn ContinuityStore>, dedupe_window: usize) -> Self {
        Self {
            store,
            dedupe_window,
            created_by: "continuity-governor".to_string(),
        }
    }

    /// Insert the artifact unless a recent one of the same kind carries the
    /// same fingerprint. Returns `true` when a row was inserted.
    ///
    /// Never fails: an unreadable history counts as "no duplicate" and a
    /// failed insert is logged and reported as `false`.
    pub async fn write_if_new(&self, request: ArtifactRequest<'_>) -> bool {
        let recent = try_persist(
            "artifacts.recent",
            self.store.recent_artifacts(
                request.conversation_id,
                Some(request.kind),
                self.dedupe_window,
            ),
        )
        .await
        .unwrap_or_default();

        let duplicate = recent.iter().any(|a| {
            a.parsed_provenance()
                .is_some_and(|p| p.event_fingerprint == request.event_fingerprint)
        });
        if duplicate {
            debug!(
                conversation_id = request.conversation_id,
                kind = %request.kind,
                "artifact fingerprint already recorded, skipping"
            );
            return false;
        }

        let artifact = ContinuityArtifact::draft(
            request.conversation_id,
            request.kind,
            request.content,
            &Provenance::new(request.event_fingerprint, self.created_by.as_str()),
        );
        let inserted = try_persist("artifacts.insert", self.store.insert_artifact(&artifact))
            .await
            .is_some();
        if inserted {
            info!(
                conversation_id = request.conversation_id,
                kind = %request.kind,
                "continuity artifact written"
            );
        }
        inserted
    }

    /// Most recent artifacts of any kind, newest first. Empty on failure.
    pub async fn recent(&self, conversation_id: &str, limit: usize) -> Vec<ContinuityArtifact> {
        try_persist(
            "artifacts.recent",
            self.store.recent_artifacts(conversation_id, None, limit),
        )
        .await
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn request<'a>(fingerprint: &'a str, kind: ArtifactKind) -> ArtifactRequest<'a> {
        ArtifactRequest {
            conversation_id: "conv-1",
            kind,
            event_fingerprint: fingerprint,
            content: "Devlog: 7 files changed",
        }
    }

    #[tokio::test]
    async fn test_write_if_new_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let writer = ArtifactWriter::new(store.clone(), 12);

        assert!(writer.write_if_new(request("fp-1", ArtifactKind::Devlog)).await);
        assert!(!writer.write_if_new(request("fp-1", ArtifactKind::Devlog)).await);
        assert_eq!(store.artifact_count(), 1);
    }

    #[tokio::test]
    async fn test_same_fingerprint_different_kind_is_new() {
        let store = Arc::new(InMemoryStore::new());
        let writer = ArtifactWriter::new(store.clone(), 12);

        assert!(writer.write_if_new(request("fp-1", ArtifactKind::Devlog)).await);
        assert!(writer.write_if_new(request("fp-1", ArtifactKind::Adr)).await);
        assert_eq!(store.artifact_count(), 2);
    }

    #[tokio::test]
    async fn test_fingerprint_outside_window_is_rewritten() {
        let store = Arc::new(InMemoryStore::new());
        let writer = ArtifactWriter::new(store.clone(), 2);

        assert!(writer.write_if_new(request("old", ArtifactKind::Devlog)).await);
        assert!(writer.write_if_new(request("b", ArtifactKind::Devlog)).await);
        assert!(writer.write_if_new(request("c", ArtifactKind::Devlog)).await);
        // "old" has scrolled out of the two-row window.
        assert!(writer.write_if_new(request("old", ArtifactKind::Devlog)).await);
        assert_eq!(store.artifact_count(), 4);
    }

    #[tokio::test]
    async fn test_malformed_provenance_never_matches() {
        let store = Arc::new(InMemoryStore::new());
        let mut corrupt = ContinuityArtifact::draft(
            "conv-1",
            ArtifactKind::Devlog,
            "old",
            &Provenance::new("fp-1", "test"),
        );
        corrupt.provenance = "{broken".to_string();
        store.insert_artifact(&corrupt).await.unwrap();

        let writer = ArtifactWriter::new(store.clone(), 12);
        assert!(writer.write_if_new(request("fp-1", ArtifactKind::Devlog)).await);
        assert_eq!(store.artifact_count(), 2);
    }

    #[test]
    fn test_provenance_serializes_camel_case() {
        let a = ContinuityArtifact::draft(
            "c",
            ArtifactKind::RejectedApproach,
            "x",
            &Provenance::new("abc", "gov"),
        );
        assert!(a.provenance.contains("\"eventFingerprint\":\"abc\""));
        assert_eq!(a.kind.to_string(), "rejected-approach");
        assert_eq!(a.status, ArtifactStatus::Draft);
    }
}
