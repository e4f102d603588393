//! Continuity Context Engine
//!
//! Decides, on every agent turn, how much project and conversation context
//! to inject into the prompt, and watches for context pressure across turns.
//!
//! - `apply`: builds a labeled context pack (anchor docs, relevant-file
//!   summaries, working-tree delta), clamps it to a byte budget, caches it
//!   keyed on repository state, and prepends it to the prompt
//! - `record_run_outcome`: scores turn, byte, churn, diff and time
//!   pressure and answers `ok`, `snapshot` or `rehydrate`; writes
//!   idempotent draft artifacts for meaningful turns; guards automatic
//!   commits to the memory branch
//!
//! Continuity is an optimization layer. Nothing here returns an error to
//! the caller: failed collaborators degrade to the bare prompt and an `ok`
//! action.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use continuity::{ContinuityConfig, ContinuityInput, ContinuityService, InMemoryStore};
//!
//! let service = ContinuityService::builder(ContinuityConfig::from_env(), Arc::new(InMemoryStore::new()))
//!     .build();
//! let out = service.apply(&ContinuityInput {
//!     conversation_id: "conv-1".into(),
//!     cwd: "/path/to/repo".into(),
//!     project_path: None,
//!     prompt: "add dark mode toggle".into(),
//!     mode: "agent".into(),
//!     provider: "claude".into(),
//! }).await;
//! ```
//!
//! # Features
//!
//! - `rocksdb-store`: durable [`store::RocksStore`] backend

pub mod artifacts;
pub mod cache;
pub mod config;
pub mod error;
pub mod governor;
pub mod pack;
pub mod rehydrate;
pub mod repo;
pub mod safeguard;
pub mod search;
pub mod service;
pub mod store;
pub mod summary;
pub mod telemetry;
pub mod text;

pub use artifacts::{ArtifactKind, ArtifactWriter, ContinuityArtifact, Provenance};
pub use config::{Capabilities, ContinuityConfig, ContinuityMode};
pub use error::{try_persist, ContinuityError, ContinuityResult};
pub use governor::{GovernorAction, GovernorDecision};
pub use rehydrate::{ConversationMessage, ConversationStore, InMemoryConversations, MessageRole};
pub use repo::{FileLister, GitCli, RepoFileLister, RepoState, VersionControl, WalkLister};
pub use safeguard::{ArtifactPolicy, SafeguardAssessment, SafeguardSettings};
pub use service::{
    ApplyOutcome, ContinuityInput, ContinuityService, ContinuityServiceBuilder,
    ConversationState, RunOutcome, RunOutcomeInput,
};
pub use store::{ContinuityStore, InMemoryStore, StoreError, StoreResult, Table};
pub use telemetry::{
    MemoryTelemetry, NoopTelemetry, PackStatsSnapshot, TelemetryEvent, TelemetrySink,
    TracingTelemetry,
};
