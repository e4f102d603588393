//! Telemetry events and pack cache counters
//!
//! Emission is synchronous and infallible: a sink must never block or
//! fail the turn that produced the event.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::info;

use crate::artifacts::ArtifactKind;
use crate::governor::GovernorAction;

/// Continuity telemetry event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A pack was produced (built or served from cache).
    PackMetrics {
        conversation_id: String,
        provider: String,
        mode: String,
        pack_bytes: usize,
        cache_hit: bool,
        /// False in passive mode, where the pack is tracked but not sent.
        injected: bool,
    },

    /// Effective governor action for a completed turn.
    GovernorAction {
        conversation_id: String,
        action: GovernorAction,
        reasons: Vec<String>,
    },

    /// A new artifact row was inserted.
    ArtifactWritten {
        conversation_id: String,
        kind: ArtifactKind,
    },

    /// An auto-commit was requested and checked against the memory branch.
    Safeguard {
        conversation_id: String,
        requested: bool,
        allowed: bool,
        current_branch: String,
    },
}

impl TelemetryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PackMetrics { .. } => "continuity.pack",
            Self::GovernorAction { .. } => "continuity.governor",
            Self::ArtifactWritten { .. } => "continuity.artifact",
            Self::Safeguard { .. } => "continuity.safeguard",
        }
    }
}

/// Fire-and-forget event sink.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// Logs events as structured `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        let name = event.name();
        match event {
            TelemetryEvent::PackMetrics {
                conversation_id,
                provider,
                mode,
                pack_bytes,
                cache_hit,
                injected,
            } => info!(
                telemetry = name,
                conversation_id = %conversation_id,
                provider = %provider,
                mode = %mode,
                pack_bytes,
                cache_hit,
                injected,
                "pack metrics"
            ),
            TelemetryEvent::GovernorAction {
                conversation_id,
                action,
                reasons,
            } => info!(
                telemetry = name,
                conversation_id = %conversation_id,
                action = %action,
                reasons = ?reasons,
                "governor action"
            ),
            TelemetryEvent::ArtifactWritten {
                conversation_id,
                kind,
            } => info!(
                telemetry = name,
                conversation_id = %conversation_id,
                kind = %kind,
                "artifact written"
            ),
            TelemetryEvent::Safeguard {
                conversation_id,
                requested,
                allowed,
                current_branch,
            } => info!(
                telemetry = name,
                conversation_id = %conversation_id,
                requested,
                allowed,
                current_branch = %current_branch,
                "auto-commit safeguard"
            ),
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

/// Pack cache counters
#[derive(Debug, Default)]
pub struct PackStats {
    hits: AtomicU64,
    misses: AtomicU64,
    bytes_served: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// Pack bytes returned to callers, hits and misses alike.
    pub bytes_served: u64,
}

impl PackStats {
    pub fn record(&self, cache_hit: bool, pack_bytes: usize) {
        if cache_hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_served
            .fetch_add(pack_bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PackStatsSnapshot {
        PackStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bytes_served: self.bytes_served.load(Ordering::Relaxed),
        }
    }
}
