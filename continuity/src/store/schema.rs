//! Table definitions for continuity persistence
//!
//! Each table maps to one column family in the RocksDB backend and to one
//! map in the in-memory backend.

use serde::{Deserialize, Serialize};

/// Column family for assembled context packs
pub const CF_PACK_CACHE: &str = "pack_cache";

/// Column family for relevance search results
pub const CF_SEARCH_CACHE: &str = "search_cache";

/// Column family for per-file summaries
pub const CF_SUMMARY_CACHE: &str = "summary_cache";

/// Column family for per-conversation governor state
pub const CF_CONVERSATION_STATE: &str = "conversation_state";

/// Column family for global settings
pub const CF_SETTINGS: &str = "settings";

/// Column family for continuity artifacts
pub const CF_ARTIFACTS: &str = "artifacts";

/// All column family names
pub const ALL_CFS: &[&str] = &[
    CF_PACK_CACHE,
    CF_SEARCH_CACHE,
    CF_SUMMARY_CACHE,
    CF_CONVERSATION_STATE,
    CF_SETTINGS,
    CF_ARTIFACTS,
];

/// Key-value tables addressable through [`ContinuityStore`](super::ContinuityStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    PackCache,
    SearchCache,
    SummaryCache,
    ConversationState,
    Settings,
}

impl Table {
    /// Column family backing this table.
    pub fn column_family(&self) -> &'static str {
        match self {
            Self::PackCache => CF_PACK_CACHE,
            Self::SearchCache => CF_SEARCH_CACHE,
            Self::SummaryCache => CF_SUMMARY_CACHE,
            Self::ConversationState => CF_CONVERSATION_STATE,
            Self::Settings => CF_SETTINGS,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column_family())
    }
}

/// Key builders for compound keys
pub mod keys {
    /// Singleton row holding [`SafeguardSettings`](crate::safeguard::SafeguardSettings)
    pub const SAFEGUARD_SETTINGS: &str = "safeguard";

    /// Create an artifact key; zero-padded millis keep prefix scans chronological
    pub fn artifact(conversation_id: &str, created_at_ms: i64, id: &str) -> String {
        format!("{}:{:020}:{}", conversation_id, created_at_ms.max(0), id)
    }

    /// Prefix covering every artifact of a conversation
    pub fn artifact_prefix(conversation_id: &str) -> String {
        format!("{}:", conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_keys_sort_chronologically() {
        let early = keys::artifact("conv", 9_000, "b");
        let late = keys::artifact("conv", 10_000, "a");
        assert!(early < late);
        assert!(early.starts_with(&keys::artifact_prefix("conv")));
    }

    #[test]
    fn test_every_table_has_a_column_family() {
        for table in [
            Table::PackCache,
            Table::SearchCache,
            Table::SummaryCache,
            Table::ConversationState,
            Table::Settings,
        ] {
            assert!(ALL_CFS.contains(&table.column_family()));
        }
    }
}
