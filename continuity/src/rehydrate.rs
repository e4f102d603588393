//! Rehydrate: replace a conversation's history with one compact summary.
//!
//! The synthetic message carries the conversation mode, the governor
//! reasons, the first line of each recent artifact and the latest user
//! prompt. Replacing history also clears in-flight session and stream
//! identifiers so the next turn starts a fresh model session.
//!
//! Only the rehydrated conversation is touched; siblings are never
//! modified. There is no backup of the replaced history.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::artifacts::ContinuityArtifact;
use crate::error::{ContinuityError, ContinuityResult};
use crate::text::{first_non_blank_line, truncate_bytes};

/// Role of a stored conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One stored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: MessageRole,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Conversation persistence owned by the host application.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Replace the full message history.
    async fn replace_messages(
        &self,
        conversation_id: &str,
        messages: Vec<ConversationMessage>,
    ) -> ContinuityResult<()>;

    /// Drop session and stream identifiers so the next turn starts fresh.
    async fn clear_stream_state(&self, conversation_id: &str) -> ContinuityResult<()>;

    /// Bump the parent conversation's updated-at timestamp.
    async fn touch_parent(&self, conversation_id: &str) -> ContinuityResult<()>;
}

/// Inputs for the synthetic rehydrate message.
#[derive(Debug, Clone)]
pub struct RehydrateRequest<'a> {
    pub conversation_mode: &'a str,
    pub reasons: &'a [String],
    pub artifacts: &'a [ContinuityArtifact],
    pub latest_prompt: &'a str,
    pub carried_line_bytes: usize,
    pub prompt_bytes: usize,
}

/// First non-blank line of each artifact, truncated.
pub fn carried_forward(artifacts: &[ContinuityArtifact], max_bytes: usize) -> Vec<String> {
    artifacts
        .iter()
        .filter_map(|a| first_non_blank_line(&a.content))
        .map(|line| truncate_bytes(line, max_bytes).to_string())
        .collect()
}

/// Build the single message that replaces the history.
pub fn build_rehydrate_message(request: &RehydrateRequest<'_>) -> ConversationMessage {
    let carried = carried_forward(request.artifacts, request.carried_line_bytes);
    let prompt = truncate_bytes(request.latest_prompt.trim(), request.prompt_bytes);

    let mut text = String::from("[continuity:rehydrate]\n");
    text.push_str(&format!("mode: {}\n", request.conversation_mode));
    text.push_str(&format!("reasons: {}\n", request.reasons.join(", ")));
    text.push_str("carried forward:");
    if carried.is_empty() {
        text.push_str(" (none)");
    }
    for line in &carried {
        text.push_str("\n- ");
        text.push_str(line);
    }
    text.push_str("\nlatest prompt:\n");
    text.push_str(prompt);

    ConversationMessage {
        id: Uuid::new_v4().to_string(),
        role: MessageRole::System,
        text,
        metadata: serde_json::json!({
            "continuity": {
                "kind": "rehydrate",
                "mode": request.conversation_mode,
                "reasons": request.reasons,
                "carried": carried,
            }
        }),
    }
}

/// Replace history, clear stream state, touch the parent.
///
/// Stops at the first failing step.
pub async fn apply_rehydrate(
    conversations: &dyn ConversationStore,
    conversation_id: &str,
    message: ConversationMessage,
) -> ContinuityResult<()> {
    conversations
        .replace_messages(conversation_id, vec![message])
        .await?;
    conversations.clear_stream_state(conversation_id).await?;
    conversations.touch_parent(conversation_id).await
}

/// In-process [`ConversationStore`] for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryConversations {
    messages: Mutex<HashMap<String, Vec<ConversationMessage>>>,
    streaming: Mutex<HashSet<String>>,
    touched: Mutex<Vec<String>>,
}

impl InMemoryConversations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a conversation's history.
    pub fn insert_messages(&self, conversation_id: &str, messages: Vec<ConversationMessage>) {
        let mut map = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(conversation_id.to_string(), messages);
    }

    /// Mark a conversation as having a live session/stream.
    pub fn set_streaming(&self, conversation_id: &str) {
        let mut set = self.streaming.lock().unwrap_or_else(|e| e.into_inner());
        set.insert(conversation_id.to_string());
    }

    pub fn messages(&self, conversation_id: &str) -> Vec<ConversationMessage> {
        let map = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        map.get(conversation_id).cloned().unwrap_or_default()
    }

    pub fn is_streaming(&self, conversation_id: &str) -> bool {
        let set = self.streaming.lock().unwrap_or_else(|e| e.into_inner());
        set.contains(conversation_id)
    }

    /// Conversations whose parent was touched, in call order.
    pub fn touched(&self) -> Vec<String> {
        self.touched.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversations {
    async fn replace_messages(
        &self,
        conversation_id: &str,
        messages: Vec<ConversationMessage>,
    ) -> ContinuityResult<()> {
        let mut map = self
            .messages
            .lock()
            .map_err(|_| ContinuityError::conversation("message map poisoned"))?;
        map.insert(conversation_id.to_string(), messages);
        Ok(())
    }

    async fn clear_stream_state(&self, conversation_id: &str) -> ContinuityResult<()> {
        let mut set = self
            .streaming
            .lock()
            .map_err(|_| ContinuityError::conversation("stream set poisoned"))?;
        set.remove(conversation_id);
        Ok(())
    }

    async fn touch_parent(&self, conversation_id: &str) -> ContinuityResult<()> {
        let mut touched = self
            .touched
            .lock()
            .map_err(|_| ContinuityError::conversation("touch log poisoned"))?;
        touched.push(conversation_id.to_string());
        Ok(())
    }
}
