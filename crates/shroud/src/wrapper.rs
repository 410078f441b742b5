use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::chat::{ChatMessage, ChatProvider, ChatResponse, ChatRole, MessageType, Tool};
use crate::detect::{Detector, Entity};
use crate::error::ShroudError;
use crate::replace::Replacer;
use crate::store::ConversationStore;
use crate::thread::ThreadId;

/// Wraps a chat backend with the privacy pipeline.
///
/// Per turn: read the already-redacted prefix from the conversation store,
/// detect and replace entities in the new tail only, forward the fully
/// redacted history to the wrapped backend, append the redacted tail plus the
/// redacted reply to the store, and restore originals in the reply before it
/// leaves the trust boundary.
///
/// The wrapper holds no per-thread state of its own; the stores carry it.
/// Calls for different threads may run in parallel. Calls within one thread
/// must be serialised by the caller, because the incremental step assumes a
/// consistent latest redacted prefix.
pub struct PrivacyChatModel {
    model: Arc<dyn ChatProvider>,
    detector: Arc<dyn Detector>,
    replacer: Arc<dyn Replacer>,
    conversations: Option<Arc<dyn ConversationStore>>,
}

impl fmt::Debug for PrivacyChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivacyChatModel").finish_non_exhaustive()
    }
}

impl PrivacyChatModel {
    pub fn new(
        model: Arc<dyn ChatProvider>,
        detector: Arc<dyn Detector>,
        replacer: Arc<dyn Replacer>,
        conversations: Option<Arc<dyn ConversationStore>>,
    ) -> Self {
        Self {
            model,
            detector,
            replacer,
            conversations,
        }
    }

    /// Runs one turn for the given complete history.
    ///
    /// `thread_key` scopes all mapping state. Without it the turn still runs
    /// fully protected, but under a fresh throwaway thread whose history is
    /// not persisted.
    pub async fn process_turn(
        &self,
        history: &[ChatMessage],
        thread_key: Option<&str>,
    ) -> Result<ChatMessage, ShroudError> {
        self.process_turn_with_tools(history, thread_key, None).await
    }

    /// [`PrivacyChatModel::process_turn`] with tools forwarded to the
    /// wrapped backend. Tool schemas are opaque to the pipeline; detection
    /// and replacement operate uniformly on argument strings.
    pub async fn process_turn_with_tools(
        &self,
        history: &[ChatMessage],
        thread_key: Option<&str>,
        tools: Option<&[Tool]>,
    ) -> Result<ChatMessage, ShroudError> {
        let (thread, persist) = match thread_key {
            Some(key) => (ThreadId::from_key(key), true),
            None => (ThreadId::random(), false),
        };

        let prefix = match (&self.conversations, persist) {
            (Some(store), true) => store.read(thread, None).await?,
            _ => Vec::new(),
        };

        // the caller always sends the complete history, so everything past
        // the stored prefix is new; a shorter history means nothing is new
        let new_tail: Vec<ChatMessage> = if prefix.len() < history.len() {
            history[prefix.len()..].to_vec()
        } else {
            Vec::new()
        };
        log::debug!(
            "thread {thread}: {} stored, {} new of {} supplied",
            prefix.len(),
            new_tail.len(),
            history.len()
        );

        let redacted_tail = if new_tail.is_empty() {
            Vec::new()
        } else {
            self.redact_messages(new_tail, thread).await?
        };

        let mut redacted_history = prefix;
        redacted_history.extend(redacted_tail.iter().cloned());

        let response = self
            .model
            .chat_with_tools(&redacted_history, tools)
            .await?;
        let redacted_reply = ChatMessage::from(response.as_ref());

        // sole durable conversation mutation of the turn, after the model
        // call succeeded; entity mappings written above are idempotent on
        // re-runs
        if persist && !redacted_tail.is_empty() {
            if let Some(store) = &self.conversations {
                let mut batch = redacted_tail;
                batch.push(redacted_reply.clone());
                log::info!("thread {thread}: storing {} redacted messages", batch.len());
                store.append(thread, &batch).await?;
            }
        }

        self.restore_message(redacted_reply, thread).await
    }

    /// The redacted messages stored for a thread, chronologically; what the
    /// wrapped model has actually seen.
    pub async fn stored_history(
        &self,
        thread_key: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, ShroudError> {
        match &self.conversations {
            Some(store) => Ok(store.read(ThreadId::from_key(thread_key), limit).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Drops the stored conversation and all entity mappings for a thread.
    pub async fn clear_thread(&self, thread_key: &str) -> Result<(), ShroudError> {
        let thread = ThreadId::from_key(thread_key);
        if let Some(store) = &self.conversations {
            store.clear(thread).await?;
        }
        self.replacer.entity_store().clear(thread).await?;
        Ok(())
    }

    /// Detects and replaces entities in a batch of new messages.
    ///
    /// Payloads are gathered across all messages (content keyed by message
    /// id, tool-call arguments keyed by tool-call id) and run through the
    /// detector in one batched call. System messages pass through untouched.
    async fn redact_messages(
        &self,
        mut messages: Vec<ChatMessage>,
        thread: ThreadId,
    ) -> Result<Vec<ChatMessage>, ShroudError> {
        let mut keys: Vec<String> = Vec::new();
        let mut texts: Vec<String> = Vec::new();

        for message in &mut messages {
            if message.id.is_none() {
                message.id = Some(Uuid::new_v4().to_string());
            }
            if message.role == ChatRole::System {
                continue;
            }
            if !message.content.trim().is_empty() {
                keys.push(message.id.clone().unwrap_or_default());
                texts.push(message.content.clone());
            }
            if let Some(calls) = message.tool_calls() {
                for call in calls {
                    if call.id.is_empty() {
                        return Err(ShroudError::MissingToolCallId);
                    }
                    if !call.function.arguments.trim().is_empty() {
                        keys.push(call.id.clone());
                        texts.push(call.function.arguments.clone());
                    }
                }
            }
        }

        let mut entities_by_key: HashMap<String, Vec<Entity>> = HashMap::new();
        if !texts.is_empty() {
            let results = self.detector.detect(&texts, None).await?;
            for (key, entities) in keys.into_iter().zip(results) {
                if !entities.is_empty() {
                    entities_by_key.insert(key, entities);
                }
            }
        }

        for message in &mut messages {
            if message.role == ChatRole::System {
                continue;
            }
            let id = message.id.clone().unwrap_or_default();
            if let Some(entities) = entities_by_key.get(&id) {
                message.content = self
                    .replacer
                    .replace(&message.content, entities, thread)
                    .await?;
            }
            match &mut message.message_type {
                MessageType::Text => {}
                MessageType::ToolUse(calls) | MessageType::ToolResult(calls) => {
                    for call in calls.iter_mut() {
                        if let Some(entities) = entities_by_key.get(&call.id) {
                            let replaced = self
                                .replacer
                                .replace(&call.function.arguments, entities, thread)
                                .await?;
                            call.function.arguments = reparse_arguments(&replaced)?;
                        }
                    }
                }
            }
        }

        Ok(messages)
    }

    /// Restores originals in a redacted message before it is returned.
    async fn restore_message(
        &self,
        mut message: ChatMessage,
        thread: ThreadId,
    ) -> Result<ChatMessage, ShroudError> {
        message.content = self.replacer.restore(&message.content, thread).await?;
        match &mut message.message_type {
            MessageType::Text => {}
            MessageType::ToolUse(calls) | MessageType::ToolResult(calls) => {
                for call in calls.iter_mut() {
                    if call.function.arguments.trim().is_empty() {
                        continue;
                    }
                    let restored = self
                        .replacer
                        .restore(&call.function.arguments, thread)
                        .await?;
                    call.function.arguments = reparse_arguments(&restored)?;
                }
            }
        }
        Ok(message)
    }
}

/// Tool-call arguments must still be structured JSON after substitution; a
/// placeholder that broke the framing would otherwise reach the tool layer.
fn reparse_arguments(raw: &str) -> Result<String, ShroudError> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|err| {
        ShroudError::Integrity(format!(
            "tool-call arguments no longer parse after substitution: {err}"
        ))
    })?;
    Ok(value.to_string())
}

/// Reply handed back to callers using the [`ChatProvider`] surface.
#[derive(Debug)]
pub struct RestoredResponse {
    message: ChatMessage,
}

impl RestoredResponse {
    pub fn new(message: ChatMessage) -> Self {
        Self { message }
    }

    pub fn into_message(self) -> ChatMessage {
        self.message
    }
}

impl fmt::Display for RestoredResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message.content)
    }
}

impl ChatResponse for RestoredResponse {
    fn text(&self) -> Option<String> {
        Some(self.message.content.clone())
    }

    fn tool_calls(&self) -> Option<Vec<crate::ToolCall>> {
        self.message.tool_calls().map(<[crate::ToolCall]>::to_vec)
    }
}

#[async_trait]
impl ChatProvider for PrivacyChatModel {
    /// One-shot protected call: a throwaway thread, nothing persisted.
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[Tool]>,
    ) -> Result<Box<dyn ChatResponse>, ShroudError> {
        let restored = self
            .process_turn_with_tools(messages, None, tools)
            .await?;
        Ok(Box::new(RestoredResponse::new(restored)))
    }
}
