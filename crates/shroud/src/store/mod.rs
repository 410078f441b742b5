use async_trait::async_trait;

use crate::chat::ChatMessage;
use crate::thread::ThreadId;

mod encryption;
mod kv;
mod memory;

pub use encryption::EncryptionEntityStore;
pub use kv::{KvConversationStore, KvEntityStore};
pub use memory::{InMemoryConversationStore, InMemoryEntityStore};

/// An error type for storage backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Unavailable(String),
    #[error("serialization error: {0}")]
    Codec(String),
    #[error("mapping integrity violation: {0}")]
    Integrity(String),
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Aggregate counts over everything a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of threads with at least one entry.
    pub contexts: usize,
    /// Total mapping entries across all threads.
    pub entries: usize,
}

/// Thread-scoped two-way map between original entity text and placeholders,
/// plus per-label counters.
///
/// The mapping is bijective within a thread: no two originals share a
/// placeholder and no two placeholders share an original. `put` is atomic
/// with respect to concurrent operations on the same thread: once it
/// returns, both lookup directions observe the entry.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Records the (original, label, placeholder) triple.
    async fn put(
        &self,
        thread: ThreadId,
        text: &str,
        label: &str,
        placeholder: &str,
    ) -> Result<(), StoreError>;

    /// Reverse lookup used during replacement.
    async fn get_placeholder(
        &self,
        thread: ThreadId,
        text: &str,
    ) -> Result<Option<String>, StoreError>;

    /// Forward lookup used during restoration; yields `(original, label)`.
    async fn get_original(
        &self,
        thread: ThreadId,
        placeholder: &str,
    ) -> Result<Option<(String, String)>, StoreError>;

    /// Atomic read-modify-write; returns the new value. Strictly monotonic
    /// per (thread, canonical label), starting at 1.
    async fn inc_label_counter(&self, thread: ThreadId, label: &str) -> Result<u64, StoreError>;

    /// All placeholders recorded for this thread.
    async fn list_placeholders(&self, thread: ThreadId) -> Result<Vec<String>, StoreError>;

    async fn exists(&self, thread: ThreadId, placeholder: &str) -> Result<bool, StoreError>;

    /// Removes one mapping; `NotFound` if the placeholder is unknown.
    async fn delete(&self, thread: ThreadId, placeholder: &str) -> Result<(), StoreError>;

    /// Drops all mappings for one thread.
    async fn clear(&self, thread: ThreadId) -> Result<(), StoreError>;

    /// Drops all mappings for every thread.
    async fn clear_all(&self) -> Result<(), StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// Append-only log of already-redacted messages per thread.
///
/// Only holds messages *after* replacement; it is the authority for what the
/// wrapped model has already seen, which is what makes per-turn processing
/// incremental.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Appends a batch in order, atomically.
    async fn append(&self, thread: ThreadId, messages: &[ChatMessage]) -> Result<(), StoreError>;

    /// Reads messages in chronological order. With `limit`, returns the most
    /// recent `limit` messages, still chronologically.
    async fn read(
        &self,
        thread: ThreadId,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    async fn clear(&self, thread: ThreadId) -> Result<(), StoreError>;

    async fn exists(&self, thread: ThreadId) -> Result<bool, StoreError>;
}
