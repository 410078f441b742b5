use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ConversationStore, EntityStore, StoreError, StoreStats};
use crate::chat::ChatMessage;
use crate::detect::canonical_label;
use crate::thread::ThreadId;

#[derive(Default)]
struct ThreadEntities {
    by_text: HashMap<String, String>,
    by_placeholder: HashMap<String, (String, String)>,
    counters: HashMap<String, u64>,
}

/// An in-memory implementation of the `EntityStore` trait.
///
/// The default backend for tests and single-process deployments; state dies
/// with the process.
pub struct InMemoryEntityStore {
    threads: Mutex<HashMap<Uuid, ThreadEntities>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn put(
        &self,
        thread: ThreadId,
        text: &str,
        label: &str,
        placeholder: &str,
    ) -> Result<(), StoreError> {
        let mut threads = self.threads.lock().await;
        let entry = threads.entry(thread.uuid()).or_default();

        // bijection guard: a triple may be re-put verbatim, but neither side
        // may be rebound to a different partner
        if let Some(existing) = entry.by_text.get(text) {
            if existing != placeholder {
                return Err(StoreError::Integrity(format!(
                    "text already mapped to `{existing}`, refusing rebind to `{placeholder}`"
                )));
            }
        }
        if let Some((existing_text, _)) = entry.by_placeholder.get(placeholder) {
            if existing_text != text {
                return Err(StoreError::Integrity(format!(
                    "placeholder `{placeholder}` already bound to a different original"
                )));
            }
        }

        entry
            .by_text
            .insert(text.to_string(), placeholder.to_string());
        entry.by_placeholder.insert(
            placeholder.to_string(),
            (text.to_string(), label.to_string()),
        );
        Ok(())
    }

    async fn get_placeholder(
        &self,
        thread: ThreadId,
        text: &str,
    ) -> Result<Option<String>, StoreError> {
        let threads = self.threads.lock().await;
        Ok(threads
            .get(&thread.uuid())
            .and_then(|entry| entry.by_text.get(text).cloned()))
    }

    async fn get_original(
        &self,
        thread: ThreadId,
        placeholder: &str,
    ) -> Result<Option<(String, String)>, StoreError> {
        let threads = self.threads.lock().await;
        Ok(threads
            .get(&thread.uuid())
            .and_then(|entry| entry.by_placeholder.get(placeholder).cloned()))
    }

    async fn inc_label_counter(&self, thread: ThreadId, label: &str) -> Result<u64, StoreError> {
        let mut threads = self.threads.lock().await;
        let entry = threads.entry(thread.uuid()).or_default();
        let counter = entry.counters.entry(canonical_label(label)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn list_placeholders(&self, thread: ThreadId) -> Result<Vec<String>, StoreError> {
        let threads = self.threads.lock().await;
        Ok(threads
            .get(&thread.uuid())
            .map(|entry| entry.by_placeholder.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn exists(&self, thread: ThreadId, placeholder: &str) -> Result<bool, StoreError> {
        let threads = self.threads.lock().await;
        Ok(threads
            .get(&thread.uuid())
            .is_some_and(|entry| entry.by_placeholder.contains_key(placeholder)))
    }

    async fn delete(&self, thread: ThreadId, placeholder: &str) -> Result<(), StoreError> {
        let mut threads = self.threads.lock().await;
        let entry = threads
            .get_mut(&thread.uuid())
            .ok_or_else(|| StoreError::NotFound(placeholder.to_string()))?;
        let (text, _label) = entry
            .by_placeholder
            .remove(placeholder)
            .ok_or_else(|| StoreError::NotFound(placeholder.to_string()))?;
        entry.by_text.remove(&text);
        Ok(())
    }

    async fn clear(&self, thread: ThreadId) -> Result<(), StoreError> {
        let mut threads = self.threads.lock().await;
        threads.remove(&thread.uuid());
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let mut threads = self.threads.lock().await;
        threads.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let threads = self.threads.lock().await;
        Ok(StoreStats {
            contexts: threads.len(),
            entries: threads
                .values()
                .map(|entry| entry.by_placeholder.len())
                .sum(),
        })
    }
}

/// An in-memory implementation of the `ConversationStore` trait.
pub struct InMemoryConversationStore {
    threads: Mutex<HashMap<Uuid, Vec<ChatMessage>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(&self, thread: ThreadId, messages: &[ChatMessage]) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut threads = self.threads.lock().await;
        threads
            .entry(thread.uuid())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn read(
        &self,
        thread: ThreadId,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let threads = self.threads.lock().await;
        let stored = match threads.get(&thread.uuid()) {
            Some(messages) => messages,
            None => return Ok(Vec::new()),
        };
        let skip = limit.map_or(0, |l| stored.len().saturating_sub(l));
        Ok(stored[skip..].to_vec())
    }

    async fn clear(&self, thread: ThreadId) -> Result<(), StoreError> {
        let mut threads = self.threads.lock().await;
        threads.remove(&thread.uuid());
        Ok(())
    }

    async fn exists(&self, thread: ThreadId) -> Result<bool, StoreError> {
        let threads = self.threads.lock().await;
        Ok(threads
            .get(&thread.uuid())
            .is_some_and(|messages| !messages.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn both_lookup_directions_see_a_put() {
        let store = InMemoryEntityStore::new();
        let thread = ThreadId::from_key("t1");
        store
            .put(thread, "Alice", "person", "[PERSON_01]")
            .await
            .unwrap();
        assert_eq!(
            store.get_placeholder(thread, "Alice").await.unwrap(),
            Some("[PERSON_01]".to_string())
        );
        assert_eq!(
            store.get_original(thread, "[PERSON_01]").await.unwrap(),
            Some(("Alice".to_string(), "person".to_string()))
        );
    }

    #[tokio::test]
    async fn rebinding_either_side_is_rejected() {
        let store = InMemoryEntityStore::new();
        let thread = ThreadId::from_key("t1");
        store
            .put(thread, "Alice", "person", "[PERSON_01]")
            .await
            .unwrap();
        // idempotent re-put is fine
        store
            .put(thread, "Alice", "person", "[PERSON_01]")
            .await
            .unwrap();
        assert!(
            store
                .put(thread, "Alice", "person", "[PERSON_02]")
                .await
                .is_err()
        );
        assert!(
            store
                .put(thread, "Bob", "person", "[PERSON_01]")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn counters_are_monotonic_and_label_scoped() {
        let store = InMemoryEntityStore::new();
        let thread = ThreadId::from_key("t1");
        assert_eq!(store.inc_label_counter(thread, "person").await.unwrap(), 1);
        assert_eq!(store.inc_label_counter(thread, "person").await.unwrap(), 2);
        assert_eq!(store.inc_label_counter(thread, "PERSON").await.unwrap(), 3);
        assert_eq!(store.inc_label_counter(thread, "iban").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn threads_do_not_share_mappings() {
        let store = InMemoryEntityStore::new();
        let t1 = ThreadId::from_key("t1");
        let t2 = ThreadId::from_key("t2");
        store.put(t1, "Alice", "person", "[PERSON_01]").await.unwrap();
        assert_eq!(store.get_placeholder(t2, "Alice").await.unwrap(), None);
        assert!(store.list_placeholders(t2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_both_directions() {
        let store = InMemoryEntityStore::new();
        let thread = ThreadId::from_key("t1");
        store
            .put(thread, "Alice", "person", "[PERSON_01]")
            .await
            .unwrap();
        store.delete(thread, "[PERSON_01]").await.unwrap();
        assert_eq!(store.get_placeholder(thread, "Alice").await.unwrap(), None);
        assert!(matches!(
            store.delete(thread, "[PERSON_01]").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn conversation_read_honours_limit_in_chronological_order() {
        let store = InMemoryConversationStore::new();
        let thread = ThreadId::from_key("t1");
        let messages: Vec<ChatMessage> = (0..5)
            .map(|i| ChatMessage::user().content(format!("m{i}")).build())
            .collect();
        store.append(thread, &messages).await.unwrap();

        let all = store.read(thread, None).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].content, "m0");

        let last_two = store.read(thread, Some(2)).await.unwrap();
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].content, "m3");
        assert_eq!(last_two[1].content, "m4");
    }

    #[tokio::test]
    async fn conversation_exists_and_clear() {
        let store = InMemoryConversationStore::new();
        let thread = ThreadId::from_key("t1");
        assert!(!store.exists(thread).await.unwrap());
        store
            .append(thread, &[ChatMessage::user().content("hi").build()])
            .await
            .unwrap();
        assert!(store.exists(thread).await.unwrap());
        store.clear(thread).await.unwrap();
        assert!(!store.exists(thread).await.unwrap());
    }
}
