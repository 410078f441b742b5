use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use serde_json::json;

use super::{ConversationStore, EntityStore, StoreError, StoreStats};
use crate::chat::ChatMessage;
use crate::codec;
use crate::detect::canonical_label;
use crate::thread::ThreadId;

const CONTEXTS_KEY: &str = "ctxs";
const CONVERSATIONS_KEY: &str = "convs";

/// Bounded reconnect attempts before an operation surfaces as unavailable.
const RETRIES: usize = 3;

async fn manager(url: &str) -> Result<ConnectionManager, StoreError> {
    let client = redis::Client::open(url)?;
    let config = ConnectionManagerConfig::new().set_number_of_retries(RETRIES);
    Ok(ConnectionManager::new_with_config(client, config).await?)
}

/// `EntityStore` backed by a redis/valkey server.
///
/// Key schema, honoured verbatim for interoperability:
///
/// - `ctx:{thread}:rep:{placeholder}` -> JSON `{"text": ..., "label": ...}`
/// - `ctx:{thread}:reps`              -> set of placeholders
/// - `ctx:{thread}:tex2rep`           -> hash mapping original text to placeholder
/// - `ctx:{thread}:lc:{label}`        -> label counter
/// - `ctxs`                           -> set of all thread ids
///
/// Multi-key mutations run as atomic pipelines so observers never see
/// half-written state. Per-key TTLs are set on write and refreshed on read.
pub struct KvEntityStore {
    conn: ConnectionManager,
    ttl: i64,
}

impl KvEntityStore {
    pub async fn connect(url: &str, ttl_seconds: u64) -> Result<Self, StoreError> {
        Ok(Self {
            conn: manager(url).await?,
            ttl: ttl_seconds as i64,
        })
    }

    fn replacement_key(thread: ThreadId, placeholder: &str) -> String {
        format!("ctx:{thread}:rep:{placeholder}")
    }

    fn replacements_set_key(thread: ThreadId) -> String {
        format!("ctx:{thread}:reps")
    }

    fn text_to_replacement_key(thread: ThreadId) -> String {
        format!("ctx:{thread}:tex2rep")
    }

    fn label_counter_key(thread: ThreadId, label: &str) -> String {
        format!("ctx:{thread}:lc:{}", canonical_label(label))
    }

    async fn clear_thread(&self, thread: ThreadId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let placeholders: Vec<String> = conn
            .smembers(Self::replacements_set_key(thread))
            .await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for placeholder in &placeholders {
            pipe.del(Self::replacement_key(thread, placeholder)).ignore();
        }
        pipe.del(Self::replacements_set_key(thread))
            .ignore()
            .del(Self::text_to_replacement_key(thread))
            .ignore()
            .srem(CONTEXTS_KEY, thread.to_string())
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl EntityStore for KvEntityStore {
    async fn put(
        &self,
        thread: ThreadId,
        text: &str,
        label: &str,
        placeholder: &str,
    ) -> Result<(), StoreError> {
        let payload = json!({ "text": text, "label": label }).to_string();
        let rep_key = Self::replacement_key(thread, placeholder);
        let reps_key = Self::replacements_set_key(thread);
        let tex2rep_key = Self::text_to_replacement_key(thread);

        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .set(&rep_key, payload)
            .ignore()
            .sadd(&reps_key, placeholder)
            .ignore()
            .hset(&tex2rep_key, text, placeholder)
            .ignore()
            .sadd(CONTEXTS_KEY, thread.to_string())
            .ignore()
            .expire(&rep_key, self.ttl)
            .ignore()
            .expire(&reps_key, self.ttl)
            .ignore()
            .expire(&tex2rep_key, self.ttl)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_placeholder(
        &self,
        thread: ThreadId,
        text: &str,
    ) -> Result<Option<String>, StoreError> {
        let tex2rep_key = Self::text_to_replacement_key(thread);
        let mut conn = self.conn.clone();
        let (placeholder,): (Option<String>,) = redis::pipe()
            .hget(&tex2rep_key, text)
            .expire(&tex2rep_key, self.ttl)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(placeholder)
    }

    async fn get_original(
        &self,
        thread: ThreadId,
        placeholder: &str,
    ) -> Result<Option<(String, String)>, StoreError> {
        let rep_key = Self::replacement_key(thread, placeholder);
        let mut conn = self.conn.clone();
        let (data,): (Option<String>,) = redis::pipe()
            .get(&rep_key)
            .expire(&rep_key, self.ttl)
            .ignore()
            .query_async(&mut conn)
            .await?;
        match data {
            None => Ok(None),
            Some(raw) => {
                let parsed: serde_json::Value =
                    serde_json::from_str(&raw).map_err(|e| StoreError::Codec(e.to_string()))?;
                let text = parsed["text"].as_str().unwrap_or_default().to_string();
                let label = parsed["label"].as_str().unwrap_or_default().to_string();
                Ok(Some((text, label)))
            }
        }
    }

    async fn inc_label_counter(&self, thread: ThreadId, label: &str) -> Result<u64, StoreError> {
        let key = Self::label_counter_key(thread, label);
        let mut conn = self.conn.clone();
        let (value,): (u64,) = redis::pipe()
            .atomic()
            .incr(&key, 1)
            .expire(&key, self.ttl)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn list_placeholders(&self, thread: ThreadId) -> Result<Vec<String>, StoreError> {
        let reps_key = Self::replacements_set_key(thread);
        let mut conn = self.conn.clone();
        let (placeholders,): (Vec<String>,) = redis::pipe()
            .smembers(&reps_key)
            .expire(&reps_key, self.ttl)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(placeholders)
    }

    async fn exists(&self, thread: ThreadId, placeholder: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn
            .exists(Self::replacement_key(thread, placeholder))
            .await?)
    }

    async fn delete(&self, thread: ThreadId, placeholder: &str) -> Result<(), StoreError> {
        let rep_key = Self::replacement_key(thread, placeholder);
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(&rep_key).await?;
        let raw = data.ok_or_else(|| StoreError::NotFound(placeholder.to_string()))?;
        let parsed: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| StoreError::Codec(e.to_string()))?;
        let text = parsed["text"].as_str().unwrap_or_default().to_string();

        let _: () = redis::pipe()
            .atomic()
            .del(&rep_key)
            .ignore()
            .srem(Self::replacements_set_key(thread), placeholder)
            .ignore()
            .hdel(Self::text_to_replacement_key(thread), text)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn clear(&self, thread: ThreadId) -> Result<(), StoreError> {
        self.clear_thread(thread).await
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let contexts: Vec<String> = conn.smembers(CONTEXTS_KEY).await?;
        for raw in contexts {
            self.clear_thread(ThreadId::from_key(&raw)).await?;
        }
        let _: () = conn.del(CONTEXTS_KEY).await?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut conn = self.conn.clone();
        let contexts: Vec<String> = conn.smembers(CONTEXTS_KEY).await?;
        let mut entries = 0usize;
        for raw in &contexts {
            let count: usize = conn
                .scard(Self::replacements_set_key(ThreadId::from_key(raw)))
                .await?;
            entries += count;
        }
        Ok(StoreStats {
            contexts: contexts.len(),
            entries,
        })
    }
}

/// `ConversationStore` backed by a redis/valkey server.
///
/// - `conv:{thread}:messages` -> list of serialised messages, head = most recent
/// - `convs`                  -> set of threads with stored conversations
pub struct KvConversationStore {
    conn: ConnectionManager,
    ttl: i64,
}

impl KvConversationStore {
    pub async fn connect(url: &str, ttl_seconds: u64) -> Result<Self, StoreError> {
        Ok(Self {
            conn: manager(url).await?,
            ttl: ttl_seconds as i64,
        })
    }

    fn messages_key(thread: ThreadId) -> String {
        format!("conv:{thread}:messages")
    }
}

#[async_trait]
impl ConversationStore for KvConversationStore {
    async fn append(&self, thread: ThreadId, messages: &[ChatMessage]) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        let encoded: Vec<String> = messages
            .iter()
            .map(codec::encode)
            .collect::<Result<_, _>>()?;

        let key = Self::messages_key(thread);
        let mut conn = self.conn.clone();
        // LPUSH in batch order leaves the newest message at the head
        let _: () = redis::pipe()
            .atomic()
            .lpush(&key, encoded)
            .ignore()
            .sadd(CONVERSATIONS_KEY, thread.to_string())
            .ignore()
            .expire(&key, self.ttl)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn read(
        &self,
        thread: ThreadId,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let key = Self::messages_key(thread);
        let stop = limit.map_or(-1, |l| l as isize - 1);
        let mut conn = self.conn.clone();
        let (raw,): (Vec<String>,) = redis::pipe()
            .lrange(&key, 0, stop)
            .expire(&key, self.ttl)
            .ignore()
            .query_async(&mut conn)
            .await?;

        let mut messages = Vec::with_capacity(raw.len());
        for item in raw {
            match codec::decode(&item) {
                Ok(message) => messages.push(message),
                Err(err) => log::warn!("skipping undecodable stored message: {err}"),
            }
        }
        // stored newest-first; callers get chronological order
        messages.reverse();
        Ok(messages)
    }

    async fn clear(&self, thread: ThreadId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(Self::messages_key(thread))
            .ignore()
            .srem(CONVERSATIONS_KEY, thread.to_string())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn exists(&self, thread: ThreadId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(Self::messages_key(thread)).await?)
    }
}
