use std::collections::HashMap;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{EntityStore, StoreError, StoreStats};
use crate::thread::ThreadId;

const KEY_CONTEXT: &[u8] = b"shroud.entity.key.v1";
const NONCE_CONTEXT: &[u8] = b"shroud.entity.nonce.v1";
const NONCE_LEN: usize = 12;

/// Encryption-native entity store: nothing persistent, the "placeholder" IS
/// the ciphertext.
///
/// `get_placeholder` encrypts the original under a key derived from the
/// thread id (AES-256-GCM) and never misses, so the replace pipeline records
/// no mapping; restoration is decryption. The placeholder is
/// base64(nonce ‖ ciphertext) with the nonce derived from (thread,
/// plaintext), which keeps the placeholder for a given original stable
/// within a thread; nonce reuse can only occur for an identical
/// (key, plaintext) pair, where it reproduces the identical ciphertext.
///
/// Emitted placeholders are remembered per thread so `list_placeholders`
/// can drive restoration; counters and the usual mapping writes are
/// unsupported and fail cleanly.
pub struct EncryptionEntityStore {
    emitted: Mutex<HashMap<Uuid, Vec<String>>>,
}

impl EncryptionEntityStore {
    pub fn new() -> Self {
        Self {
            emitted: Mutex::new(HashMap::new()),
        }
    }

    fn cipher_for(thread: ThreadId) -> Aes256Gcm {
        let mut hasher = Sha256::new();
        hasher.update(KEY_CONTEXT);
        hasher.update(thread.as_bytes());
        let key: [u8; 32] = hasher.finalize().into();
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key))
    }

    fn nonce_for(thread: ThreadId, plaintext: &str) -> [u8; NONCE_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(NONCE_CONTEXT);
        hasher.update(thread.as_bytes());
        hasher.update(plaintext.as_bytes());
        let digest = hasher.finalize();
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest[..NONCE_LEN]);
        nonce
    }

    fn encrypt(thread: ThreadId, plaintext: &str) -> Result<String, StoreError> {
        let nonce = Self::nonce_for(thread, plaintext);
        let ciphertext = Self::cipher_for(thread)
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| StoreError::Unavailable("encryption failure".to_string()))?;
        let mut framed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        framed.extend_from_slice(&nonce);
        framed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(framed))
    }

    /// `None` for anything that is not one of this thread's placeholders.
    fn decrypt(thread: ThreadId, placeholder: &str) -> Option<String> {
        let framed = URL_SAFE_NO_PAD.decode(placeholder).ok()?;
        if framed.len() <= NONCE_LEN {
            return None;
        }
        let (nonce, ciphertext) = framed.split_at(NONCE_LEN);
        let plaintext = Self::cipher_for(thread)
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .ok()?;
        String::from_utf8(plaintext).ok()
    }
}

impl Default for EncryptionEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for EncryptionEntityStore {
    async fn put(
        &self,
        _thread: ThreadId,
        _text: &str,
        _label: &str,
        _placeholder: &str,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("put"))
    }

    async fn get_placeholder(
        &self,
        thread: ThreadId,
        text: &str,
    ) -> Result<Option<String>, StoreError> {
        let placeholder = Self::encrypt(thread, text)?;
        let mut emitted = self.emitted.lock().await;
        let list = emitted.entry(thread.uuid()).or_default();
        if !list.contains(&placeholder) {
            list.push(placeholder.clone());
        }
        Ok(Some(placeholder))
    }

    async fn get_original(
        &self,
        thread: ThreadId,
        placeholder: &str,
    ) -> Result<Option<(String, String)>, StoreError> {
        Ok(Self::decrypt(thread, placeholder).map(|text| (text, "unknown".to_string())))
    }

    async fn inc_label_counter(&self, _thread: ThreadId, _label: &str) -> Result<u64, StoreError> {
        Err(StoreError::Unsupported("inc_label_counter"))
    }

    async fn list_placeholders(&self, thread: ThreadId) -> Result<Vec<String>, StoreError> {
        let emitted = self.emitted.lock().await;
        Ok(emitted.get(&thread.uuid()).cloned().unwrap_or_default())
    }

    async fn exists(&self, thread: ThreadId, placeholder: &str) -> Result<bool, StoreError> {
        let emitted = self.emitted.lock().await;
        Ok(emitted
            .get(&thread.uuid())
            .is_some_and(|list| list.iter().any(|p| p == placeholder)))
    }

    async fn delete(&self, thread: ThreadId, placeholder: &str) -> Result<(), StoreError> {
        let mut emitted = self.emitted.lock().await;
        let list = emitted
            .get_mut(&thread.uuid())
            .ok_or_else(|| StoreError::NotFound(placeholder.to_string()))?;
        let index = list
            .iter()
            .position(|p| p == placeholder)
            .ok_or_else(|| StoreError::NotFound(placeholder.to_string()))?;
        list.remove(index);
        Ok(())
    }

    async fn clear(&self, thread: ThreadId) -> Result<(), StoreError> {
        let mut emitted = self.emitted.lock().await;
        emitted.remove(&thread.uuid());
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        let mut emitted = self.emitted.lock().await;
        emitted.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let emitted = self.emitted.lock().await;
        Ok(StoreStats {
            contexts: emitted.len(),
            entries: emitted.values().map(Vec::len).sum(),
        })
    }
}
