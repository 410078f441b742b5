use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{LabelSet, Replacer};
use crate::detect::Entity;
use crate::error::ShroudError;
use crate::store::EntityStore;
use crate::thread::ThreadId;

/// Strategy that replaces entities with a stable digest of the original.
///
/// The placeholder is `0x` plus the first 128 bits of
/// `SHA-256(original ‖ thread)` in hex: stable across restarts, independent
/// between threads, and carrying no category information.
pub struct HashReplacer {
    store: Arc<dyn EntityStore>,
    labels: LabelSet,
}

impl HashReplacer {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            labels: LabelSet::Any,
        }
    }
}

#[async_trait]
impl Replacer for HashReplacer {
    fn entity_store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    fn supported_labels(&self) -> &LabelSet {
        &self.labels
    }

    async fn create_placeholder(
        &self,
        entity: &Entity,
        thread: ThreadId,
    ) -> Result<String, ShroudError> {
        let mut hasher = Sha256::new();
        hasher.update(entity.text.as_bytes());
        hasher.update(thread.as_bytes());
        let digest = hasher.finalize();
        Ok(format!("0x{}", hex::encode(&digest[..16])))
    }
}
