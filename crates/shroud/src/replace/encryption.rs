use std::sync::Arc;

use async_trait::async_trait;

use super::{LabelSet, Replacer};
use crate::detect::Entity;
use crate::error::ShroudError;
use crate::store::EntityStore;
use crate::thread::ThreadId;

/// Strategy paired with the encryption-native entity store.
///
/// The store's `get_placeholder` always yields (it encrypts the original
/// under a thread-derived key), so the shared replace pipeline never reaches
/// `create_placeholder`. Reaching it anyway means the replacer was wired to
/// a non-encryption store, which is a configuration error.
pub struct EncryptionReplacer {
    store: Arc<dyn EntityStore>,
    labels: LabelSet,
}

impl EncryptionReplacer {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            labels: LabelSet::Any,
        }
    }
}

#[async_trait]
impl Replacer for EncryptionReplacer {
    fn entity_store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    fn supported_labels(&self) -> &LabelSet {
        &self.labels
    }

    async fn create_placeholder(
        &self,
        _entity: &Entity,
        _thread: ThreadId,
    ) -> Result<String, ShroudError> {
        Err(ShroudError::Configuration(
            "encryption replacer requires the encryption entity store".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EncryptionEntityStore, InMemoryEntityStore};

    #[tokio::test]
    async fn roundtrips_through_the_encryption_store() {
        let store: Arc<dyn EntityStore> = Arc::new(EncryptionEntityStore::new());
        let r = EncryptionReplacer::new(store);
        let thread = ThreadId::from_key("t1");
        let text = "Alice pays rent";
        let entities = vec![Entity::new(0, 5, "Alice", "person", 0.9)];

        let redacted = r.replace(text, &entities, thread).await.unwrap();
        assert!(!redacted.contains("Alice"));
        let restored = r.restore(&redacted, thread).await.unwrap();
        assert_eq!(restored, text);
    }

    #[tokio::test]
    async fn wiring_to_a_mapping_store_fails_cleanly() {
        let store: Arc<dyn EntityStore> = Arc::new(InMemoryEntityStore::new());
        let r = EncryptionReplacer::new(store);
        let thread = ThreadId::from_key("t1");
        let entities = vec![Entity::new(0, 5, "Alice", "person", 0.9)];
        let err = r.replace("Alice pays", &entities, thread).await.unwrap_err();
        assert_eq!(err.code(), "configuration_error");
    }
}
