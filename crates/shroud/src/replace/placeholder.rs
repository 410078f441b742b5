use std::sync::Arc;

use async_trait::async_trait;
use heck::ToShoutySnakeCase;

use super::{LabelSet, Replacer};
use crate::detect::Entity;
use crate::error::ShroudError;
use crate::store::EntityStore;
use crate::thread::ThreadId;

/// The default strategy: numbered placeholders like `[PERSON_01]`.
///
/// The label is shouty-snake-cased and the number comes from the store's
/// per-(thread, label) counter, zero-padded to two digits. Labels that only
/// differ in case or separators (`phone number` vs `phone_number`) fold into
/// one placeholder family and share a counter.
pub struct PlaceholderReplacer {
    store: Arc<dyn EntityStore>,
    labels: LabelSet,
}

impl PlaceholderReplacer {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            labels: LabelSet::Any,
        }
    }
}

#[async_trait]
impl Replacer for PlaceholderReplacer {
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
        let counter = self.store.inc_label_counter(thread, &entity.label).await?;
        Ok(format!(
            "[{}_{:02}]",
            entity.label.to_shouty_snake_case(),
            counter
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryEntityStore;

    fn replacer() -> PlaceholderReplacer {
        PlaceholderReplacer::new(Arc::new(InMemoryEntityStore::new()))
    }

    #[tokio::test]
    async fn counters_run_per_label() {
        let r = replacer();
        let thread = ThreadId::from_key("t1");
        let a = r
            .create_placeholder(&Entity::new(0, 1, "a", "person", 1.0), thread)
            .await
            .unwrap();
        let b = r
            .create_placeholder(&Entity::new(0, 1, "b", "person", 1.0), thread)
            .await
            .unwrap();
        let c = r
            .create_placeholder(&Entity::new(0, 1, "c", "iban", 1.0), thread)
            .await
            .unwrap();
        assert_eq!(a, "[PERSON_01]");
        assert_eq!(b, "[PERSON_02]");
        assert_eq!(c, "[IBAN_01]");
    }

    #[tokio::test]
    async fn spaced_and_snake_labels_share_a_family() {
        let r = replacer();
        let thread = ThreadId::from_key("t1");
        let a = r
            .create_placeholder(&Entity::new(0, 1, "a", "phone number", 1.0), thread)
            .await
            .unwrap();
        let b = r
            .create_placeholder(&Entity::new(0, 1, "b", "phone_number", 1.0), thread)
            .await
            .unwrap();
        assert_eq!(a, "[PHONE_NUMBER_01]");
        assert_eq!(b, "[PHONE_NUMBER_02]");
    }

    #[tokio::test]
    async fn counters_are_scoped_per_thread() {
        let r = replacer();
        let a = r
            .create_placeholder(
                &Entity::new(0, 1, "a", "person", 1.0),
                ThreadId::from_key("t1"),
            )
            .await
            .unwrap();
        let b = r
            .create_placeholder(
                &Entity::new(0, 1, "b", "person", 1.0),
                ThreadId::from_key("t2"),
            )
            .await
            .unwrap();
        assert_eq!(a, "[PERSON_01]");
        assert_eq!(b, "[PERSON_01]");
    }
}
