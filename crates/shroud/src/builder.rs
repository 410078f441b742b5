//! Builder module for wiring the privacy pipeline.
//!
//! Components are passed in explicitly and wired at start-up; there are no
//! module-level singletons. [`ShroudBuilder::from_config`] constructs the
//! concrete backends a [`crate::config::ShroudConfig`] names, including the
//! remote detector probe and the KV connections.

use std::sync::Arc;
use std::time::Duration;

use crate::chat::ChatProvider;
use crate::config::{
    ConversationStoreBackend, DetectorBackend, EntityStoreBackend, ReplacerStrategy, ShroudConfig,
};
use crate::detect::{Detector, RegexDetector, RemoteDetector};
use crate::error::ShroudError;
use crate::replace::{
    EncryptionReplacer, HashReplacer, Locale, PlaceholderReplacer, PseudonymReplacer, Replacer,
};
use crate::store::{
    ConversationStore, EncryptionEntityStore, EntityStore, InMemoryConversationStore,
    InMemoryEntityStore, KvConversationStore, KvEntityStore,
};
use crate::wrapper::PrivacyChatModel;

/// Fluent wiring of detector, replacer, stores and the wrapped backend.
#[derive(Default)]
pub struct ShroudBuilder {
    model: Option<Arc<dyn ChatProvider>>,
    detector: Option<Arc<dyn Detector>>,
    replacer: Option<Arc<dyn Replacer>>,
    conversations: Option<Arc<dyn ConversationStore>>,
}

impl ShroudBuilder {
    /// Creates a new empty builder instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chat backend to protect.
    pub fn model(mut self, model: Arc<dyn ChatProvider>) -> Self {
        self.model = Some(model);
        self
    }

    /// Sets the entity detector.
    pub fn detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Sets the replacement strategy (which carries its entity store).
    pub fn replacer(mut self, replacer: Arc<dyn Replacer>) -> Self {
        self.replacer = Some(replacer);
        self
    }

    /// Sets the conversation store enabling incremental multi-turn
    /// processing. Without one, every turn re-redacts the full history and
    /// nothing is persisted.
    pub fn conversation_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.conversations = Some(store);
        self
    }

    /// Builds the wired privacy wrapper.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the model, detector or replacer is
    /// missing.
    pub fn build(self) -> Result<PrivacyChatModel, ShroudError> {
        let model = self
            .model
            .ok_or_else(|| ShroudError::Configuration("no chat backend specified".to_string()))?;
        let detector = self
            .detector
            .ok_or_else(|| ShroudError::Configuration("no detector specified".to_string()))?;
        let replacer = self
            .replacer
            .ok_or_else(|| ShroudError::Configuration("no replacer specified".to_string()))?;
        Ok(PrivacyChatModel::new(
            model,
            detector,
            replacer,
            self.conversations,
        ))
    }

    /// Constructs the backends named by `config` and wires them around
    /// `model`.
    pub async fn from_config(
        config: &ShroudConfig,
        model: Arc<dyn ChatProvider>,
    ) -> Result<PrivacyChatModel, ShroudError> {
        config.validate()?;
        let entity_store = entity_store_from_config(config).await?;
        ShroudBuilder::new()
            .model(model)
            .detector(detector_from_config(config).await?)
            .replacer(replacer_from_config(config, entity_store)?)
            .conversation_store(conversation_store_from_config(config).await?)
            .build()
    }
}

/// Entity store backend named by the config.
pub async fn entity_store_from_config(
    config: &ShroudConfig,
) -> Result<Arc<dyn EntityStore>, ShroudError> {
    Ok(match config.entity_store.backend {
        EntityStoreBackend::Kv => {
            Arc::new(KvEntityStore::connect(&config.kv.url(), config.ttl.seconds).await?)
        }
        EntityStoreBackend::Memory => Arc::new(InMemoryEntityStore::new()),
        EntityStoreBackend::Encryption => Arc::new(EncryptionEntityStore::new()),
    })
}

/// Detector backend named by the config; probing the remote service when
/// that backend is selected.
pub async fn detector_from_config(
    config: &ShroudConfig,
) -> Result<Arc<dyn Detector>, ShroudError> {
    Ok(match config.detector.backend {
        DetectorBackend::Remote => Arc::new(
            RemoteDetector::connect(
                &config.detector.base_url,
                config.detector.api_key.clone(),
                config.detector.entities.clone(),
                Duration::from_secs(config.detector.timeout_seconds),
            )
            .await?,
        ),
        DetectorBackend::Regex => Arc::new(RegexDetector::new()),
    })
}

/// Replacement strategy named by the config, wired to `entity_store`.
pub fn replacer_from_config(
    config: &ShroudConfig,
    entity_store: Arc<dyn EntityStore>,
) -> Result<Arc<dyn Replacer>, ShroudError> {
    Ok(match config.replacer.strategy {
        ReplacerStrategy::Placeholder => Arc::new(PlaceholderReplacer::new(entity_store)),
        ReplacerStrategy::Pseudonym => {
            let locale = Locale::parse(&config.pseudonym.locale)?;
            Arc::new(PseudonymReplacer::new(entity_store, locale))
        }
        ReplacerStrategy::Hash => Arc::new(HashReplacer::new(entity_store)),
        ReplacerStrategy::Encryption => Arc::new(EncryptionReplacer::new(entity_store)),
    })
}

/// Conversation store backend named by the config.
pub async fn conversation_store_from_config(
    config: &ShroudConfig,
) -> Result<Arc<dyn ConversationStore>, ShroudError> {
    Ok(match config.conversation_store.backend {
        ConversationStoreBackend::Kv => {
            Arc::new(KvConversationStore::connect(&config.kv.url(), config.ttl.seconds).await?)
        }
        ConversationStoreBackend::Memory => Arc::new(InMemoryConversationStore::new()),
    })
}
