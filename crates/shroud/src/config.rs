use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::ShroudError;

/// Top-level configuration, loadable from TOML or JSON. Every field has a
/// default, so an empty file (or no file) yields a working setup pointed at
/// local services.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShroudConfig {
    pub detector: DetectorConfig,
    pub replacer: ReplacerConfig,
    pub entity_store: EntityStoreConfig,
    pub conversation_store: ConversationStoreConfig,
    pub kv: KvConfig,
    pub ttl: TtlConfig,
    pub pseudonym: PseudonymConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    Remote,
    Regex,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub backend: DetectorBackend,
    pub threshold: f32,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Restricts the remote detector to these labels instead of its
    /// advertised default entity set.
    pub entities: Option<Vec<String>>,
    pub timeout_seconds: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Remote,
            threshold: crate::detect::DEFAULT_THRESHOLD,
            base_url: "http://localhost:8081".to_string(),
            api_key: None,
            entities: None,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacerStrategy {
    Placeholder,
    Pseudonym,
    Hash,
    Encryption,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplacerConfig {
    pub strategy: ReplacerStrategy,
}

impl Default for ReplacerConfig {
    fn default() -> Self {
        Self {
            strategy: ReplacerStrategy::Placeholder,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStoreBackend {
    Kv,
    Memory,
    Encryption,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntityStoreConfig {
    pub backend: EntityStoreBackend,
}

impl Default for EntityStoreConfig {
    fn default() -> Self {
        Self {
            backend: EntityStoreBackend::Kv,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStoreBackend {
    Kv,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConversationStoreConfig {
    pub backend: ConversationStoreBackend,
}

impl Default for ConversationStoreConfig {
    fn default() -> Self {
        Self {
            backend: ConversationStoreBackend::Kv,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
        }
    }
}

impl KvConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    /// Mapping and conversation keys expire after this many seconds of
    /// inactivity; reads refresh the clock.
    pub seconds: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self { seconds: 3600 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PseudonymConfig {
    pub locale: String,
}

impl Default for PseudonymConfig {
    fn default() -> Self {
        Self {
            locale: "de".to_string(),
        }
    }
}

impl ShroudConfig {
    /// Loads configuration from a TOML or JSON file, picked by extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ShroudError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| {
            ShroudError::Configuration(format!(
                "failed to read config file at {}: {err}",
                path.display()
            ))
        })?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "toml" => toml::from_str(&content)
                .map_err(|err| ShroudError::Configuration(err.to_string())),
            "json" => serde_json::from_str(&content)
                .map_err(|err| ShroudError::Configuration(err.to_string())),
            other => Err(ShroudError::Configuration(format!(
                "unsupported config format: `{other}`"
            ))),
        }
    }

    /// The encryption strategy and the encryption store only work as a pair;
    /// every other combination of choices is free.
    pub fn validate(&self) -> Result<(), ShroudError> {
        let enc_replacer = self.replacer.strategy == ReplacerStrategy::Encryption;
        let enc_store = self.entity_store.backend == EntityStoreBackend::Encryption;
        if enc_replacer != enc_store {
            return Err(ShroudError::Configuration(
                "the encryption replacer and the encryption entity store require each other"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = ShroudConfig::default();
        assert_eq!(cfg.detector.backend, DetectorBackend::Remote);
        assert!((cfg.detector.threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(cfg.replacer.strategy, ReplacerStrategy::Placeholder);
        assert_eq!(cfg.entity_store.backend, EntityStoreBackend::Kv);
        assert_eq!(cfg.kv.host, "localhost");
        assert_eq!(cfg.kv.port, 6379);
        assert_eq!(cfg.kv.db, 0);
        assert_eq!(cfg.ttl.seconds, 3600);
        assert_eq!(cfg.kv.url(), "redis://localhost:6379/0");
    }

    #[test]
    fn partial_toml_overlays_defaults() {
        let cfg: ShroudConfig = toml::from_str(
            r#"
            [detector]
            backend = "regex"

            [replacer]
            strategy = "hash"

            [kv]
            port = 6380
        "#,
        )
        .unwrap();
        assert_eq!(cfg.detector.backend, DetectorBackend::Regex);
        assert_eq!(cfg.replacer.strategy, ReplacerStrategy::Hash);
        assert_eq!(cfg.kv.port, 6380);
        assert_eq!(cfg.ttl.seconds, 3600);
    }

    #[test]
    fn encryption_pairing_is_enforced_both_ways() {
        let mut cfg = ShroudConfig::default();
        cfg.replacer.strategy = ReplacerStrategy::Encryption;
        assert!(cfg.validate().is_err());

        cfg.replacer.strategy = ReplacerStrategy::Placeholder;
        cfg.entity_store.backend = EntityStoreBackend::Encryption;
        assert!(cfg.validate().is_err());

        cfg.replacer.strategy = ReplacerStrategy::Encryption;
        assert!(cfg.validate().is_ok());
    }
}
