use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ShroudError;

mod regex;
mod remote;

pub use regex::RegexDetector;
pub use remote::RemoteDetector;

/// Threshold applied when neither the caller nor the detector configuration
/// supplies one.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// A detected span within a single text blob.
///
/// Offsets are byte offsets, half-open, into the source string. The replacer
/// verifies `source[start..end] == text` before splicing, so a detector
/// emitting code-point offsets fails loudly instead of corrupting output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Short tag from the detector's vocabulary, e.g. `person` or `iban`.
    /// Compared case- and separator-insensitively, see [`canonical_label`].
    #[serde(alias = "type")]
    pub label: String,
    /// Confidence in [0, 1]; the detector discards entities below threshold.
    pub score: f32,
}

impl Entity {
    pub fn new(start: usize, end: usize, text: &str, label: &str, score: f32) -> Self {
        Self {
            start,
            end,
            text: text.to_string(),
            label: label.to_string(),
            score,
        }
    }
}

/// Canonical form of an entity label: lowercase, every run of
/// non-alphanumerics folded to a single `_`.
///
/// `phone number`, `phone_number` and `Phone-Number` all canonicalise to
/// `phone_number` and therefore share counters and placeholder families.
pub fn canonical_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut pending_sep = false;
    for c in label.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Identifies labelled entity spans in text.
///
/// `detect` is a pure function of its input: the nth output list corresponds
/// to the nth input text. Ordering within a list is stable but unspecified;
/// consumers must not rely on it beyond the non-overlap guarantee.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Entity labels this detector can emit.
    fn supported_entities(&self) -> &[String];

    /// Threshold used when the caller passes `None`.
    fn default_threshold(&self) -> f32 {
        DEFAULT_THRESHOLD
    }

    /// Detects entities in each text. Spans within one result list are
    /// non-overlapping.
    async fn detect(
        &self,
        texts: &[String],
        threshold: Option<f32>,
    ) -> Result<Vec<Vec<Entity>>, ShroudError>;
}

/// Input validation shared by detector implementations: every text must be
/// non-empty after trimming.
pub fn validate_texts(texts: &[String]) -> Result<(), ShroudError> {
    for (index, text) in texts.iter().enumerate() {
        if text.trim().is_empty() {
            return Err(ShroudError::InvalidInput(format!(
                "input text at index {index} must not be empty"
            )));
        }
    }
    Ok(())
}

/// Sorts spans by start offset (longer span wins on ties) and drops any that
/// overlap an already-kept span. Detector implementations use this to uphold
/// the non-overlap guarantee when independent patterns both match.
pub(crate) fn sort_and_drop_overlaps(mut entities: Vec<Entity>) -> Vec<Entity> {
    entities.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    let mut kept: Vec<Entity> = Vec::with_capacity(entities.len());
    for entity in entities {
        match kept.last() {
            Some(prev) if entity.start < prev.end => {
                log::debug!(
                    "dropping overlapping span {}..{} ({})",
                    entity.start,
                    entity.end,
                    entity.label
                );
            }
            _ => kept.push(entity),
        }
    }
    kept
}
