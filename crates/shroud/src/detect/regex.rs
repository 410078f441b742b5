use async_trait::async_trait;
use regex::Regex;

use super::{Detector, Entity, sort_and_drop_overlaps, validate_texts};
use crate::error::ShroudError;

/// Pattern-based detector for machine-readable identifiers.
///
/// Runs entirely in-process and needs no model; useful as a fallback backend
/// and for tests. Scores are always 1.0 and the threshold is ignored.
pub struct RegexDetector {
    patterns: Vec<(String, Regex)>,
    entities: Vec<String>,
}

const PATTERNS: &[(&str, &str)] = &[
    ("email", r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b"),
    (
        "phone_number",
        r"\+[1-9]\d{0,2}[-.\s]?\(?\d{1,4}\)?(?:[-.\s]?\d{2,4}){2,3}\b",
    ),
    ("german_medical_insurance_id", r"\b[A-Z]\d{9}\b"),
    (
        "credit_card",
        r"\b(?:4[0-9]{12}(?:[0-9]{3})?|5[1-5][0-9]{14}|3[47][0-9]{13}|3[0-9]{13}|6(?:011|5[0-9]{2})[0-9]{12})\b",
    ),
    (
        "iban",
        r"\b[A-Z]{2}[0-9]{2}[A-Z0-9]{4}[0-9]{7}(?:[A-Z0-9]?){0,16}\b",
    ),
];

impl RegexDetector {
    pub fn new() -> Self {
        let patterns: Vec<(String, Regex)> = PATTERNS
            .iter()
            .map(|(label, pattern)| {
                let compiled = Regex::new(pattern).expect("built-in pattern compiles");
                (label.to_string(), compiled)
            })
            .collect();
        let entities = patterns.iter().map(|(label, _)| label.clone()).collect();
        Self { patterns, entities }
    }

    fn scan(&self, text: &str) -> Vec<Entity> {
        let mut found = Vec::new();
        for (label, pattern) in &self.patterns {
            for m in pattern.find_iter(text) {
                found.push(Entity::new(m.start(), m.end(), m.as_str(), label, 1.0));
            }
        }
        sort_and_drop_overlaps(found)
    }
}

impl Default for RegexDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Detector for RegexDetector {
    fn supported_entities(&self) -> &[String] {
        &self.entities
    }

    async fn detect(
        &self,
        texts: &[String],
        _threshold: Option<f32>,
    ) -> Result<Vec<Vec<Entity>>, ShroudError> {
        validate_texts(texts)?;
        Ok(texts.iter().map(|text| self.scan(text)).collect())
    }
}
