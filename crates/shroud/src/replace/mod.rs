use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::detect::{Entity, canonical_label};
use crate::error::ShroudError;
use crate::store::EntityStore;
use crate::thread::ThreadId;

mod encryption;
mod hash;
mod placeholder;
mod pseudonym;

pub use encryption::EncryptionReplacer;
pub use hash::HashReplacer;
pub use placeholder::PlaceholderReplacer;
pub use pseudonym::{Locale, PseudonymReplacer};

/// Entity labels a replacer strategy can handle. Stored in canonical form
/// (see [`canonical_label`]).
#[derive(Debug, Clone)]
pub enum LabelSet {
    /// The strategy handles every label.
    Any,
    /// The strategy handles exactly these canonical labels.
    Only(HashSet<String>),
}

impl LabelSet {
    pub fn only<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        LabelSet::Only(
            labels
                .into_iter()
                .map(|l| canonical_label(l.as_ref()))
                .collect(),
        )
    }

    pub fn supports(&self, label: &str) -> bool {
        match self {
            LabelSet::Any => true,
            LabelSet::Only(set) => set.contains(&canonical_label(label)),
        }
    }
}

/// Substitutes detected entities with placeholders and back.
///
/// Strategies differ only in how a placeholder is minted
/// ([`Replacer::create_placeholder`]); the replace and restore pipelines are
/// shared default implementations backed by the strategy's entity store.
#[async_trait]
pub trait Replacer: Send + Sync {
    /// The store recording this thread's mappings.
    fn entity_store(&self) -> &Arc<dyn EntityStore>;

    /// Labels this strategy can mint placeholders for.
    fn supported_labels(&self) -> &LabelSet;

    /// Mints a fresh placeholder for an entity seen for the first time in
    /// this thread.
    async fn create_placeholder(
        &self,
        entity: &Entity,
        thread: ThreadId,
    ) -> Result<String, ShroudError>;

    /// Rejects entities whose label the strategy cannot handle.
    fn validate_entities(&self, entities: &[Entity]) -> Result<(), ShroudError> {
        for entity in entities {
            if !self.supported_labels().supports(&entity.label) {
                return Err(ShroudError::UnsupportedEntity(entity.label.clone()));
            }
        }
        Ok(())
    }

    /// Replaces the given entities in `text` with their placeholders,
    /// creating and recording mappings on first encounter.
    ///
    /// Entities are spliced in the order supplied while a running offset
    /// tracks the length delta, so spans must be sorted by start and
    /// non-overlapping; violations, as well as spans that do not match the
    /// source text, are integrity errors.
    async fn replace(
        &self,
        text: &str,
        entities: &[Entity],
        thread: ThreadId,
    ) -> Result<String, ShroudError> {
        self.validate_entities(entities)?;

        let store = self.entity_store();
        let mut out = text.to_string();
        let mut offset: isize = 0;
        let mut prev_end = 0usize;

        for entity in entities {
            check_span(text, entity, prev_end)?;
            prev_end = entity.end;

            let placeholder = match store.get_placeholder(thread, &entity.text).await? {
                Some(existing) => existing,
                None => {
                    let minted = self.create_placeholder(entity, thread).await?;
                    store
                        .put(thread, &entity.text, &entity.label, &minted)
                        .await?;
                    minted
                }
            };

            let start = (entity.start as isize + offset) as usize;
            let end = (entity.end as isize + offset) as usize;
            out.replace_range(start..end, &placeholder);
            offset += placeholder.len() as isize - (entity.end - entity.start) as isize;
        }

        Ok(out)
    }

    /// Substitutes stored originals back for any placeholders present in
    /// `text`. Placeholders are applied longest-first so one that is a
    /// lexical prefix of another can never clobber it; placeholders absent
    /// from the text are skipped silently.
    async fn restore(&self, text: &str, thread: ThreadId) -> Result<String, ShroudError> {
        let store = self.entity_store();
        let mut placeholders = store.list_placeholders(thread).await?;
        placeholders.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut out = text.to_string();
        for placeholder in placeholders {
            if !out.contains(&placeholder) {
                continue;
            }
            if let Some((original, _label)) = store.get_original(thread, &placeholder).await? {
                out = out.replace(&placeholder, &original);
            }
        }
        Ok(out)
    }
}

fn check_span(text: &str, entity: &Entity, prev_end: usize) -> Result<(), ShroudError> {
    if entity.start >= entity.end || entity.end > text.len() {
        return Err(ShroudError::Integrity(format!(
            "entity span {}..{} out of bounds for text of length {}",
            entity.start,
            entity.end,
            text.len()
        )));
    }
    if entity.start < prev_end {
        return Err(ShroudError::Integrity(format!(
            "entity span {}..{} overlaps or precedes previous span ending at {}",
            entity.start, entity.end, prev_end
        )));
    }
    if !text.is_char_boundary(entity.start) || !text.is_char_boundary(entity.end) {
        return Err(ShroudError::Integrity(format!(
            "entity span {}..{} does not fall on character boundaries",
            entity.start, entity.end
        )));
    }
    if &text[entity.start..entity.end] != entity.text {
        return Err(ShroudError::Integrity(format!(
            "entity text `{}` does not match source span {}..{}",
            entity.text, entity.start, entity.end
        )));
    }
    Ok(())
}
