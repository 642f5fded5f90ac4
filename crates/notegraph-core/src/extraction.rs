//! # Extraction Seam
//!
//! The engine never talks to a language model. Whatever turns note text into
//! candidate entities and relations is injected as an [`Extractor`] and
//! called *before* any write transaction begins, so a slow or failing
//! extractor never holds the write lock and never leaves partial rows.
//!
//! The input types deserialize from the extractor's JSON wire format:
//!
//! ```json
//! {
//!   "entities":  [{"type": "Person", "name": "Li Ming", "attributes": {"role": "brother"}}],
//!   "relations": [{"from": "Li Ming", "to": "ByteCo", "relation": "works at"}],
//!   "aliases":   [{"primary": "Li Ming", "alias": "my older brother"}]
//! }
//! ```

use crate::EntityKind;
use crate::names::{self, NameKey};
use crate::primitives::{
    MAX_ATTRIBUTE_LENGTH, MAX_MENTIONS_PER_NOTE, MAX_NAME_LENGTH, MAX_RELATION_LABEL_LENGTH,
};
use crate::NotegraphError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// MENTIONS
// =============================================================================

/// An entity named in a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    #[serde(rename = "type", alias = "kind")]
    pub kind: EntityKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl EntityMention {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A relation between two mentioned names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMention {
    pub from: String,
    pub to: String,
    #[serde(rename = "relation", alias = "label")]
    pub label: String,
}

impl RelationMention {
    pub fn new(from: impl Into<String>, to: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: label.into(),
        }
    }
}

/// Fusion hint: `alias` names the same thing as `primary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionHint {
    pub primary: String,
    pub alias: String,
}

impl FusionHint {
    pub fn new(primary: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            alias: alias.into(),
        }
    }
}

/// Everything an extractor found in one note.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub entities: Vec<EntityMention>,
    #[serde(default)]
    pub relations: Vec<RelationMention>,
    #[serde(default, rename = "aliases", alias = "fusion_hints")]
    pub fusion_hints: Vec<FusionHint>,
}

impl Extraction {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty() && self.fusion_hints.is_empty()
    }

    #[must_use]
    pub fn with_entity(mut self, kind: EntityKind, name: impl Into<String>) -> Self {
        self.entities.push(EntityMention::new(kind, name));
        self
    }

    #[must_use]
    pub fn with_relation(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        self.relations.push(RelationMention::new(from, to, label));
        self
    }

    #[must_use]
    pub fn with_hint(mut self, primary: impl Into<String>, alias: impl Into<String>) -> Self {
        self.fusion_hints.push(FusionHint::new(primary, alias));
        self
    }

    /// Normalized keys of every entity name this extraction mentions.
    #[must_use]
    pub fn name_keys(&self) -> Vec<NameKey> {
        let mut keys: Vec<NameKey> = self
            .entities
            .iter()
            .filter_map(|m| NameKey::new(&m.name))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Reject malformed input before any transaction opens.
    pub fn validate(&self) -> Result<(), NotegraphError> {
        let total = self.entities.len() + self.relations.len() + self.fusion_hints.len();
        if total > MAX_MENTIONS_PER_NOTE {
            return Err(NotegraphError::InvalidInput(format!(
                "extraction has {} mentions, maximum is {}",
                total, MAX_MENTIONS_PER_NOTE
            )));
        }
        for mention in &self.entities {
            names::checked(&mention.name, "entity name", MAX_NAME_LENGTH)?;
            for (key, value) in &mention.attributes {
                if key.is_empty() || key.len() > MAX_ATTRIBUTE_LENGTH {
                    return Err(NotegraphError::InvalidInput(format!(
                        "attribute key on '{}' must be 1..={} bytes",
                        mention.name, MAX_ATTRIBUTE_LENGTH
                    )));
                }
                if value.len() > MAX_ATTRIBUTE_LENGTH {
                    return Err(NotegraphError::InvalidInput(format!(
                        "attribute '{}' on '{}' exceeds {} bytes",
                        key, mention.name, MAX_ATTRIBUTE_LENGTH
                    )));
                }
            }
        }
        for relation in &self.relations {
            names::checked(&relation.from, "relation source", MAX_NAME_LENGTH)?;
            names::checked(&relation.to, "relation target", MAX_NAME_LENGTH)?;
            names::checked(&relation.label, "relation label", MAX_RELATION_LABEL_LENGTH)?;
        }
        for hint in &self.fusion_hints {
            names::checked(&hint.primary, "fusion primary", MAX_NAME_LENGTH)?;
            names::checked(&hint.alias, "fusion alias", MAX_NAME_LENGTH)?;
        }
        Ok(())
    }
}

// =============================================================================
// EXTRACTOR
// =============================================================================

/// Failure reported by an extractor. Surfaced to callers verbatim as
/// `NotegraphError::ExtractionUnavailable`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("extractor unreachable: {0}")]
    Unreachable(String),
    #[error("extractor response malformed: {0}")]
    Malformed(String),
    #[error("extraction aborted")]
    Aborted,
}

/// A previously saved note handed to the fusion pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalledNote {
    pub memory: crate::MemoryId,
    /// Body, clipped to the recall budget.
    pub excerpt: String,
    pub score_permille: u32,
    pub entity_hits: usize,
}

/// The injected text-to-facts capability.
///
/// Implementations must be `Send + Sync`; the engine holds no global
/// provider state and receives the extractor per call.
pub trait Extractor: Send + Sync {
    /// First pass over the new note alone.
    fn extract(&self, text: &str) -> Result<Extraction, ExtractionError>;

    /// Second pass with relevant older notes in view. May return fusion
    /// hints. `Ok(None)` keeps the first-pass result.
    fn fuse(
        &self,
        _history: &[RecalledNote],
        _text: &str,
    ) -> Result<Option<Extraction>, ExtractionError> {
        Ok(None)
    }
}

/// Replays a pre-computed extraction. The application uses it for requests
/// that arrive with their extraction attached.
#[derive(Debug, Clone, Default)]
pub struct FixedExtractor {
    extraction: Extraction,
    fused: Option<Extraction>,
}

impl FixedExtractor {
    pub fn new(extraction: Extraction) -> Self {
        Self {
            extraction,
            fused: None,
        }
    }

    /// Also answer the fusion pass with `fused`.
    #[must_use]
    pub fn with_fused(mut self, fused: Option<Extraction>) -> Self {
        self.fused = fused;
        self
    }
}

impl Extractor for FixedExtractor {
    fn extract(&self, _text: &str) -> Result<Extraction, ExtractionError> {
        Ok(self.extraction.clone())
    }

    fn fuse(
        &self,
        _history: &[RecalledNote],
        _text: &str,
    ) -> Result<Option<Extraction>, ExtractionError> {
        Ok(self.fused.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_format() {
        let json = r#"{
            "entities": [
                {"type": "person", "name": "Li Ming", "attributes": {"role": "brother"}},
                {"type": "Company", "name": "ByteCo"}
            ],
            "relations": [{"from": "Li Ming", "to": "ByteCo", "relation": "works at"}],
            "aliases": [{"primary": "Li Ming", "alias": "my older brother"}]
        }"#;
        let extraction: Extraction = serde_json::from_str(json).expect("parse");
        assert_eq!(extraction.entities[0].kind, EntityKind::Person);
        assert_eq!(extraction.entities[1].kind, EntityKind::Other);
        assert_eq!(extraction.relations[0].label, "works at");
        assert_eq!(extraction.fusion_hints[0].alias, "my older brother");
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let extraction: Extraction = serde_json::from_str("{}").expect("parse");
        assert!(extraction.is_empty());
    }

    #[test]
    fn validation_rejects_blank_names() {
        let extraction = Extraction::default().with_entity(EntityKind::Person, "   ");
        assert!(matches!(
            extraction.validate(),
            Err(NotegraphError::InvalidInput(_))
        ));
    }

    #[test]
    fn name_keys_are_deduplicated() {
        let extraction = Extraction::default()
            .with_entity(EntityKind::Person, "Alice")
            .with_entity(EntityKind::Organization, "ALICE")
            .with_entity(EntityKind::Person, "Bob");
        let keys: Vec<String> = extraction
            .name_keys()
            .iter()
            .map(|k| k.as_str().to_string())
            .collect();
        assert_eq!(keys, vec!["alice", "bob"]);
    }

    #[test]
    fn fixed_extractor_replays_both_passes() {
        let first = Extraction::default().with_entity(EntityKind::Person, "Alice");
        let fused = first.clone().with_hint("Alice", "Ally");
        let extractor = FixedExtractor::new(first.clone()).with_fused(Some(fused.clone()));
        assert_eq!(extractor.extract("x").expect("extract"), first);
        assert_eq!(extractor.fuse(&[], "x").expect("fuse"), Some(fused));
    }
}
