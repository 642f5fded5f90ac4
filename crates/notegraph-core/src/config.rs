//! # Graph Policy
//!
//! Tunable behaviour of the engine. Deserializable so the application can
//! load it from the `[policy]` table of its TOML config; every field has a
//! default, so an empty table is valid.

use crate::names::NameKey;
use crate::primitives::{
    RECALL_CANDIDATES_PER_ENTITY, RECALL_MAX_CONTEXT_CHARS, RECALL_MAX_NOTE_CHARS,
    RECALL_MIN_SCORE_PERMILLE, RECALL_MIN_TOKEN_OVERLAP, RECALL_TOP_K,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-deployment engine policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphPolicy {
    /// Relation labels whose direction does not matter ("sibling of").
    /// Stored as given; compared by normalized key.
    pub symmetric_relations: BTreeSet<String>,
    /// Upper bound for relation strength. `None` lets it grow (saturating).
    pub strength_cap: Option<i64>,
    /// Accept a same-name entity of another kind when neither the exact
    /// name+kind nor an alias matches.
    pub match_across_kinds: bool,
    pub recall: RecallLimits,
}

impl Default for GraphPolicy {
    fn default() -> Self {
        Self {
            symmetric_relations: BTreeSet::new(),
            strength_cap: None,
            match_across_kinds: false,
            recall: RecallLimits::default(),
        }
    }
}

impl GraphPolicy {
    /// Whether `relation_type` (already normalized) is declared symmetric.
    #[must_use]
    pub fn is_symmetric(&self, relation_type: &str) -> bool {
        self.symmetric_relations
            .iter()
            .filter_map(|label| NameKey::new(label))
            .any(|key| key.as_str() == relation_type)
    }

    /// Builder-style helper mostly used by tests and the CLI.
    #[must_use]
    pub fn with_symmetric(mut self, label: impl Into<String>) -> Self {
        self.symmetric_relations.insert(label.into());
        self
    }
}

/// Budget for the recall step that feeds the fusion pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallLimits {
    pub candidates_per_entity: usize,
    pub top_k: usize,
    pub max_context_chars: usize,
    pub max_note_chars: usize,
    pub min_score_permille: u32,
    pub min_token_overlap: usize,
}

impl Default for RecallLimits {
    fn default() -> Self {
        Self {
            candidates_per_entity: RECALL_CANDIDATES_PER_ENTITY,
            top_k: RECALL_TOP_K,
            max_context_chars: RECALL_MAX_CONTEXT_CHARS,
            max_note_chars: RECALL_MAX_NOTE_CHARS,
            min_score_permille: RECALL_MIN_SCORE_PERMILLE,
            min_token_overlap: RECALL_MIN_TOKEN_OVERLAP,
        }
    }
}
