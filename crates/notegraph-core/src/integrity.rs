//! Read-only audit of the referential invariants.
//!
//! The store refuses dangling writes, so on a healthy database only
//! `orphan_entities` is ever non-empty (between an edit and its sweep).

use crate::storage::GraphView;
use crate::{EntityId, MemoryId, NotegraphError, RelationId};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Alias texts whose entity is missing.
    pub dangling_aliases: Vec<String>,
    /// Relations with a missing endpoint.
    pub dangling_relations: Vec<RelationId>,
    /// Links with a missing note or entity.
    pub dangling_links: Vec<(MemoryId, EntityId)>,
    /// Entities no note links to; the next sweep removes them.
    pub orphan_entities: Vec<EntityId>,
}

impl IntegrityReport {
    pub fn check(view: &GraphView) -> Result<Self, NotegraphError> {
        let entities: BTreeSet<EntityId> = view.entities()?.into_iter().map(|e| e.id).collect();
        let memories: BTreeSet<MemoryId> = view.memories()?.into_iter().map(|m| m.id).collect();
        let mut report = Self::default();

        for (_, alias) in view.aliases()? {
            if !entities.contains(&alias.entity_id) {
                report.dangling_aliases.push(alias.alias);
            }
        }
        for relation in view.relations()? {
            if !entities.contains(&relation.from) || !entities.contains(&relation.to) {
                report.dangling_relations.push(relation.id);
            }
        }
        let mut linked = BTreeSet::new();
        for (memory, entity) in view.links()? {
            if memories.contains(&memory) && entities.contains(&entity) {
                linked.insert(entity);
            } else {
                report.dangling_links.push((memory, entity));
            }
        }
        report.orphan_entities = entities.difference(&linked).copied().collect();
        Ok(report)
    }

    /// No alias, relation or link points at a missing row.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.dangling_aliases.is_empty()
            && self.dangling_relations.is_empty()
            && self.dangling_links.is_empty()
    }

    /// Consistent and nothing left for the sweeper.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.is_consistent() && self.orphan_entities.is_empty()
    }
}
