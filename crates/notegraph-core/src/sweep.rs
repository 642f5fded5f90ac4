//! # Consistency Sweeper
//!
//! Removes entities no note mentions any more, together with everything
//! hanging off them. Dependents go before the rows they reference, so the
//! graph never passes through a dangling state even inside the
//! transaction:
//!
//! 1. links whose note or entity row is missing
//! 2. relations with a missing endpoint
//! 3. pick orphans: entities with no remaining link
//! 4. relations touching an orphan
//! 5. aliases of a missing or orphaned entity
//! 6. the orphan rows themselves
//!
//! Steps 1, 2 and the "missing" half of 5 find nothing when every write
//! went through `GraphTxn`; they exist so a sweep also repairs a store
//! damaged by other means.

use crate::storage::GraphTxn;
use crate::{EntityId, NotegraphError};
use serde::Serialize;
use std::collections::BTreeSet;

/// Counts of rows a sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed_entities: usize,
    pub removed_relations: usize,
    pub removed_links: usize,
    pub removed_aliases: usize,
    pub swept_entities: Vec<EntityId>,
}

impl SweepReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed_entities == 0
            && self.removed_relations == 0
            && self.removed_links == 0
            && self.removed_aliases == 0
    }
}

pub struct Sweeper;

impl Sweeper {
    /// Run one sweep inside `txn`. Idempotent: a second sweep in the same
    /// state removes nothing.
    pub fn sweep(txn: &GraphTxn) -> Result<SweepReport, NotegraphError> {
        let mut report = SweepReport::default();

        for (memory, entity) in txn.links()? {
            let dangling = !txn.memory_exists(memory)? || !txn.entity_exists(entity)?;
            if dangling && txn.unlink(memory, entity)? {
                report.removed_links += 1;
            }
        }

        let mut existing: BTreeSet<EntityId> = txn.entity_ids()?.into_iter().collect();
        for relation in txn.relations()? {
            let dangling = !existing.contains(&relation.from) || !existing.contains(&relation.to);
            if dangling && txn.delete_relation(relation.id)? {
                report.removed_relations += 1;
            }
        }

        let mut orphans = BTreeSet::new();
        for &id in &existing {
            if txn.memories_of(id)?.is_empty() {
                orphans.insert(id);
            }
        }

        for relation in txn.relations()? {
            let orphaned = orphans.contains(&relation.from) || orphans.contains(&relation.to);
            if orphaned && txn.delete_relation(relation.id)? {
                report.removed_relations += 1;
            }
        }

        existing.retain(|id| !orphans.contains(id));
        for (key, alias) in txn.aliases()? {
            if !existing.contains(&alias.entity_id) && txn.delete_alias(&key)? {
                report.removed_aliases += 1;
            }
        }

        for &id in &orphans {
            txn.delete_entity(id)?;
            report.removed_entities += 1;
        }
        report.swept_entities = orphans.into_iter().collect();

        if report.is_empty() {
            tracing::debug!("sweep found nothing to remove");
        } else {
            tracing::info!(
                entities = report.removed_entities,
                relations = report.removed_relations,
                links = report.removed_links,
                aliases = report.removed_aliases,
                "sweep removed unreferenced rows"
            );
        }
        Ok(report)
    }
}
