//! # Memory Linker
//!
//! Keeps the note ↔ entity association in step with the latest extraction.
//! Linking is idempotent. Relinking after an edit never deletes entities: a
//! dropped entity may still be mentioned by other notes, so it is only
//! reported as a sweep candidate.

use crate::storage::GraphTxn;
use crate::{EntityId, MemoryId, NotegraphError};
use serde::Serialize;
use std::collections::BTreeSet;

/// How a note's entity set changed on relink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkDiff {
    pub added: BTreeSet<EntityId>,
    /// No longer mentioned by this note; candidates for the sweeper.
    pub removed: BTreeSet<EntityId>,
    pub retained: BTreeSet<EntityId>,
}

impl LinkDiff {
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub struct MemoryLinker;

impl MemoryLinker {
    /// Insert any missing links. Returns how many were new.
    pub fn link(
        txn: &GraphTxn,
        memory: MemoryId,
        entities: &BTreeSet<EntityId>,
    ) -> Result<usize, NotegraphError> {
        let mut added = 0;
        for &entity in entities {
            if txn.link(memory, entity)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Make `entities` the note's exact link set.
    pub fn relink(
        txn: &GraphTxn,
        memory: MemoryId,
        entities: &BTreeSet<EntityId>,
    ) -> Result<LinkDiff, NotegraphError> {
        let current = txn.entities_of(memory)?;
        let diff = LinkDiff {
            added: entities.difference(&current).copied().collect(),
            removed: current.difference(entities).copied().collect(),
            retained: current.intersection(entities).copied().collect(),
        };

        for &entity in &diff.removed {
            txn.unlink(memory, entity)?;
        }
        Self::link(txn, memory, &diff.added)?;

        if !diff.is_unchanged() {
            tracing::debug!(
                memory = memory.0,
                added = diff.added.len(),
                removed = diff.removed.len(),
                "note relinked"
            );
        }
        Ok(diff)
    }

    /// Drop every link of a note. Returns the entities it pointed at.
    pub fn unlink_all(
        txn: &GraphTxn,
        memory: MemoryId,
    ) -> Result<BTreeSet<EntityId>, NotegraphError> {
        let current = txn.entities_of(memory)?;
        for &entity in &current {
            txn.unlink(memory, entity)?;
        }
        Ok(current)
    }
}
