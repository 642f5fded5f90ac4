//! Read-only snapshot of the graph.
//!
//! Backed by a redb `ReadTransaction`, so queries see one committed state
//! and never block the writer.

use super::tables::{
    ALIASES, ENTITIES, ENTITY_NAMES, LINKS, LINKS_BY_ENTITY, MEMORIES, RELATIONS, get_alias,
    get_index, get_row, name_index_key, pair_range, scan_aliases, scan_pairs, scan_rows,
};
use crate::names::NameKey;
use crate::{
    Alias, Entity, EntityId, EntityKind, GraphStats, Memory, MemoryId, NotegraphError, Relation,
};
use redb::{ReadTransaction, ReadableTableMetadata};
use std::collections::BTreeSet;

/// A consistent read snapshot.
pub struct GraphView {
    txn: ReadTransaction,
}

impl std::fmt::Debug for GraphView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphView").finish_non_exhaustive()
    }
}

impl GraphView {
    pub(crate) fn new(txn: ReadTransaction) -> Self {
        Self { txn }
    }

    pub fn entity(&self, id: EntityId) -> Result<Option<Entity>, NotegraphError> {
        let table = self.txn.open_table(ENTITIES)?;
        get_row(&table, id.0)
    }

    pub fn entities(&self) -> Result<Vec<Entity>, NotegraphError> {
        let table = self.txn.open_table(ENTITIES)?;
        scan_rows(&table)
    }

    pub fn entity_by_name(
        &self,
        kind: EntityKind,
        key: &NameKey,
    ) -> Result<Option<EntityId>, NotegraphError> {
        let table = self.txn.open_table(ENTITY_NAMES)?;
        Ok(get_index(&table, &name_index_key(kind, key))?.map(EntityId))
    }

    /// Every entity carrying this name, across all kinds, lowest id first.
    pub fn entities_named(&self, key: &NameKey) -> Result<Vec<EntityId>, NotegraphError> {
        let table = self.txn.open_table(ENTITY_NAMES)?;
        let mut ids = Vec::new();
        for kind in EntityKind::ALL {
            if let Some(id) = get_index(&table, &name_index_key(kind, key))? {
                ids.push(EntityId(id));
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn alias(&self, key: &NameKey) -> Result<Option<Alias>, NotegraphError> {
        let table = self.txn.open_table(ALIASES)?;
        get_alias(&table, key)
    }

    pub fn aliases(&self) -> Result<Vec<(NameKey, Alias)>, NotegraphError> {
        let table = self.txn.open_table(ALIASES)?;
        scan_aliases(&table)
    }

    pub fn aliases_of(&self, id: EntityId) -> Result<Vec<Alias>, NotegraphError> {
        Ok(self
            .aliases()?
            .into_iter()
            .filter(|(_, alias)| alias.entity_id == id)
            .map(|(_, alias)| alias)
            .collect())
    }

    pub fn relations(&self) -> Result<Vec<Relation>, NotegraphError> {
        let table = self.txn.open_table(RELATIONS)?;
        scan_rows(&table)
    }

    pub fn memory(&self, id: MemoryId) -> Result<Option<Memory>, NotegraphError> {
        let table = self.txn.open_table(MEMORIES)?;
        get_row(&table, id.0)
    }

    pub fn memories(&self) -> Result<Vec<Memory>, NotegraphError> {
        let table = self.txn.open_table(MEMORIES)?;
        scan_rows(&table)
    }

    pub fn memories_of(&self, entity: EntityId) -> Result<BTreeSet<MemoryId>, NotegraphError> {
        let table = self.txn.open_table(LINKS_BY_ENTITY)?;
        Ok(pair_range(&table, entity.0)?
            .into_iter()
            .map(MemoryId)
            .collect())
    }

    pub fn entities_of(&self, memory: MemoryId) -> Result<BTreeSet<EntityId>, NotegraphError> {
        let table = self.txn.open_table(LINKS)?;
        Ok(pair_range(&table, memory.0)?
            .into_iter()
            .map(EntityId)
            .collect())
    }

    pub fn links(&self) -> Result<Vec<(MemoryId, EntityId)>, NotegraphError> {
        let table = self.txn.open_table(LINKS)?;
        Ok(scan_pairs(&table)?
            .into_iter()
            .map(|(m, e)| (MemoryId(m), EntityId(e)))
            .collect())
    }

    pub fn stats(&self) -> Result<GraphStats, NotegraphError> {
        Ok(GraphStats {
            entities: self.txn.open_table(ENTITIES)?.len()? as usize,
            aliases: self.txn.open_table(ALIASES)?.len()? as usize,
            relations: self.txn.open_table(RELATIONS)?.len()? as usize,
            links: self.txn.open_table(LINKS)?.len()? as usize,
            memories: self.txn.open_table(MEMORIES)?.len()? as usize,
        })
    }
}
