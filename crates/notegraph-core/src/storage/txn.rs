//! # Graph Write Transaction
//!
//! `GraphTxn` wraps one redb `WriteTransaction` and is the only way rows are
//! written. Every insert checks its referential targets inside the same
//! transaction, and `delete_entity` refuses while any alias, relation or
//! link still points at the entity. Constraint enforcement therefore never
//! has to be switched off: a write that would dangle fails with
//! `IntegrityViolation` and the caller drops the transaction, which aborts
//! it.
//!
//! Each method opens the tables it needs and releases them before
//! returning, so methods can be freely composed by the components above.

use super::tables::{
    ALIASES, ENTITIES, ENTITY_NAMES, LINKS, LINKS_BY_ENTITY, MEMORIES, METADATA,
    NEXT_ENTITY_ID, NEXT_MEMORY_ID, NEXT_RELATION_ID, RELATION_KEYS, RELATIONS, encode,
    get_alias, get_index, get_row, name_index_key, pair_range, relation_key, scan_aliases,
    scan_ids, scan_pairs, scan_rows,
};
use crate::names::{self, NameKey};
use crate::primitives::{MAX_NAME_LENGTH, MAX_RELATION_LABEL_LENGTH};
use crate::{
    Alias, Entity, EntityId, EntityKind, GraphStats, Memory, MemoryId, NotegraphError,
    Relation, RelationId, Strength,
};
use chrono::{DateTime, Utc};
use redb::{ReadableTable, ReadableTableMetadata, WriteTransaction};
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of [`GraphTxn::insert_alias`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasInsert {
    Inserted,
    /// The alias already points at this entity.
    AlreadyPresent,
    /// The alias text belongs to another entity; nothing was written.
    Taken(EntityId),
}

/// A write transaction over the graph and note tables.
pub struct GraphTxn {
    txn: WriteTransaction,
    now: DateTime<Utc>,
}

impl std::fmt::Debug for GraphTxn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphTxn")
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

impl GraphTxn {
    pub(crate) fn new(txn: WriteTransaction) -> Self {
        Self {
            txn,
            now: Utc::now(),
        }
    }

    /// Timestamp stamped on every row written by this transaction.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Commit all writes atomically.
    pub fn commit(self) -> Result<(), NotegraphError> {
        self.txn.commit()?;
        Ok(())
    }

    /// Discard all writes. Dropping the transaction has the same effect.
    pub fn abort(self) -> Result<(), NotegraphError> {
        self.txn.abort()?;
        Ok(())
    }

    fn next_id(&self, counter: &str) -> Result<u64, NotegraphError> {
        let mut meta = self.txn.open_table(METADATA)?;
        let current = meta.get(counter)?.map(|v| v.value()).unwrap_or(0);
        let next = current.saturating_add(1);
        meta.insert(counter, next)?;
        Ok(next)
    }

    // =========================================================================
    // ENTITIES
    // =========================================================================

    pub fn entity(&self, id: EntityId) -> Result<Option<Entity>, NotegraphError> {
        let table = self.txn.open_table(ENTITIES)?;
        get_row(&table, id.0)
    }

    pub fn require_entity(&self, id: EntityId) -> Result<Entity, NotegraphError> {
        self.entity(id)?.ok_or(NotegraphError::EntityNotFound(id))
    }

    pub fn entity_exists(&self, id: EntityId) -> Result<bool, NotegraphError> {
        let table = self.txn.open_table(ENTITIES)?;
        Ok(table.get(id.0)?.is_some())
    }

    /// Exact (kind, name) lookup through the name index.
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

    pub fn entity_ids(&self) -> Result<Vec<EntityId>, NotegraphError> {
        let table = self.txn.open_table(ENTITIES)?;
        Ok(scan_ids(&table)?.into_iter().map(EntityId).collect())
    }

    /// Create an entity. Fails if (kind, name) is already taken.
    pub fn insert_entity(
        &self,
        kind: EntityKind,
        name: &str,
        attributes: BTreeMap<String, String>,
    ) -> Result<Entity, NotegraphError> {
        let (display, key) = names::checked(name, "entity name", MAX_NAME_LENGTH)?;
        let index_key = name_index_key(kind, &key);
        if let Some(existing) = self.entity_by_name(kind, &key)? {
            return Err(NotegraphError::IntegrityViolation(format!(
                "{} '{}' already exists as {}",
                kind, display, existing
            )));
        }

        let entity = Entity {
            id: EntityId(self.next_id(NEXT_ENTITY_ID)?),
            kind,
            name: display,
            attributes,
            created_at: self.now,
            updated_at: self.now,
        };
        self.put_entity(&entity)?;
        let mut index = self.txn.open_table(ENTITY_NAMES)?;
        index.insert(index_key.as_str(), entity.id.0)?;
        Ok(entity)
    }

    /// Overwrite an existing entity row. Name and kind are immutable here
    /// because the name index is keyed on them.
    pub fn put_entity(&self, entity: &Entity) -> Result<(), NotegraphError> {
        let bytes = encode(entity)?;
        let mut table = self.txn.open_table(ENTITIES)?;
        table.insert(entity.id.0, bytes.as_slice())?;
        Ok(())
    }

    /// Delete an entity row and its name index entry.
    ///
    /// Refused with `IntegrityViolation` while anything references the
    /// entity: dependents must be rewritten or removed first.
    pub fn delete_entity(&self, id: EntityId) -> Result<(), NotegraphError> {
        let entity = self.require_entity(id)?;

        let links = self.memories_of(id)?.len();
        let relations = self.relations_touching(id)?.len();
        let aliases = self.aliases_of(id)?.len();
        if links + relations + aliases > 0 {
            return Err(NotegraphError::IntegrityViolation(format!(
                "{} is still referenced by {} links, {} relations, {} aliases",
                id, links, relations, aliases
            )));
        }

        {
            let mut table = self.txn.open_table(ENTITIES)?;
            table.remove(id.0)?;
        }
        if let Some(key) = NameKey::new(&entity.name) {
            let index_key = name_index_key(entity.kind, &key);
            let mut index = self.txn.open_table(ENTITY_NAMES)?;
            let owned = get_index(&index, &index_key)? == Some(id.0);
            if owned {
                index.remove(index_key.as_str())?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // ALIASES
    // =========================================================================

    pub fn alias(&self, key: &NameKey) -> Result<Option<Alias>, NotegraphError> {
        let table = self.txn.open_table(ALIASES)?;
        get_alias(&table, key)
    }

    pub fn aliases(&self) -> Result<Vec<(NameKey, Alias)>, NotegraphError> {
        let table = self.txn.open_table(ALIASES)?;
        scan_aliases(&table)
    }

    pub fn aliases_of(&self, id: EntityId) -> Result<Vec<(NameKey, Alias)>, NotegraphError> {
        Ok(self
            .aliases()?
            .into_iter()
            .filter(|(_, alias)| alias.entity_id == id)
            .collect())
    }

    /// Record `text` as an alias of `entity`.
    pub fn insert_alias(&self, entity: EntityId, text: &str) -> Result<AliasInsert, NotegraphError> {
        let (display, key) = names::checked(text, "alias", MAX_NAME_LENGTH)?;
        if !self.entity_exists(entity)? {
            return Err(NotegraphError::IntegrityViolation(format!(
                "alias '{}' would reference missing {}",
                display, entity
            )));
        }
        if let Some(existing) = self.alias(&key)? {
            return Ok(if existing.entity_id == entity {
                AliasInsert::AlreadyPresent
            } else {
                AliasInsert::Taken(existing.entity_id)
            });
        }

        let row = Alias {
            entity_id: entity,
            alias: display,
            created_at: self.now,
        };
        let bytes = encode(&row)?;
        let mut table = self.txn.open_table(ALIASES)?;
        table.insert(key.as_str(), bytes.as_slice())?;
        Ok(AliasInsert::Inserted)
    }

    /// Move an existing alias to another entity.
    pub fn repoint_alias(&self, key: &NameKey, to: EntityId) -> Result<(), NotegraphError> {
        if !self.entity_exists(to)? {
            return Err(NotegraphError::IntegrityViolation(format!(
                "alias '{}' would reference missing {}",
                key, to
            )));
        }
        let mut row = self.alias(key)?.ok_or_else(|| {
            NotegraphError::InvalidInput(format!("alias '{}' does not exist", key))
        })?;
        row.entity_id = to;
        let bytes = encode(&row)?;
        let mut table = self.txn.open_table(ALIASES)?;
        table.insert(key.as_str(), bytes.as_slice())?;
        Ok(())
    }

    pub fn delete_alias(&self, key: &NameKey) -> Result<bool, NotegraphError> {
        let mut table = self.txn.open_table(ALIASES)?;
        Ok(table.remove(key.as_str())?.is_some())
    }

    // =========================================================================
    // RELATIONS
    // =========================================================================

    pub fn relation(&self, id: RelationId) -> Result<Option<Relation>, NotegraphError> {
        let table = self.txn.open_table(RELATIONS)?;
        get_row(&table, id.0)
    }

    pub fn relation_by_key(
        &self,
        from: EntityId,
        to: EntityId,
        relation_type: &str,
    ) -> Result<Option<RelationId>, NotegraphError> {
        let table = self.txn.open_table(RELATION_KEYS)?;
        Ok(get_index(&table, &relation_key(from, to, relation_type))?.map(RelationId))
    }

    pub fn relations(&self) -> Result<Vec<Relation>, NotegraphError> {
        let table = self.txn.open_table(RELATIONS)?;
        scan_rows(&table)
    }

    /// Relations with `id` at either end, in id order.
    pub fn relations_touching(&self, id: EntityId) -> Result<Vec<Relation>, NotegraphError> {
        Ok(self
            .relations()?
            .into_iter()
            .filter(|r| r.from == id || r.to == id)
            .collect())
    }

    /// Insert a new relation row. Both endpoints must exist and the
    /// (from, to, type) key must be free.
    pub fn insert_relation(
        &self,
        from: EntityId,
        to: EntityId,
        relation_type: &str,
        strength: Strength,
    ) -> Result<Relation, NotegraphError> {
        self.check_relation_slot(from, to, relation_type)?;
        let relation = Relation {
            id: RelationId(self.next_id(NEXT_RELATION_ID)?),
            from,
            to,
            relation_type: relation_type.to_string(),
            strength,
            created_at: self.now,
        };
        self.put_relation(&relation)?;
        let mut keys = self.txn.open_table(RELATION_KEYS)?;
        keys.insert(
            relation_key(from, to, relation_type).as_str(),
            relation.id.0,
        )?;
        Ok(relation)
    }

    pub fn set_strength(&self, id: RelationId, strength: Strength) -> Result<(), NotegraphError> {
        let mut relation = self.relation(id)?.ok_or_else(|| {
            NotegraphError::InvalidInput(format!("{} does not exist", id))
        })?;
        relation.strength = strength;
        self.put_relation(&relation)
    }

    /// Move a relation to new endpoints, re-keying it.
    pub fn repoint_relation(
        &self,
        id: RelationId,
        from: EntityId,
        to: EntityId,
    ) -> Result<Relation, NotegraphError> {
        let mut relation = self.relation(id)?.ok_or_else(|| {
            NotegraphError::InvalidInput(format!("{} does not exist", id))
        })?;
        self.check_relation_slot(from, to, &relation.relation_type)?;

        let mut keys = self.txn.open_table(RELATION_KEYS)?;
        keys.remove(relation_key(relation.from, relation.to, &relation.relation_type).as_str())?;
        keys.insert(
            relation_key(from, to, &relation.relation_type).as_str(),
            id.0,
        )?;
        drop(keys);

        relation.from = from;
        relation.to = to;
        self.put_relation(&relation)?;
        Ok(relation)
    }

    /// Remove a relation row and its key. Returns whether it existed.
    pub fn delete_relation(&self, id: RelationId) -> Result<bool, NotegraphError> {
        let Some(relation) = self.relation(id)? else {
            return Ok(false);
        };
        {
            let mut keys = self.txn.open_table(RELATION_KEYS)?;
            let index_key = relation_key(relation.from, relation.to, &relation.relation_type);
            if get_index(&keys, &index_key)? == Some(id.0) {
                keys.remove(index_key.as_str())?;
            }
        }
        let mut table = self.txn.open_table(RELATIONS)?;
        table.remove(id.0)?;
        Ok(true)
    }

    fn put_relation(&self, relation: &Relation) -> Result<(), NotegraphError> {
        let bytes = encode(relation)?;
        let mut table = self.txn.open_table(RELATIONS)?;
        table.insert(relation.id.0, bytes.as_slice())?;
        Ok(())
    }

    fn check_relation_slot(
        &self,
        from: EntityId,
        to: EntityId,
        relation_type: &str,
    ) -> Result<(), NotegraphError> {
        if relation_type.is_empty() || relation_type.len() > MAX_RELATION_LABEL_LENGTH {
            return Err(NotegraphError::InvalidInput(format!(
                "relation type must be 1..={} bytes",
                MAX_RELATION_LABEL_LENGTH
            )));
        }
        for endpoint in [from, to] {
            if !self.entity_exists(endpoint)? {
                return Err(NotegraphError::IntegrityViolation(format!(
                    "relation '{}' would reference missing {}",
                    relation_type, endpoint
                )));
            }
        }
        if let Some(existing) = self.relation_by_key(from, to, relation_type)? {
            return Err(NotegraphError::IntegrityViolation(format!(
                "relation ({}, {}, '{}') already exists as {}",
                from, to, relation_type, existing
            )));
        }
        Ok(())
    }

    // =========================================================================
    // MEMORIES
    // =========================================================================

    pub fn memory(&self, id: MemoryId) -> Result<Option<Memory>, NotegraphError> {
        let table = self.txn.open_table(MEMORIES)?;
        get_row(&table, id.0)
    }

    pub fn memory_exists(&self, id: MemoryId) -> Result<bool, NotegraphError> {
        let table = self.txn.open_table(MEMORIES)?;
        Ok(table.get(id.0)?.is_some())
    }

    pub fn insert_memory(
        &self,
        content: &str,
        tags: Vec<String>,
    ) -> Result<Memory, NotegraphError> {
        let memory = Memory {
            id: MemoryId(self.next_id(NEXT_MEMORY_ID)?),
            content: content.to_string(),
            tags,
            created_at: self.now,
            updated_at: self.now,
        };
        self.put_memory(&memory)?;
        Ok(memory)
    }

    pub fn put_memory(&self, memory: &Memory) -> Result<(), NotegraphError> {
        let bytes = encode(memory)?;
        let mut table = self.txn.open_table(MEMORIES)?;
        table.insert(memory.id.0, bytes.as_slice())?;
        Ok(())
    }

    /// Delete a note row. Its links must already be gone.
    pub fn delete_memory(&self, id: MemoryId) -> Result<bool, NotegraphError> {
        let linked = self.entities_of(id)?.len();
        if linked > 0 {
            return Err(NotegraphError::IntegrityViolation(format!(
                "{} is still linked to {} entities",
                id, linked
            )));
        }
        let mut table = self.txn.open_table(MEMORIES)?;
        Ok(table.remove(id.0)?.is_some())
    }

    pub fn memory_ids(&self) -> Result<Vec<MemoryId>, NotegraphError> {
        let table = self.txn.open_table(MEMORIES)?;
        Ok(scan_ids(&table)?.into_iter().map(MemoryId).collect())
    }

    // =========================================================================
    // LINKS
    // =========================================================================

    /// Link a note to an entity. Returns `false` if the pair already existed.
    pub fn link(&self, memory: MemoryId, entity: EntityId) -> Result<bool, NotegraphError> {
        if !self.memory_exists(memory)? {
            return Err(NotegraphError::IntegrityViolation(format!(
                "link would reference missing {}",
                memory
            )));
        }
        if !self.entity_exists(entity)? {
            return Err(NotegraphError::IntegrityViolation(format!(
                "link would reference missing {}",
                entity
            )));
        }
        let mut links = self.txn.open_table(LINKS)?;
        let inserted = links.insert((memory.0, entity.0), ())?.is_none();
        drop(links);
        let mut by_entity = self.txn.open_table(LINKS_BY_ENTITY)?;
        by_entity.insert((entity.0, memory.0), ())?;
        Ok(inserted)
    }

    /// Remove one link. Returns whether it existed.
    pub fn unlink(&self, memory: MemoryId, entity: EntityId) -> Result<bool, NotegraphError> {
        let mut links = self.txn.open_table(LINKS)?;
        let removed = links.remove((memory.0, entity.0))?.is_some();
        drop(links);
        let mut by_entity = self.txn.open_table(LINKS_BY_ENTITY)?;
        by_entity.remove((entity.0, memory.0))?;
        Ok(removed)
    }

    pub fn entities_of(&self, memory: MemoryId) -> Result<BTreeSet<EntityId>, NotegraphError> {
        let links = self.txn.open_table(LINKS)?;
        Ok(pair_range(&links, memory.0)?
            .into_iter()
            .map(EntityId)
            .collect())
    }

    pub fn memories_of(&self, entity: EntityId) -> Result<BTreeSet<MemoryId>, NotegraphError> {
        let by_entity = self.txn.open_table(LINKS_BY_ENTITY)?;
        Ok(pair_range(&by_entity, entity.0)?
            .into_iter()
            .map(MemoryId)
            .collect())
    }

    pub fn links(&self) -> Result<Vec<(MemoryId, EntityId)>, NotegraphError> {
        let links = self.txn.open_table(LINKS)?;
        Ok(scan_pairs(&links)?
            .into_iter()
            .map(|(m, e)| (MemoryId(m), EntityId(e)))
            .collect())
    }

    // =========================================================================
    // WHOLE-STORE
    // =========================================================================

    pub fn stats(&self) -> Result<GraphStats, NotegraphError> {
        Ok(GraphStats {
            entities: self.txn.open_table(ENTITIES)?.len()? as usize,
            aliases: self.txn.open_table(ALIASES)?.len()? as usize,
            relations: self.txn.open_table(RELATIONS)?.len()? as usize,
            links: self.txn.open_table(LINKS)?.len()? as usize,
            memories: self.txn.open_table(MEMORIES)?.len()? as usize,
        })
    }

    /// Remove every row, dependents before the rows they reference.
    /// Id counters are kept so ids are never reused.
    pub fn clear(&self) -> Result<GraphStats, NotegraphError> {
        let before = self.stats()?;
        for (memory, entity) in self.links()? {
            self.unlink(memory, entity)?;
        }
        for relation in self.relations()? {
            self.delete_relation(relation.id)?;
        }
        for (key, _) in self.aliases()? {
            self.delete_alias(&key)?;
        }
        for id in self.entity_ids()? {
            self.delete_entity(id)?;
        }
        for id in self.memory_ids()? {
            self.delete_memory(id)?;
        }
        Ok(before)
    }

    // =========================================================================
    // TEST SUPPORT
    // =========================================================================

    /// Remove an entity row without any reference check, leaving whatever
    /// pointed at it dangling. Only used to exercise the sweep's defensive
    /// passes.
    #[cfg(test)]
    pub(crate) fn remove_entity_row_unchecked(&self, id: EntityId) -> Result<(), NotegraphError> {
        let mut table = self.txn.open_table(ENTITIES)?;
        table.remove(id.0)?;
        Ok(())
    }

    /// Remove a note row without touching its links.
    #[cfg(test)]
    pub(crate) fn remove_memory_row_unchecked(&self, id: MemoryId) -> Result<(), NotegraphError> {
        let mut table = self.txn.open_table(MEMORIES)?;
        table.remove(id.0)?;
        Ok(())
    }
}
