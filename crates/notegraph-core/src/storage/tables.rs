//! Table definitions and decode helpers shared by [`GraphTxn`](super::GraphTxn)
//! and [`GraphView`](super::GraphView).
//!
//! Row structs are postcard-encoded. Composite string keys join their parts
//! with the unit separator `\u{1f}`; normalization strips control characters,
//! so no name can contain it.

use crate::names::NameKey;
use crate::{Alias, EntityId, EntityKind, NotegraphError};
use redb::{ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Entity rows: id -> postcard `Entity`.
pub(crate) const ENTITIES: TableDefinition<u64, &[u8]> = TableDefinition::new("entities");

/// Name index: `kind \x1f key` -> entity id. Enforces unique (kind, name).
pub(crate) const ENTITY_NAMES: TableDefinition<&str, u64> = TableDefinition::new("entity_names");

/// Aliases: normalized alias -> postcard `Alias`. The key makes alias text
/// unique across the whole table.
pub(crate) const ALIASES: TableDefinition<&str, &[u8]> = TableDefinition::new("aliases");

/// Relation rows: id -> postcard `Relation`.
pub(crate) const RELATIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("relations");

/// Relation index: `from \x1f to \x1f type` -> relation id.
pub(crate) const RELATION_KEYS: TableDefinition<&str, u64> =
    TableDefinition::new("relation_keys");

/// Note rows: id -> postcard `Memory`.
pub(crate) const MEMORIES: TableDefinition<u64, &[u8]> = TableDefinition::new("memories");

/// Links keyed (memory, entity).
pub(crate) const LINKS: TableDefinition<(u64, u64), ()> = TableDefinition::new("links");

/// The same links keyed (entity, memory) for orphan detection.
pub(crate) const LINKS_BY_ENTITY: TableDefinition<(u64, u64), ()> =
    TableDefinition::new("links_by_entity");

/// Counters: name -> last issued id.
pub(crate) const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

pub(crate) const NEXT_ENTITY_ID: &str = "next_entity_id";
pub(crate) const NEXT_RELATION_ID: &str = "next_relation_id";
pub(crate) const NEXT_MEMORY_ID: &str = "next_memory_id";

// =============================================================================
// KEYS
// =============================================================================

pub(crate) fn name_index_key(kind: EntityKind, key: &NameKey) -> String {
    format!("{}\u{1f}{}", kind.label(), key.as_str())
}

pub(crate) fn relation_key(from: EntityId, to: EntityId, relation_type: &str) -> String {
    format!("{:020}\u{1f}{:020}\u{1f}{}", from.0, to.0, relation_type)
}

// =============================================================================
// ENCODING
// =============================================================================

pub(crate) fn encode<T: Serialize>(row: &T) -> Result<Vec<u8>, NotegraphError> {
    Ok(postcard::to_allocvec(row)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, NotegraphError> {
    Ok(postcard::from_bytes(bytes)?)
}

// =============================================================================
// READ HELPERS
// =============================================================================

pub(crate) fn get_row<T, R>(table: &T, id: u64) -> Result<Option<R>, NotegraphError>
where
    T: ReadableTable<u64, &'static [u8]>,
    R: DeserializeOwned,
{
    match table.get(id)? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn scan_rows<T, R>(table: &T) -> Result<Vec<R>, NotegraphError>
where
    T: ReadableTable<u64, &'static [u8]>,
    R: DeserializeOwned,
{
    let mut rows = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        rows.push(decode(value.value())?);
    }
    Ok(rows)
}

pub(crate) fn scan_ids<T>(table: &T) -> Result<Vec<u64>, NotegraphError>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    let mut ids = Vec::new();
    for entry in table.iter()? {
        let (key, _) = entry?;
        ids.push(key.value());
    }
    Ok(ids)
}

pub(crate) fn get_index<T>(table: &T, key: &str) -> Result<Option<u64>, NotegraphError>
where
    T: ReadableTable<&'static str, u64>,
{
    Ok(table.get(key)?.map(|guard| guard.value()))
}

pub(crate) fn get_alias<T>(table: &T, key: &NameKey) -> Result<Option<Alias>, NotegraphError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key.as_str())? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

pub(crate) fn scan_aliases<T>(table: &T) -> Result<Vec<(NameKey, Alias)>, NotegraphError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in table.iter()? {
        let (key, value) = entry?;
        rows.push((
            NameKey::from_normalized(key.value()),
            decode(value.value())?,
        ));
    }
    Ok(rows)
}

/// Second components of every pair whose first component is `first`.
pub(crate) fn pair_range<T>(table: &T, first: u64) -> Result<Vec<u64>, NotegraphError>
where
    T: ReadableTable<(u64, u64), ()>,
{
    let mut seconds = Vec::new();
    for entry in table.range((first, 0u64)..=(first, u64::MAX))? {
        let (key, _) = entry?;
        seconds.push(key.value().1);
    }
    Ok(seconds)
}

pub(crate) fn scan_pairs<T>(table: &T) -> Result<Vec<(u64, u64)>, NotegraphError>
where
    T: ReadableTable<(u64, u64), ()>,
{
    let mut pairs = Vec::new();
    for entry in table.iter()? {
        let (key, _) = entry?;
        pairs.push(key.value());
    }
    Ok(pairs)
}
