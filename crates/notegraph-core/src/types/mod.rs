//! # Core Type Definitions
//!
//! This module contains the row types of the notegraph knowledge graph:
//! - Identifiers (`EntityId`, `RelationId`, `MemoryId`)
//! - Graph rows (`Entity`, `Alias`, `Relation`, `Memory`)
//! - Relation strength (`Strength`)
//! - Error type (`NotegraphError`)
//!
//! ## Determinism Guarantees
//!
//! - Attribute maps are `BTreeMap` so serialized rows are byte-stable
//! - Strength uses saturating integer arithmetic, never floats
//! - Identifiers implement `Ord` for deterministic iteration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Surrogate key of an entity row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

/// Surrogate key of a relation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(pub u64);

/// Surrogate key of a note in the note store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "relation#{}", self.0)
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory#{}", self.0)
    }
}

// =============================================================================
// ENTITY KIND
// =============================================================================

/// Closed vocabulary of entity types.
///
/// Labels coming from the extractor are matched case-insensitively; anything
/// outside the vocabulary lands in `Other` rather than being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Person,
    Location,
    Event,
    Time,
    Organization,
    Other,
}

impl EntityKind {
    /// All kinds, in storage order.
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Person,
        EntityKind::Location,
        EntityKind::Event,
        EntityKind::Time,
        EntityKind::Organization,
        EntityKind::Other,
    ];

    /// Canonical label used on the wire and in storage keys.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            EntityKind::Person => "Person",
            EntityKind::Location => "Location",
            EntityKind::Event => "Event",
            EntityKind::Time => "Time",
            EntityKind::Organization => "Organization",
            EntityKind::Other => "Other",
        }
    }

    /// Map a free-form label onto the vocabulary.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let trimmed = label.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(trimmed))
            .unwrap_or(EntityKind::Other)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for EntityKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for EntityKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(EntityKind::from_label(&label))
    }
}

// =============================================================================
// STRENGTH
// =============================================================================

/// Accumulated evidence behind a relation.
///
/// Uses i64 with saturating arithmetic so repeated evidence never overflows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Strength(pub i64);

impl Strength {
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Add evidence, saturating at `i64::MAX` and clamping to `cap` if set.
    #[must_use]
    pub fn add(self, evidence: i64, cap: Option<i64>) -> Self {
        let raw = self.0.saturating_add(evidence);
        match cap {
            Some(limit) => Self(raw.min(limit)),
            None => Self(raw),
        }
    }

    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

// =============================================================================
// ROWS
// =============================================================================

/// A graph node: a person, place, event, time reference or organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Display name, casing preserved.
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An alternate name that resolves to an existing entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub entity_id: EntityId,
    /// Alias text as first recorded.
    pub alias: String,
    pub created_at: DateTime<Utc>,
}

/// A directed, typed, weighted edge between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub from: EntityId,
    pub to: EntityId,
    /// Normalized relation label.
    pub relation_type: String,
    pub strength: Strength,
    pub created_at: DateTime<Utc>,
}

/// A note as held by the note store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row counts across every table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub entities: usize,
    pub aliases: usize,
    pub relations: usize,
    pub links: usize,
    pub memories: usize,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in notegraph operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotegraphError {
    /// The extraction collaborator failed; nothing was written.
    #[error("Extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    /// Caller-supplied data was rejected before any write.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Memory not found: {0}")]
    MemoryNotFound(MemoryId),

    /// A write would have broken referential integrity; the transaction was
    /// rolled back.
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    /// The sweep transaction failed and was rolled back.
    #[error("Sweep failed: {0}")]
    SweepFailure(String),

    /// The note was committed but the graph transaction that followed it
    /// failed at `step`.
    #[error("Graph update for {memory} failed while {step}: {reason}")]
    GraphUpdateFailed {
        memory: MemoryId,
        step: String,
        reason: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<redb::DatabaseError> for NotegraphError {
    fn from(e: redb::DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TransactionError> for NotegraphError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TableError> for NotegraphError {
    fn from(e: redb::TableError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::StorageError> for NotegraphError {
    fn from(e: redb::StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::CommitError> for NotegraphError {
    fn from(e: redb::CommitError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<postcard::Error> for NotegraphError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_saturates() {
        let strength = Strength::new(i64::MAX);
        assert_eq!(strength.add(5, None).value(), i64::MAX);
    }

    #[test]
    fn strength_respects_cap() {
        let strength = Strength::new(9);
        assert_eq!(strength.add(3, Some(10)).value(), 10);
        assert_eq!(strength.add(1, None).value(), 10);
    }

    #[test]
    fn kind_labels_are_case_insensitive() {
        assert_eq!(EntityKind::from_label("person"), EntityKind::Person);
        assert_eq!(EntityKind::from_label(" ORGANIZATION "), EntityKind::Organization);
        assert_eq!(EntityKind::from_label("gadget"), EntityKind::Other);
    }

    #[test]
    fn kind_round_trips_through_postcard() {
        let bytes = postcard::to_allocvec(&EntityKind::Location).expect("encode");
        let kind: EntityKind = postcard::from_bytes(&bytes).expect("decode");
        assert_eq!(kind, EntityKind::Location);
    }

    #[test]
    fn error_messages_name_the_row() {
        let err = NotegraphError::EntityNotFound(EntityId(7));
        assert_eq!(err.to_string(), "Entity not found: entity#7");
    }
}
