//! # Relation Upserter
//!
//! Inserts a typed edge or strengthens the existing one. Relation types are
//! normalized like names ("Works  At" and "works at" are one type). Types
//! listed in `GraphPolicy::symmetric_relations` are stored with the lower
//! entity id first, so (a, b) and (b, a) land on the same row.

use crate::config::GraphPolicy;
use crate::names;
use crate::primitives::MAX_RELATION_LABEL_LENGTH;
use crate::storage::GraphTxn;
use crate::{EntityId, NotegraphError, RelationId, Strength};

/// Endpoint order and key a relation is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSlot {
    pub from: EntityId,
    pub to: EntityId,
    pub relation_type: String,
}

/// Upserts relations according to a [`GraphPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct RelationUpserter<'p> {
    policy: &'p GraphPolicy,
}

impl<'p> RelationUpserter<'p> {
    pub fn new(policy: &'p GraphPolicy) -> Self {
        Self { policy }
    }

    /// Normalize a label and order the endpoints per the symmetry policy.
    pub fn slot(
        &self,
        from: EntityId,
        to: EntityId,
        label: &str,
    ) -> Result<RelationSlot, NotegraphError> {
        let (_, key) = names::checked(label, "relation type", MAX_RELATION_LABEL_LENGTH)?;
        let relation_type = key.as_str().to_string();
        let (from, to) = if self.policy.is_symmetric(&relation_type) && to < from {
            (to, from)
        } else {
            (from, to)
        };
        Ok(RelationSlot {
            from,
            to,
            relation_type,
        })
    }

    /// Add `evidence` to the (from, to, type) relation, creating it with
    /// strength = `evidence` if absent.
    pub fn upsert(
        &self,
        txn: &GraphTxn,
        from: EntityId,
        to: EntityId,
        label: &str,
        evidence: i64,
    ) -> Result<RelationId, NotegraphError> {
        if evidence < 1 {
            return Err(NotegraphError::InvalidInput(format!(
                "relation evidence must be at least 1, got {}",
                evidence
            )));
        }
        if from == to {
            return Err(NotegraphError::InvalidInput(format!(
                "relation '{}' would connect {} to itself",
                label, from
            )));
        }
        for endpoint in [from, to] {
            if !txn.entity_exists(endpoint)? {
                return Err(NotegraphError::EntityNotFound(endpoint));
            }
        }

        let slot = self.slot(from, to, label)?;
        if let Some(id) = txn.relation_by_key(slot.from, slot.to, &slot.relation_type)? {
            let relation = txn
                .relation(id)?
                .ok_or_else(|| NotegraphError::Storage(format!("{} index is stale", id)))?;
            let strength = relation.strength.add(evidence, self.policy.strength_cap);
            txn.set_strength(id, strength)?;
            tracing::debug!(
                relation = id.0,
                relation_type = %slot.relation_type,
                strength = strength.value(),
                "relation strengthened"
            );
            return Ok(id);
        }

        let initial = Strength::default().add(evidence, self.policy.strength_cap);
        let relation = txn.insert_relation(slot.from, slot.to, &slot.relation_type, initial)?;
        tracing::debug!(
            relation = relation.id.0,
            from = slot.from.0,
            to = slot.to.0,
            relation_type = %slot.relation_type,
            "relation created"
        );
        Ok(relation.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityKind;
    use crate::storage::RedbStore;
    use std::collections::BTreeMap;

    fn two_people(txn: &GraphTxn) -> (EntityId, EntityId) {
        let a = txn
            .insert_entity(EntityKind::Person, "Alice", BTreeMap::new())
            .expect("alice");
        let b = txn
            .insert_entity(EntityKind::Organization, "Acme", BTreeMap::new())
            .expect("acme");
        (a.id, b.id)
    }

    #[test]
    fn repeated_upsert_accumulates() {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy::default();
        let upserter = RelationUpserter::new(&policy);
        let txn = store.write().expect("write");
        let (alice, acme) = two_people(&txn);

        let first = upserter.upsert(&txn, alice, acme, "works at", 1).expect("upsert");
        let second = upserter.upsert(&txn, alice, acme, "Works  At", 1).expect("upsert");

        assert_eq!(first, second);
        let relations = txn.relations().expect("relations");
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].strength, Strength::new(2));
        assert_eq!(relations[0].relation_type, "works at");
    }

    #[test]
    fn direction_matters_by_default() {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy::default();
        let upserter = RelationUpserter::new(&policy);
        let txn = store.write().expect("write");
        let (alice, acme) = two_people(&txn);

        let forward = upserter.upsert(&txn, alice, acme, "knows", 1).expect("upsert");
        let backward = upserter.upsert(&txn, acme, alice, "knows", 1).expect("upsert");
        assert_ne!(forward, backward);
    }

    #[test]
    fn symmetric_types_share_a_row() {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy::default().with_symmetric("sibling of");
        let upserter = RelationUpserter::new(&policy);
        let txn = store.write().expect("write");
        let (alice, acme) = two_people(&txn);

        let forward = upserter.upsert(&txn, acme, alice, "sibling of", 1).expect("upsert");
        let backward = upserter.upsert(&txn, alice, acme, "Sibling of", 2).expect("upsert");
        assert_eq!(forward, backward);

        let relation = txn.relation(forward).expect("read").expect("row");
        assert_eq!(relation.from, alice.min(acme));
        assert_eq!(relation.strength, Strength::new(3));
    }

    #[test]
    fn cap_bounds_strength() {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy {
            strength_cap: Some(3),
            ..GraphPolicy::default()
        };
        let upserter = RelationUpserter::new(&policy);
        let txn = store.write().expect("write");
        let (alice, acme) = two_people(&txn);

        for _ in 0..5 {
            upserter.upsert(&txn, alice, acme, "visits", 1).expect("upsert");
        }
        assert_eq!(txn.relations().expect("relations")[0].strength, Strength::new(3));
    }

    #[test]
    fn bad_input_is_rejected() {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy::default();
        let upserter = RelationUpserter::new(&policy);
        let txn = store.write().expect("write");
        let (alice, acme) = two_people(&txn);

        assert!(matches!(
            upserter.upsert(&txn, alice, alice, "knows", 1),
            Err(NotegraphError::InvalidInput(_))
        ));
        assert!(matches!(
            upserter.upsert(&txn, alice, acme, "knows", 0),
            Err(NotegraphError::InvalidInput(_))
        ));
        assert!(matches!(
            upserter.upsert(&txn, alice, EntityId(404), "knows", 1),
            Err(NotegraphError::EntityNotFound(EntityId(404)))
        ));
        assert!(matches!(
            upserter.upsert(&txn, alice, acme, "  ", 1),
            Err(NotegraphError::InvalidInput(_))
        ));
    }
}
