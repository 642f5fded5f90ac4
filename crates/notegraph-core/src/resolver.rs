//! # Entity Resolver
//!
//! Maps a mentioned name and kind onto an entity id, creating the entity on
//! a miss. Lookup order:
//!
//! 1. exact (kind, name) through the name index
//! 2. the alias table (kind-agnostic: an alias names one entity)
//! 3. with `match_across_kinds`, the same name under any other kind
//! 4. create
//!
//! All lookups run inside the caller's write transaction, so within one
//! extraction batch a second mention of a freshly created name finds the
//! first one's row instead of creating a duplicate.
//!
//! Ambiguity (the exact match and an alias disagree, or several kinds share
//! the name) is not an error: the first stable match wins and a warning is
//! logged.

use crate::config::GraphPolicy;
use crate::extraction::EntityMention;
use crate::names::{self, NameKey};
use crate::primitives::MAX_NAME_LENGTH;
use crate::storage::GraphTxn;
use crate::{EntityId, EntityKind, NotegraphError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Which lookup step produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedVia {
    Name,
    Alias,
    OtherKind,
    Created,
}

/// Result of resolving one mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub id: EntityId,
    /// Display form of the mentioned name.
    pub name: String,
    pub via: ResolvedVia,
    pub ambiguous: bool,
}

/// Resolved mentions of one extraction batch.
///
/// `by_name` serves relation endpoints, which carry no kind: the first
/// mention of a name wins. Links come from `resolutions`, so two kinds
/// sharing a name each get linked.
#[derive(Debug, Clone, Default)]
pub struct ResolvedBatch {
    by_name: BTreeMap<NameKey, EntityId>,
    pub resolutions: Vec<Resolution>,
}

impl ResolvedBatch {
    /// Entity a name in this batch resolved to.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<EntityId> {
        NameKey::new(name).and_then(|key| self.by_name.get(&key).copied())
    }

    #[must_use]
    pub fn entity_ids(&self) -> BTreeSet<EntityId> {
        self.resolutions.iter().map(|r| r.id).collect()
    }

    /// Point every name that resolved to `from` at `to`, after a merge.
    pub fn redirect(&mut self, from: EntityId, to: EntityId) {
        for id in self.by_name.values_mut() {
            if *id == from {
                *id = to;
            }
        }
        for resolution in &mut self.resolutions {
            if resolution.id == from {
                resolution.id = to;
            }
        }
    }

    #[must_use]
    pub fn created(&self) -> usize {
        self.resolutions
            .iter()
            .filter(|r| r.via == ResolvedVia::Created)
            .count()
    }

    #[must_use]
    pub fn ambiguous(&self) -> usize {
        self.resolutions.iter().filter(|r| r.ambiguous).count()
    }
}

/// Name → entity resolution against an open write transaction.
#[derive(Debug, Clone, Copy)]
pub struct EntityResolver<'p> {
    policy: &'p GraphPolicy,
}

impl<'p> EntityResolver<'p> {
    pub fn new(policy: &'p GraphPolicy) -> Self {
        Self { policy }
    }

    /// Resolve `name` as `kind`, creating the entity on a miss. Attributes
    /// are merged into the resolved entity.
    pub fn resolve(
        &self,
        txn: &GraphTxn,
        kind: EntityKind,
        name: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<Resolution, NotegraphError> {
        let (shown, key) = names::checked(name, "entity name", MAX_NAME_LENGTH)?;

        if let Some(found) = self.find(txn, kind, &key, &shown)? {
            merge_attributes(txn, found.id, attributes)?;
            return Ok(found);
        }

        let entity = txn.insert_entity(kind, &shown, attributes.clone())?;
        tracing::debug!(entity = entity.id.0, kind = %kind, name = %shown, "entity created");
        Ok(Resolution {
            id: entity.id,
            name: shown,
            via: ResolvedVia::Created,
            ambiguous: false,
        })
    }

    /// Resolve every mention of a batch in order.
    pub fn resolve_all(
        &self,
        txn: &GraphTxn,
        mentions: &[EntityMention],
    ) -> Result<ResolvedBatch, NotegraphError> {
        let mut batch = ResolvedBatch::default();
        for mention in mentions {
            let resolution = self.resolve(txn, mention.kind, &mention.name, &mention.attributes)?;
            if let Some(key) = NameKey::new(&mention.name) {
                batch.by_name.entry(key).or_insert(resolution.id);
            }
            batch.resolutions.push(resolution);
        }
        Ok(batch)
    }

    /// Lookup without creating.
    pub fn find(
        &self,
        txn: &GraphTxn,
        kind: EntityKind,
        key: &NameKey,
        shown: &str,
    ) -> Result<Option<Resolution>, NotegraphError> {
        let exact = txn.entity_by_name(kind, key)?;
        let aliased = txn.alias(key)?.map(|alias| alias.entity_id);

        let found = match (exact, aliased) {
            (Some(id), aliased) => {
                let ambiguous = aliased.is_some_and(|other| other != id);
                if ambiguous {
                    tracing::warn!(
                        name = %shown,
                        chosen = id.0,
                        alias_of = aliased.map(|a| a.0),
                        "ambiguous resolution: name and alias point at different entities"
                    );
                }
                Some((id, ResolvedVia::Name, ambiguous))
            }
            (None, Some(id)) => Some((id, ResolvedVia::Alias, false)),
            (None, None) if self.policy.match_across_kinds => {
                let named = txn.entities_named(key)?;
                let ambiguous = named.len() > 1;
                if ambiguous {
                    tracing::warn!(
                        name = %shown,
                        candidates = named.len(),
                        "ambiguous resolution: name exists under several kinds"
                    );
                }
                named
                    .first()
                    .map(|&id| (id, ResolvedVia::OtherKind, ambiguous))
            }
            (None, None) => None,
        };

        Ok(found.map(|(id, via, ambiguous)| Resolution {
            id,
            name: shown.to_string(),
            via,
            ambiguous,
        }))
    }

    /// Kind-agnostic lookup: the name under any kind (lowest id), then the
    /// alias table. Used for names that arrive without a kind, such as
    /// fusion hints.
    pub fn find_any_kind(
        &self,
        txn: &GraphTxn,
        key: &NameKey,
    ) -> Result<Option<EntityId>, NotegraphError> {
        if let Some(&id) = txn.entities_named(key)?.first() {
            return Ok(Some(id));
        }
        Ok(txn.alias(key)?.map(|alias| alias.entity_id))
    }
}

/// Overwrite matching keys and add new ones. Returns whether the row changed.
fn merge_attributes(
    txn: &GraphTxn,
    id: EntityId,
    attributes: &BTreeMap<String, String>,
) -> Result<bool, NotegraphError> {
    if attributes.is_empty() {
        return Ok(false);
    }
    let mut entity = txn.require_entity(id)?;
    let mut changed = false;
    for (key, value) in attributes {
        if entity.attributes.get(key) != Some(value) {
            entity.attributes.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    if changed {
        entity.updated_at = txn.now();
        txn.put_entity(&entity)?;
    }
    Ok(changed)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RedbStore;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn miss_creates_then_hit_reuses() {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy::default();
        let resolver = EntityResolver::new(&policy);
        let txn = store.write().expect("write");

        let first = resolver
            .resolve(&txn, EntityKind::Person, "Li Ming", &BTreeMap::new())
            .expect("resolve");
        let second = resolver
            .resolve(&txn, EntityKind::Person, "  li   MING ", &BTreeMap::new())
            .expect("resolve");

        assert_eq!(first.via, ResolvedVia::Created);
        assert_eq!(second.via, ResolvedVia::Name);
        assert_eq!(first.id, second.id);
        assert_eq!(txn.require_entity(first.id).expect("row").name, "Li Ming");
    }

    #[test]
    fn batch_is_idempotent() {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy::default();
        let resolver = EntityResolver::new(&policy);
        let txn = store.write().expect("write");

        let mentions = vec![
            EntityMention::new(EntityKind::Person, "Alice"),
            EntityMention::new(EntityKind::Person, "ALICE"),
            EntityMention::new(EntityKind::Organization, "Acme"),
        ];
        let batch = resolver.resolve_all(&txn, &mentions).expect("batch");

        assert_eq!(batch.resolutions.len(), 3);
        assert_eq!(batch.created(), 2);
        assert_eq!(batch.entity_ids().len(), 2);
        assert_eq!(batch.get("alice"), Some(batch.resolutions[0].id));
        assert_eq!(txn.stats().expect("stats").entities, 2);
    }

    #[test]
    fn alias_resolves_to_owner() {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy::default();
        let resolver = EntityResolver::new(&policy);
        let txn = store.write().expect("write");

        let li = resolver
            .resolve(&txn, EntityKind::Person, "Li Ming", &BTreeMap::new())
            .expect("resolve");
        txn.insert_alias(li.id, "my older brother").expect("alias");

        let via_alias = resolver
            .resolve(&txn, EntityKind::Person, "My older brother", &BTreeMap::new())
            .expect("resolve");
        assert_eq!(via_alias.id, li.id);
        assert_eq!(via_alias.via, ResolvedVia::Alias);
    }

    #[test]
    fn exact_match_beats_conflicting_alias() {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy::default();
        let resolver = EntityResolver::new(&policy);
        let txn = store.write().expect("write");

        let paris_city = resolver
            .resolve(&txn, EntityKind::Location, "Paris", &BTreeMap::new())
            .expect("resolve");
        let hilton = resolver
            .resolve(&txn, EntityKind::Person, "Paris Hilton", &BTreeMap::new())
            .expect("resolve");
        txn.insert_alias(hilton.id, "Paris").expect("alias");

        let resolved = resolver
            .resolve(&txn, EntityKind::Location, "paris", &BTreeMap::new())
            .expect("resolve");
        assert_eq!(resolved.id, paris_city.id);
        assert!(resolved.ambiguous);
    }

    #[test]
    fn kinds_stay_apart_unless_policy_allows() {
        let store = RedbStore::open_in_memory().expect("store");
        let strict = GraphPolicy::default();
        let loose = GraphPolicy {
            match_across_kinds: true,
            ..GraphPolicy::default()
        };
        let txn = store.write().expect("write");

        let org = EntityResolver::new(&strict)
            .resolve(&txn, EntityKind::Organization, "Apple", &BTreeMap::new())
            .expect("resolve");
        let fruit = EntityResolver::new(&strict)
            .resolve(&txn, EntityKind::Other, "Apple", &BTreeMap::new())
            .expect("resolve");
        assert_ne!(org.id, fruit.id);

        let event = EntityResolver::new(&loose)
            .resolve(&txn, EntityKind::Event, "apple", &BTreeMap::new())
            .expect("resolve");
        assert_eq!(event.id, org.id);
        assert_eq!(event.via, ResolvedVia::OtherKind);
        assert!(event.ambiguous);
    }

    #[test]
    fn attributes_merge_on_later_mentions() {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy::default();
        let resolver = EntityResolver::new(&policy);
        let txn = store.write().expect("write");

        let first = resolver
            .resolve(
                &txn,
                EntityKind::Person,
                "Alice",
                &attrs(&[("role", "engineer"), ("city", "Oslo")]),
            )
            .expect("resolve");
        resolver
            .resolve(&txn, EntityKind::Person, "Alice", &attrs(&[("role", "manager")]))
            .expect("resolve");

        let entity = txn.require_entity(first.id).expect("row");
        assert_eq!(entity.attributes, attrs(&[("city", "Oslo"), ("role", "manager")]));
    }

    #[test]
    fn same_name_under_two_kinds_yields_both_ids() {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy::default();
        let resolver = EntityResolver::new(&policy);
        let txn = store.write().expect("write");

        let mentions = vec![
            EntityMention::new(EntityKind::Organization, "Apple"),
            EntityMention::new(EntityKind::Other, "apple"),
        ];
        let mut batch = resolver.resolve_all(&txn, &mentions).expect("batch");
        let org = batch.resolutions[0].id;
        let fruit = batch.resolutions[1].id;

        assert_ne!(org, fruit);
        assert_eq!(batch.entity_ids(), BTreeSet::from([org, fruit]));
        assert_eq!(batch.get("APPLE"), Some(org));

        batch.redirect(fruit, org);
        assert_eq!(batch.entity_ids(), BTreeSet::from([org]));
    }

    #[test]
    fn blank_names_are_rejected() {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy::default();
        let txn = store.write().expect("write");
        let result =
            EntityResolver::new(&policy).resolve(&txn, EntityKind::Person, " ", &BTreeMap::new());
        assert!(matches!(result, Err(NotegraphError::InvalidInput(_))));
    }
}
