//! # Alias / Merge Coordinator
//!
//! Collapses two entities that fusion decided are the same thing. The
//! duplicate's dependents are migrated in a fixed order and the duplicate
//! row is deleted last:
//!
//! 1. aliases are re-pointed to the canonical entity
//! 2. note links are re-pointed (pairs that already exist are folded)
//! 3. relation endpoints are re-pointed; a resulting key collision folds the
//!    two rows by summing strength, and a relation between the pair itself
//!    would become a self-loop and is dropped
//! 4. the duplicate's own name becomes an alias of the canonical entity,
//!    even when it matches the canonical name's key
//! 5. the duplicate row is deleted
//!
//! Everything runs on the caller's [`GraphTxn`], so a merge is all or
//! nothing. Step 5 goes through `GraphTxn::delete_entity`, which refuses if
//! anything still references the duplicate; a failure there means an
//! ordering bug and aborts the transaction.

use crate::config::GraphPolicy;
use crate::extraction::FusionHint;
use crate::names::{self, NameKey};
use crate::primitives::MAX_NAME_LENGTH;
use crate::relations::RelationUpserter;
use crate::resolver::{EntityResolver, ResolvedBatch};
use crate::storage::{AliasInsert, GraphTxn};
use crate::{EntityId, NotegraphError};
use serde::Serialize;

/// What one merge moved, folded and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub canonical: EntityId,
    pub duplicate: EntityId,
    pub aliases_moved: usize,
    pub links_moved: usize,
    pub links_folded: usize,
    pub relations_moved: usize,
    pub relations_folded: usize,
    pub self_loops_dropped: usize,
    /// Whether the duplicate's name was recorded as a new alias.
    pub name_aliased: bool,
}

impl MergeReport {
    fn new(canonical: EntityId, duplicate: EntityId) -> Self {
        Self {
            canonical,
            duplicate,
            aliases_moved: 0,
            links_moved: 0,
            links_folded: 0,
            relations_moved: 0,
            relations_folded: 0,
            self_loops_dropped: 0,
            name_aliased: false,
        }
    }
}

/// What a fusion hint turned into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HintOutcome {
    /// Both names were entities; the alias side was merged away.
    Merged(MergeReport),
    /// The alias text was recorded for the primary entity.
    AliasAdded { entity: EntityId, alias: String },
    /// Nothing to do: the names already resolve to one entity.
    AlreadyKnown { entity: EntityId },
    /// The alias text already belongs to a third entity; left untouched.
    Conflict { alias: String, owner: EntityId },
    /// The primary name is unknown to the graph; hint ignored.
    UnknownPrimary { primary: String },
}

/// Executes merges and fusion hints under a [`GraphPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct MergeCoordinator<'p> {
    policy: &'p GraphPolicy,
}

impl<'p> MergeCoordinator<'p> {
    pub fn new(policy: &'p GraphPolicy) -> Self {
        Self { policy }
    }

    /// Fold `duplicate` into `canonical`.
    pub fn merge(
        &self,
        txn: &GraphTxn,
        canonical: EntityId,
        duplicate: EntityId,
    ) -> Result<MergeReport, NotegraphError> {
        if canonical == duplicate {
            return Err(NotegraphError::InvalidInput(format!(
                "cannot merge {} into itself",
                canonical
            )));
        }
        txn.require_entity(canonical)?;
        let dup = txn.require_entity(duplicate)?;
        let mut report = MergeReport::new(canonical, duplicate);

        // 1. Aliases. Alias text is unique table-wide, so none of the
        //    duplicate's aliases can already exist under canonical.
        for (key, _) in txn.aliases_of(duplicate)? {
            txn.repoint_alias(&key, canonical)?;
            report.aliases_moved += 1;
        }

        // 2. Links.
        for memory in txn.memories_of(duplicate)? {
            txn.unlink(memory, duplicate)?;
            if txn.link(memory, canonical)? {
                report.links_moved += 1;
            } else {
                report.links_folded += 1;
            }
        }

        // 3. Relations.
        self.migrate_relations(txn, canonical, duplicate, &mut report)?;

        // 4. The duplicate's name now resolves to canonical.
        match txn.insert_alias(canonical, &dup.name)? {
            AliasInsert::Inserted => report.name_aliased = true,
            AliasInsert::AlreadyPresent => {}
            AliasInsert::Taken(owner) => {
                tracing::warn!(
                    name = %dup.name,
                    owner = owner.0,
                    canonical = canonical.0,
                    "merged name is already an alias of another entity"
                );
            }
        }
        adopt_attributes(txn, canonical, &dup.attributes)?;

        // 5. Nothing references the duplicate any more.
        txn.delete_entity(duplicate)?;

        tracing::info!(
            canonical = canonical.0,
            duplicate = duplicate.0,
            aliases = report.aliases_moved,
            links = report.links_moved + report.links_folded,
            relations = report.relations_moved + report.relations_folded,
            "entities merged"
        );
        Ok(report)
    }

    fn migrate_relations(
        &self,
        txn: &GraphTxn,
        canonical: EntityId,
        duplicate: EntityId,
        report: &mut MergeReport,
    ) -> Result<(), NotegraphError> {
        let upserter = RelationUpserter::new(self.policy);
        // A survivor row never touches the duplicate, so it is not in this
        // list and folding into it cannot disturb later iterations.
        for relation in txn.relations_touching(duplicate)? {
            let swap = |id: EntityId| if id == duplicate { canonical } else { id };
            let (from, to) = (swap(relation.from), swap(relation.to));

            if from == to {
                txn.delete_relation(relation.id)?;
                report.self_loops_dropped += 1;
                continue;
            }

            let slot = upserter.slot(from, to, &relation.relation_type)?;
            match txn.relation_by_key(slot.from, slot.to, &slot.relation_type)? {
                Some(survivor_id) if survivor_id != relation.id => {
                    let survivor = txn.relation(survivor_id)?.ok_or_else(|| {
                        NotegraphError::Storage(format!("{} index is stale", survivor_id))
                    })?;
                    let strength = survivor
                        .strength
                        .add(relation.strength.value(), self.policy.strength_cap);
                    txn.set_strength(survivor_id, strength)?;
                    txn.delete_relation(relation.id)?;
                    report.relations_folded += 1;
                }
                Some(_) => {}
                None => {
                    txn.repoint_relation(relation.id, slot.from, slot.to)?;
                    report.relations_moved += 1;
                }
            }
        }
        Ok(())
    }

    /// Apply one fusion hint against the entities of the current batch.
    ///
    /// - primary and alias are different entities: merge alias into primary
    /// - only primary is known: record the alias text
    /// - primary unknown: ignore
    pub fn apply_hint(
        &self,
        txn: &GraphTxn,
        batch: &mut ResolvedBatch,
        hint: &FusionHint,
    ) -> Result<HintOutcome, NotegraphError> {
        let (primary_display, primary_key) =
            names::checked(&hint.primary, "fusion primary", MAX_NAME_LENGTH)?;
        let (alias_display, alias_key) =
            names::checked(&hint.alias, "fusion alias", MAX_NAME_LENGTH)?;

        let resolver = EntityResolver::new(self.policy);
        let primary = match batch.get(&primary_display) {
            Some(id) => Some(id),
            None => resolver.find_any_kind(txn, &primary_key)?,
        };
        let Some(primary) = primary else {
            tracing::debug!(primary = %primary_display, "fusion hint names an unknown entity");
            return Ok(HintOutcome::UnknownPrimary {
                primary: primary_display,
            });
        };
        if primary_key == alias_key {
            return Ok(HintOutcome::AlreadyKnown { entity: primary });
        }

        match self.alias_entity(txn, batch, &alias_display, &alias_key)? {
            Some(other) if other == primary => Ok(HintOutcome::AlreadyKnown { entity: primary }),
            Some(other) => {
                let report = self.merge(txn, primary, other)?;
                batch.redirect(other, primary);
                Ok(HintOutcome::Merged(report))
            }
            None => match txn.insert_alias(primary, &alias_display)? {
                AliasInsert::Inserted => {
                    tracing::debug!(entity = primary.0, alias = %alias_display, "alias recorded");
                    Ok(HintOutcome::AliasAdded {
                        entity: primary,
                        alias: alias_display,
                    })
                }
                AliasInsert::AlreadyPresent => Ok(HintOutcome::AlreadyKnown { entity: primary }),
                AliasInsert::Taken(owner) => {
                    tracing::warn!(
                        alias = %alias_display,
                        owner = owner.0,
                        primary = primary.0,
                        "fusion alias already belongs to another entity"
                    );
                    Ok(HintOutcome::Conflict {
                        alias: alias_display,
                        owner,
                    })
                }
            },
        }
    }

    /// The entity the alias side of a hint currently names: a batch
    /// resolution, else an entity with that exact name. An existing alias
    /// row alone does not count; `insert_alias` reports those.
    fn alias_entity(
        &self,
        txn: &GraphTxn,
        batch: &ResolvedBatch,
        alias_display: &str,
        alias_key: &NameKey,
    ) -> Result<Option<EntityId>, NotegraphError> {
        if let Some(id) = batch.get(alias_display) {
            return Ok(Some(id));
        }
        Ok(txn.entities_named(alias_key)?.first().copied())
    }
}

/// Give canonical the attribute keys only the duplicate had.
fn adopt_attributes(
    txn: &GraphTxn,
    canonical: EntityId,
    attributes: &std::collections::BTreeMap<String, String>,
) -> Result<(), NotegraphError> {
    let mut entity = txn.require_entity(canonical)?;
    let mut changed = false;
    for (key, value) in attributes {
        if !entity.attributes.contains_key(key) {
            entity.attributes.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    if changed {
        entity.updated_at = txn.now();
        txn.put_entity(&entity)?;
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
