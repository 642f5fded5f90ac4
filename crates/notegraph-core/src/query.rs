//! # Query Module
//!
//! Read-side views over a [`GraphView`] snapshot: name lookup, fragment
//! search, the entity profile and the whole-graph export.
//!
//! - Deterministic ordering everywhere (ids, then names)
//! - Exports skip edges whose endpoints are missing instead of failing

use crate::names::NameKey;
use crate::storage::GraphView;
use crate::{Entity, EntityId, EntityKind, Memory, MemoryId, NotegraphError, RelationId};
use serde::Serialize;
use std::collections::BTreeMap;

// =============================================================================
// LOOKUP / SEARCH / LISTINGS
// =============================================================================

/// Resolve a bare name: exact name under any kind (lowest id), then alias.
pub fn lookup(view: &GraphView, name: &str) -> Result<Option<EntityId>, NotegraphError> {
    let Some(key) = NameKey::new(name) else {
        return Ok(None);
    };
    if let Some(&id) = view.entities_named(&key)?.first() {
        return Ok(Some(id));
    }
    Ok(view.alias(&key)?.map(|alias| alias.entity_id))
}

/// Entities whose name or one of whose aliases contains `fragment`,
/// case-insensitively. Sorted like [`entities`].
pub fn search(view: &GraphView, fragment: &str) -> Result<Vec<Entity>, NotegraphError> {
    let Some(needle) = NameKey::new(fragment) else {
        return Ok(Vec::new());
    };
    let needle = needle.as_str();

    let mut alias_hits = std::collections::BTreeSet::new();
    for (key, alias) in view.aliases()? {
        if key.as_str().contains(needle) {
            alias_hits.insert(alias.entity_id);
        }
    }

    Ok(entities(view)?
        .into_iter()
        .filter(|entity| {
            alias_hits.contains(&entity.id)
                || NameKey::new(&entity.name).is_some_and(|key| key.as_str().contains(needle))
        })
        .collect())
}

/// All entities ordered by (kind, normalized name).
pub fn entities(view: &GraphView) -> Result<Vec<Entity>, NotegraphError> {
    let mut all = view.entities()?;
    all.sort_by_cached_key(|entity| {
        (
            entity.kind,
            NameKey::new(&entity.name).map(|key| key.as_str().to_string()),
            entity.id,
        )
    });
    Ok(all)
}

/// All notes, newest first.
pub fn memories(view: &GraphView) -> Result<Vec<Memory>, NotegraphError> {
    let mut all = view.memories()?;
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(all)
}

/// Notes linked to `entity`, newest first.
pub fn memories_of(view: &GraphView, entity: EntityId) -> Result<Vec<Memory>, NotegraphError> {
    let mut notes = Vec::new();
    for id in view.memories_of(entity)?.into_iter().rev() {
        if let Some(memory) = view.memory(id)? {
            notes.push(memory);
        }
    }
    Ok(notes)
}

// =============================================================================
// PROFILE
// =============================================================================

/// A relation with both endpoint names filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationView {
    pub id: RelationId,
    pub from: EntityId,
    pub from_name: String,
    pub to: EntityId,
    pub to_name: String,
    pub relation_type: String,
    pub strength: i64,
}

/// Everything known about one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityProfile {
    pub entity: Entity,
    pub aliases: Vec<String>,
    pub notes: Vec<Memory>,
    pub relations: Vec<RelationView>,
}

impl EntityProfile {
    pub fn load(view: &GraphView, id: EntityId) -> Result<Self, NotegraphError> {
        let entity = view.entity(id)?.ok_or(NotegraphError::EntityNotFound(id))?;
        let aliases = view
            .aliases_of(id)?
            .into_iter()
            .map(|alias| alias.alias)
            .collect();
        let notes = memories_of(view, id)?;

        let mut names: BTreeMap<EntityId, String> = BTreeMap::new();
        let mut relations = Vec::new();
        for relation in view.relations()? {
            if relation.from != id && relation.to != id {
                continue;
            }
            let (Some(from_name), Some(to_name)) = (
                endpoint_name(view, &mut names, relation.from)?,
                endpoint_name(view, &mut names, relation.to)?,
            ) else {
                continue;
            };
            relations.push(RelationView {
                id: relation.id,
                from: relation.from,
                from_name,
                to: relation.to,
                to_name,
                relation_type: relation.relation_type,
                strength: relation.strength.value(),
            });
        }

        Ok(Self {
            entity,
            aliases,
            notes,
            relations,
        })
    }
}

fn endpoint_name(
    view: &GraphView,
    cache: &mut BTreeMap<EntityId, String>,
    id: EntityId,
) -> Result<Option<String>, NotegraphError> {
    if let Some(name) = cache.get(&id) {
        return Ok(Some(name.clone()));
    }
    let name = view.entity(id)?.map(|entity| entity.name);
    if let Some(name) = &name {
        cache.insert(id, name.clone());
    }
    Ok(name)
}

// =============================================================================
// EXPORT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub aliases: Vec<String>,
    pub notes: Vec<MemoryId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub id: RelationId,
    pub from: EntityId,
    pub to: EntityId,
    pub label: String,
    pub strength: i64,
}

/// Nodes and directed labeled edges, for visualisation front ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphExport {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphExport {
    pub fn from_view(view: &GraphView) -> Result<Self, NotegraphError> {
        let mut aliases: BTreeMap<EntityId, Vec<String>> = BTreeMap::new();
        for (_, alias) in view.aliases()? {
            aliases.entry(alias.entity_id).or_default().push(alias.alias);
        }
        let mut notes: BTreeMap<EntityId, Vec<MemoryId>> = BTreeMap::new();
        for (memory, entity) in view.links()? {
            notes.entry(entity).or_default().push(memory);
        }

        let nodes: Vec<GraphNode> = view
            .entities()?
            .into_iter()
            .map(|entity| GraphNode {
                aliases: aliases.remove(&entity.id).unwrap_or_default(),
                notes: notes.remove(&entity.id).unwrap_or_default(),
                id: entity.id,
                kind: entity.kind,
                name: entity.name,
            })
            .collect();

        let known: std::collections::BTreeSet<EntityId> = nodes.iter().map(|n| n.id).collect();
        let edges = view
            .relations()?
            .into_iter()
            .filter(|r| known.contains(&r.from) && known.contains(&r.to))
            .map(|r| GraphEdge {
                id: r.id,
                from: r.from,
                to: r.to,
                label: r.relation_type,
                strength: r.strength.value(),
            })
            .collect();

        Ok(Self { nodes, edges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphPolicy;
    use crate::relations::RelationUpserter;
    use crate::storage::RedbStore;
    use std::collections::BTreeMap as Attrs;

    fn seeded() -> (RedbStore, EntityId, EntityId) {
        let store = RedbStore::open_in_memory().expect("store");
        let policy = GraphPolicy::default();
        let txn = store.write().expect("write");
        let li = txn
            .insert_entity(EntityKind::Person, "Li Ming", Attrs::new())
            .expect("li")
            .id;
        let byteco = txn
            .insert_entity(EntityKind::Organization, "ByteCo", Attrs::new())
            .expect("byteco")
            .id;
        txn.insert_alias(li, "my older brother").expect("alias");
        let first = txn.insert_memory("Li Ming joined ByteCo", Vec::new()).expect("m1");
        let second = txn.insert_memory("Lunch with Li Ming", Vec::new()).expect("m2");
        txn.link(first.id, li).expect("link");
        txn.link(first.id, byteco).expect("link");
        txn.link(second.id, li).expect("link");
        RelationUpserter::new(&policy)
            .upsert(&txn, li, byteco, "works at", 1)
            .expect("rel");
        txn.commit().expect("commit");
        (store, li, byteco)
    }

    #[test]
    fn lookup_by_name_then_alias() {
        let (store, li, byteco) = seeded();
        let view = store.read().expect("read");
        assert_eq!(lookup(&view, "byteco").expect("lookup"), Some(byteco));
        assert_eq!(lookup(&view, "My Older Brother").expect("lookup"), Some(li));
        assert_eq!(lookup(&view, "nobody").expect("lookup"), None);
        assert_eq!(lookup(&view, "  ").expect("lookup"), None);
    }

    #[test]
    fn search_matches_names_and_aliases() {
        let (store, li, byteco) = seeded();
        let view = store.read().expect("read");
        let ids = |hits: Vec<Entity>| hits.into_iter().map(|e| e.id).collect::<Vec<_>>();
        assert_eq!(ids(search(&view, "BROTHER").expect("search")), vec![li]);
        assert_eq!(ids(search(&view, "co").expect("search")), vec![byteco]);
        assert!(search(&view, "").expect("search").is_empty());
    }

    #[test]
    fn profile_collects_dependents() {
        let (store, li, byteco) = seeded();
        let view = store.read().expect("read");
        let profile = EntityProfile::load(&view, li).expect("profile");

        assert_eq!(profile.aliases, vec!["my older brother"]);
        assert_eq!(profile.notes.len(), 2);
        assert_eq!(profile.notes[0].content, "Lunch with Li Ming");
        assert_eq!(profile.relations.len(), 1);
        assert_eq!(profile.relations[0].to, byteco);
        assert_eq!(profile.relations[0].to_name, "ByteCo");

        assert!(matches!(
            EntityProfile::load(&view, EntityId(99)),
            Err(NotegraphError::EntityNotFound(_))
        ));
    }

    #[test]
    fn export_lists_nodes_and_edges() {
        let (store, li, byteco) = seeded();
        let view = store.read().expect("read");
        let export = GraphExport::from_view(&view).expect("export");

        assert_eq!(export.nodes.len(), 2);
        assert_eq!(export.nodes[0].id, li);
        assert_eq!(export.nodes[0].notes.len(), 2);
        assert_eq!(export.edges.len(), 1);
        assert_eq!((export.edges[0].from, export.edges[0].to), (li, byteco));
        assert_eq!(export.edges[0].label, "works at");
    }

    #[test]
    fn listings_are_ordered() {
        let (store, _, _) = seeded();
        let view = store.read().expect("read");
        let kinds: Vec<EntityKind> = entities(&view)
            .expect("entities")
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![EntityKind::Person, EntityKind::Organization]);

        let notes = memories(&view).expect("memories");
        assert_eq!(notes[0].content, "Lunch with Li Ming");
    }
}
