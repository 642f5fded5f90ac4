//! # redb-backed Graph Storage
//!
//! One embedded redb database holds both the graph tables and the note
//! table. redb gives us:
//! - ACID write transactions (one writer at a time)
//! - MVCC snapshots for concurrent readers
//! - Crash safety (copy-on-write B-trees)
//!
//! `RedbStore` only opens the database and hands out transactions; the row
//! rules live in [`GraphTxn`].

use super::tables::{
    ALIASES, ENTITIES, ENTITY_NAMES, LINKS, LINKS_BY_ENTITY, MEMORIES, METADATA, RELATION_KEYS,
    RELATIONS,
};
use super::{GraphTxn, GraphView};
use crate::NotegraphError;
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableDatabase};
use std::path::Path;

/// Handle to the notegraph database.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NotegraphError> {
        let db = Database::create(path.as_ref())?;
        Self::initialize(db)
    }

    /// Open a database that lives only in memory. Used by tests and by
    /// callers that want a scratch graph.
    pub fn open_in_memory() -> Result<Self, NotegraphError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::initialize(db)
    }

    /// Create every table up front so read transactions never hit a
    /// missing-table error on a fresh database.
    fn initialize(db: Database) -> Result<Self, NotegraphError> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ENTITIES)?;
            let _ = write_txn.open_table(ENTITY_NAMES)?;
            let _ = write_txn.open_table(ALIASES)?;
            let _ = write_txn.open_table(RELATIONS)?;
            let _ = write_txn.open_table(RELATION_KEYS)?;
            let _ = write_txn.open_table(MEMORIES)?;
            let _ = write_txn.open_table(LINKS)?;
            let _ = write_txn.open_table(LINKS_BY_ENTITY)?;
            let _ = write_txn.open_table(METADATA)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Begin the (single) write transaction. Blocks while another writer is
    /// active.
    pub fn write(&self) -> Result<GraphTxn, NotegraphError> {
        Ok(GraphTxn::new(self.db.begin_write()?))
    }

    /// Take a read snapshot.
    pub fn read(&self) -> Result<GraphView, NotegraphError> {
        Ok(GraphView::new(self.db.begin_read()?))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::NameKey;
    use crate::{EntityId, EntityKind, MemoryId, NotegraphError, Strength};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn store() -> RedbStore {
        RedbStore::open_in_memory().expect("open in-memory store")
    }

    #[test]
    fn fresh_store_is_empty() {
        let store = store();
        let stats = store.read().expect("read").stats().expect("stats");
        assert_eq!(stats, crate::GraphStats::default());
    }

    #[test]
    fn persistence_across_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("notes.redb");

        {
            let store = RedbStore::open(&db_path).expect("open");
            let txn = store.write().expect("write");
            let entity = txn
                .insert_entity(EntityKind::Person, "Alice", BTreeMap::new())
                .expect("insert");
            assert_eq!(entity.id, EntityId(1));
            txn.commit().expect("commit");
        }

        let store = RedbStore::open(&db_path).expect("reopen");
        let view = store.read().expect("read");
        let key = NameKey::new("alice").expect("key");
        assert_eq!(
            view.entity_by_name(EntityKind::Person, &key).expect("lookup"),
            Some(EntityId(1))
        );

        // Counters survive too: the next id is not reused.
        let txn = store.write().expect("write");
        let bob = txn
            .insert_entity(EntityKind::Person, "Bob", BTreeMap::new())
            .expect("insert");
        assert_eq!(bob.id, EntityId(2));
    }

    #[test]
    fn dropped_transaction_is_rolled_back() {
        let store = store();
        {
            let txn = store.write().expect("write");
            txn.insert_entity(EntityKind::Person, "Ghost", BTreeMap::new())
                .expect("insert");
        }
        assert_eq!(store.read().expect("read").stats().expect("stats").entities, 0);
    }

    #[test]
    fn name_and_kind_are_unique() {
        let store = store();
        let txn = store.write().expect("write");
        txn.insert_entity(EntityKind::Person, "Alice", BTreeMap::new())
            .expect("insert");
        let again = txn.insert_entity(EntityKind::Person, "  alice ", BTreeMap::new());
        assert!(matches!(again, Err(NotegraphError::IntegrityViolation(_))));
        // Same name under another kind is a different entity.
        txn.insert_entity(EntityKind::Organization, "Alice", BTreeMap::new())
            .expect("other kind");
    }

    #[test]
    fn dangling_writes_are_refused() {
        let store = store();
        let txn = store.write().expect("write");
        let alice = txn
            .insert_entity(EntityKind::Person, "Alice", BTreeMap::new())
            .expect("insert");

        let relation = txn.insert_relation(alice.id, EntityId(99), "knows", Strength::new(1));
        assert!(matches!(relation, Err(NotegraphError::IntegrityViolation(_))));

        let alias = txn.insert_alias(EntityId(99), "Ally");
        assert!(matches!(alias, Err(NotegraphError::IntegrityViolation(_))));

        let link = txn.link(MemoryId(42), alice.id);
        assert!(matches!(link, Err(NotegraphError::IntegrityViolation(_))));
    }

    #[test]
    fn referenced_entity_cannot_be_deleted() {
        let store = store();
        let txn = store.write().expect("write");
        let alice = txn
            .insert_entity(EntityKind::Person, "Alice", BTreeMap::new())
            .expect("insert");
        txn.insert_alias(alice.id, "Ally").expect("alias");

        let refused = txn.delete_entity(alice.id);
        assert!(matches!(refused, Err(NotegraphError::IntegrityViolation(_))));

        txn.delete_alias(&NameKey::new("ally").expect("key"))
            .expect("delete alias");
        txn.delete_entity(alice.id).expect("delete");
        assert!(!txn.entity_exists(alice.id).expect("exists"));
        assert_eq!(
            txn.entity_by_name(EntityKind::Person, &NameKey::new("Alice").expect("key"))
                .expect("lookup"),
            None
        );
    }

    #[test]
    fn links_are_indexed_both_ways() {
        let store = store();
        let txn = store.write().expect("write");
        let note = txn.insert_memory("Alice met Bob", Vec::new()).expect("note");
        let alice = txn
            .insert_entity(EntityKind::Person, "Alice", BTreeMap::new())
            .expect("insert");

        assert!(txn.link(note.id, alice.id).expect("link"));
        assert!(!txn.link(note.id, alice.id).expect("relink"));
        assert_eq!(txn.memories_of(alice.id).expect("memories").len(), 1);
        assert_eq!(txn.entities_of(note.id).expect("entities").len(), 1);

        assert!(txn.unlink(note.id, alice.id).expect("unlink"));
        assert!(txn.memories_of(alice.id).expect("memories").is_empty());
    }

    #[test]
    fn clear_empties_every_table() {
        let store = store();
        let txn = store.write().expect("write");
        let note = txn.insert_memory("Alice knows Bob", Vec::new()).expect("note");
        let alice = txn
            .insert_entity(EntityKind::Person, "Alice", BTreeMap::new())
            .expect("insert");
        let bob = txn
            .insert_entity(EntityKind::Person, "Bob", BTreeMap::new())
            .expect("insert");
        txn.link(note.id, alice.id).expect("link");
        txn.insert_alias(bob.id, "Bobby").expect("alias");
        txn.insert_relation(alice.id, bob.id, "knows", Strength::new(1))
            .expect("relation");

        let before = txn.clear().expect("clear");
        assert_eq!(before.entities, 2);
        assert_eq!(txn.stats().expect("stats"), crate::GraphStats::default());
        txn.commit().expect("commit");
    }
}
