//! # Storage
//!
//! redb persistence for the graph and note tables.
//!
//! - [`RedbStore`] opens the database and hands out transactions
//! - [`GraphTxn`] is the write path; it enforces referential integrity on
//!   every row write
//! - [`GraphView`] is a read snapshot

mod redb_store;
mod tables;
mod txn;
mod view;

pub use redb_store::RedbStore;
pub use txn::{AliasInsert, GraphTxn};
pub use view::GraphView;
