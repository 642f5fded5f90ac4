//! # notegraph-core
//!
//! The entity-resolution and graph-consistency engine behind notegraph.
//!
//! Free-text notes are turned into entity and relation candidates by an
//! injected [`Extractor`]; this crate folds those candidates into a
//! persistent knowledge graph without creating duplicate entities, without
//! ever writing a dangling reference, and heals the graph after notes are
//! edited or deleted.
//!
//! ## Components
//!
//! - [`resolver`]: name + kind → entity id, creating on a miss
//! - [`relations`]: insert or strengthen a typed edge
//! - [`linker`]: keep a note's entity links in step with its extraction
//! - [`merge`]: fold a duplicate entity into its canonical twin
//! - [`sweep`]: remove orphans in dependency-safe order
//!
//! [`Notebook`] drives them in the right order; [`storage`] enforces the
//! referential rules on every write.
//!
//! ## Architectural Constraints
//!
//! - No async, no network dependencies (pure Rust)
//! - Deterministic: BTreeMap/BTreeSet only, integer arithmetic only
//! - Constraint enforcement is always on; there is no bypass

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod extraction;
pub mod integrity;
pub mod linker;
pub mod merge;
pub mod names;
pub mod notebook;
pub mod primitives;
pub mod query;
pub mod recall;
pub mod relations;
pub mod resolver;
pub mod storage;
pub mod sweep;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    Alias, Entity, EntityId, EntityKind, GraphStats, Memory, MemoryId, NotegraphError, Relation,
    RelationId, Strength,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use config::{GraphPolicy, RecallLimits};
pub use extraction::{
    EntityMention, Extraction, ExtractionError, Extractor, FixedExtractor, FusionHint,
    RecalledNote, RelationMention,
};
pub use integrity::IntegrityReport;
pub use linker::{LinkDiff, MemoryLinker};
pub use merge::{HintOutcome, MergeCoordinator, MergeReport};
pub use notebook::{DeleteOutcome, NoteDraft, Notebook, SaveOutcome, Step};
pub use query::{EntityProfile, GraphEdge, GraphExport, GraphNode, RelationView};
pub use relations::RelationUpserter;
pub use resolver::{EntityResolver, ResolvedBatch, ResolvedVia, Resolution};
pub use storage::{AliasInsert, GraphTxn, GraphView, RedbStore};
pub use sweep::{SweepReport, Sweeper};
