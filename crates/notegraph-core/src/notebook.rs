//! # Notebook
//!
//! The workflow facade over the store and the five graph components. This
//! is what the CLI and the HTTP API drive.
//!
//! A save runs in three phases:
//!
//! 1. extraction, recall and the optional fusion pass; no write lock held
//! 2. the note row is committed on its own
//! 3. one graph transaction resolves, links, upserts relations and applies
//!    fusion hints
//!
//! A failure in phase 1 writes nothing. A failure in phase 3 rolls the
//! graph transaction back but keeps the note, and is reported as
//! `GraphUpdateFailed` naming the step that failed.

use crate::config::GraphPolicy;
use crate::extraction::{Extraction, Extractor};
use crate::integrity::IntegrityReport;
use crate::linker::{LinkDiff, MemoryLinker};
use crate::merge::{HintOutcome, MergeCoordinator, MergeReport};
use crate::primitives::{
    DEFAULT_EVIDENCE, MAX_NAME_LENGTH, MAX_NOTE_LENGTH, MAX_TAGS, MIN_EXTRACTABLE_CHARS,
};
use crate::query::{self, EntityProfile, GraphExport};
use crate::recall;
use crate::relations::RelationUpserter;
use crate::resolver::{EntityResolver, Resolution};
use crate::storage::{GraphTxn, GraphView, RedbStore};
use crate::sweep::{SweepReport, Sweeper};
use crate::{Entity, EntityId, GraphStats, Memory, MemoryId, NotegraphError, RelationId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// =============================================================================
// INPUT / OUTPUT TYPES
// =============================================================================

/// Note body and tags as submitted by the user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoteDraft {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NoteDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    fn validate(&self) -> Result<(), NotegraphError> {
        if self.content.trim().is_empty() {
            return Err(NotegraphError::InvalidInput(
                "note content cannot be empty".to_string(),
            ));
        }
        if self.content.len() > MAX_NOTE_LENGTH {
            return Err(NotegraphError::InvalidInput(format!(
                "note exceeds {} bytes",
                MAX_NOTE_LENGTH
            )));
        }
        if self.tags.len() > MAX_TAGS {
            return Err(NotegraphError::InvalidInput(format!(
                "note has {} tags, maximum is {}",
                self.tags.len(),
                MAX_TAGS
            )));
        }
        if let Some(bad) = self
            .tags
            .iter()
            .find(|tag| tag.trim().is_empty() || tag.len() > MAX_NAME_LENGTH)
        {
            return Err(NotegraphError::InvalidInput(format!(
                "invalid tag '{}'",
                bad
            )));
        }
        Ok(())
    }
}

/// Progress reported while a note is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Extracting,
    Recalling,
    Fusing,
    Saving,
    Resolving,
    Linking,
    Merging,
    CleaningUp,
    Done,
}

impl Step {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Extracting => "extracting",
            Self::Recalling => "recalling",
            Self::Fusing => "fusing",
            Self::Saving => "saving",
            Self::Resolving => "resolving",
            Self::Linking => "linking",
            Self::Merging => "merging",
            Self::CleaningUp => "cleaning_up",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What saving or updating a note did to the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub memory: MemoryId,
    pub resolutions: Vec<Resolution>,
    pub links_added: usize,
    /// Set on update: how the note's entity set changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_diff: Option<LinkDiff>,
    pub relations: Vec<RelationId>,
    /// Relation mentions naming an entity outside the batch, or a self-loop.
    pub skipped_relations: usize,
    pub hints: Vec<HintOutcome>,
    pub recalled: usize,
    pub fused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep: Option<SweepReport>,
}

impl SaveOutcome {
    fn new(memory: MemoryId, prepared: &Prepared) -> Self {
        Self {
            memory,
            resolutions: Vec::new(),
            links_added: 0,
            link_diff: None,
            relations: Vec::new(),
            skipped_relations: 0,
            hints: Vec::new(),
            recalled: prepared.recalled,
            fused: prepared.fused,
            sweep: None,
        }
    }
}

/// Result of deleting a note. The delete and its sweep commit together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub memory: MemoryId,
    pub unlinked: Vec<EntityId>,
    pub sweep: SweepReport,
}

/// Extraction ready to be applied, plus how it was obtained.
struct Prepared {
    extraction: Extraction,
    recalled: usize,
    fused: bool,
}

struct Progress<'a> {
    current: Step,
    report: &'a mut dyn FnMut(Step),
}

impl<'a> Progress<'a> {
    fn new(report: &'a mut dyn FnMut(Step)) -> Self {
        Self {
            current: Step::Extracting,
            report,
        }
    }

    fn enter(&mut self, step: Step) {
        self.current = step;
        (self.report)(step);
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Save,
    Update,
}

// =============================================================================
// NOTEBOOK
// =============================================================================

/// A notes knowledge graph backed by one redb database.
///
/// `Send + Sync`; every operation takes `&self`. Writers are serialized by
/// redb, readers work on snapshots.
#[derive(Debug)]
pub struct Notebook {
    store: RedbStore,
    policy: GraphPolicy,
}

impl Notebook {
    /// Open or create the database file at `path`.
    pub fn open(path: impl AsRef<Path>, policy: GraphPolicy) -> Result<Self, NotegraphError> {
        let store = RedbStore::open(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "notebook opened");
        Ok(Self { store, policy })
    }

    /// A notebook that lives only in memory.
    pub fn in_memory(policy: GraphPolicy) -> Result<Self, NotegraphError> {
        Ok(Self {
            store: RedbStore::open_in_memory()?,
            policy,
        })
    }

    #[must_use]
    pub fn policy(&self) -> &GraphPolicy {
        &self.policy
    }

    /// Take a read snapshot for queries.
    pub fn view(&self) -> Result<GraphView, NotegraphError> {
        self.store.read()
    }

    // =========================================================================
    // NOTE WORKFLOWS
    // =========================================================================

    /// Save a new note and weave its extraction into the graph.
    pub fn save_note(
        &self,
        extractor: &dyn Extractor,
        draft: NoteDraft,
        progress: &mut dyn FnMut(Step),
    ) -> Result<SaveOutcome, NotegraphError> {
        draft.validate()?;
        let mut progress = Progress::new(progress);
        let prepared = self.prepare(extractor, &draft.content, None, &mut progress)?;

        progress.enter(Step::Saving);
        let txn = self.store.write()?;
        let memory = txn.insert_memory(&draft.content, draft.tags)?;
        txn.commit()?;
        tracing::info!(memory = memory.id.0, "note saved");

        let outcome = self
            .apply(memory.id, &prepared, Mode::Save, &mut progress)
            .map_err(|err| graph_failure(memory.id, progress.current, &err))?;
        progress.enter(Step::Done);
        Ok(outcome)
    }

    /// Replace a note's body and bring its links in line with the new
    /// extraction. Entities the note no longer mentions are swept if
    /// nothing else links to them.
    pub fn update_note(
        &self,
        extractor: &dyn Extractor,
        id: MemoryId,
        draft: NoteDraft,
        progress: &mut dyn FnMut(Step),
    ) -> Result<SaveOutcome, NotegraphError> {
        draft.validate()?;
        if self.store.read()?.memory(id)?.is_none() {
            return Err(NotegraphError::MemoryNotFound(id));
        }
        let mut progress = Progress::new(progress);
        let prepared = self.prepare(extractor, &draft.content, Some(id), &mut progress)?;

        progress.enter(Step::Saving);
        let txn = self.store.write()?;
        let mut memory = txn.memory(id)?.ok_or(NotegraphError::MemoryNotFound(id))?;
        memory.content = draft.content;
        memory.tags = draft.tags;
        memory.updated_at = txn.now();
        txn.put_memory(&memory)?;
        txn.commit()?;
        tracing::info!(memory = id.0, "note updated");

        let outcome = self
            .apply(id, &prepared, Mode::Update, &mut progress)
            .map_err(|err| graph_failure(id, progress.current, &err))?;
        progress.enter(Step::Done);
        Ok(outcome)
    }

    /// Delete a note and sweep what it leaves unreferenced, in one
    /// transaction.
    pub fn delete_note(&self, id: MemoryId) -> Result<DeleteOutcome, NotegraphError> {
        let txn = self.store.write()?;
        if !txn.memory_exists(id)? {
            return Err(NotegraphError::MemoryNotFound(id));
        }
        let unlinked = MemoryLinker::unlink_all(&txn, id)?;
        txn.delete_memory(id)?;
        let sweep = Sweeper::sweep(&txn).map_err(|err| {
            tracing::error!(memory = id.0, error = %err, "sweep after delete failed");
            NotegraphError::SweepFailure(err.to_string())
        })?;
        txn.commit()?;
        tracing::info!(memory = id.0, unlinked = unlinked.len(), "note deleted");

        Ok(DeleteOutcome {
            memory: id,
            unlinked: unlinked.into_iter().collect(),
            sweep,
        })
    }

    fn prepare(
        &self,
        extractor: &dyn Extractor,
        text: &str,
        exclude: Option<MemoryId>,
        progress: &mut Progress<'_>,
    ) -> Result<Prepared, NotegraphError> {
        if text.trim().chars().count() <= MIN_EXTRACTABLE_CHARS {
            tracing::debug!("note too short to extract");
            return Ok(Prepared {
                extraction: Extraction::default(),
                recalled: 0,
                fused: false,
            });
        }

        progress.enter(Step::Extracting);
        let first = extractor
            .extract(text)
            .map_err(|err| NotegraphError::ExtractionUnavailable(err.to_string()))?;
        first.validate()?;

        progress.enter(Step::Recalling);
        let history = recall::recall(&self.store.read()?, &first, text, exclude, &self.policy.recall)?;
        if history.is_empty() {
            return Ok(Prepared {
                extraction: first,
                recalled: 0,
                fused: false,
            });
        }

        progress.enter(Step::Fusing);
        let recalled = history.len();
        let (extraction, fused) = match extractor.fuse(&history, text) {
            Ok(Some(fused)) => (fused, true),
            Ok(None) => (first, false),
            Err(err) => {
                tracing::warn!(error = %err, "fusion pass failed; keeping first extraction");
                (first, false)
            }
        };
        extraction.validate()?;
        Ok(Prepared {
            extraction,
            recalled,
            fused,
        })
    }

    /// The graph transaction of a save or update.
    fn apply(
        &self,
        memory: MemoryId,
        prepared: &Prepared,
        mode: Mode,
        progress: &mut Progress<'_>,
    ) -> Result<SaveOutcome, NotegraphError> {
        let extraction = &prepared.extraction;
        let mut outcome = SaveOutcome::new(memory, prepared);

        progress.enter(Step::Resolving);
        let txn = self.store.write()?;
        let mut batch = EntityResolver::new(&self.policy).resolve_all(&txn, &extraction.entities)?;

        progress.enter(Step::Linking);
        let entities = batch.entity_ids();
        match mode {
            Mode::Save => outcome.links_added = MemoryLinker::link(&txn, memory, &entities)?,
            Mode::Update => {
                let diff = MemoryLinker::relink(&txn, memory, &entities)?;
                outcome.links_added = diff.added.len();
                outcome.link_diff = Some(diff);
            }
        }

        let upserter = RelationUpserter::new(&self.policy);
        for mention in &extraction.relations {
            let (Some(from), Some(to)) = (batch.get(&mention.from), batch.get(&mention.to)) else {
                tracing::debug!(
                    from = %mention.from,
                    to = %mention.to,
                    "relation names an entity outside this note; skipped"
                );
                outcome.skipped_relations += 1;
                continue;
            };
            if from == to {
                outcome.skipped_relations += 1;
                continue;
            }
            let id = upserter.upsert(&txn, from, to, &mention.label, DEFAULT_EVIDENCE)?;
            if !outcome.relations.contains(&id) {
                outcome.relations.push(id);
            }
        }

        if !extraction.fusion_hints.is_empty() {
            progress.enter(Step::Merging);
            let coordinator = MergeCoordinator::new(&self.policy);
            for hint in &extraction.fusion_hints {
                outcome.hints.push(coordinator.apply_hint(&txn, &mut batch, hint)?);
            }
        }

        if mode == Mode::Update {
            progress.enter(Step::CleaningUp);
            outcome.sweep = Some(Sweeper::sweep(&txn)?);
        }

        txn.commit()?;
        outcome.resolutions = batch.resolutions;
        tracing::info!(
            memory = memory.0,
            entities = outcome.resolutions.len(),
            relations = outcome.relations.len(),
            hints = outcome.hints.len(),
            "graph updated"
        );
        Ok(outcome)
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    /// Merge `duplicate` into `canonical` in one transaction.
    pub fn merge(
        &self,
        canonical: EntityId,
        duplicate: EntityId,
    ) -> Result<MergeReport, NotegraphError> {
        let txn = self.store.write()?;
        let report = MergeCoordinator::new(&self.policy).merge(&txn, canonical, duplicate)?;
        txn.commit()?;
        Ok(report)
    }

    /// Run the consistency sweep in its own transaction. Any failure rolls
    /// the whole sweep back and is reported as `SweepFailure`.
    pub fn sweep(&self) -> Result<SweepReport, NotegraphError> {
        let run = || -> Result<SweepReport, NotegraphError> {
            let txn = self.store.write()?;
            let report = Sweeper::sweep(&txn)?;
            txn.commit()?;
            Ok(report)
        };
        run().map_err(|err| {
            tracing::error!(error = %err, "sweep failed");
            NotegraphError::SweepFailure(err.to_string())
        })
    }

    /// Delete every row. Returns the counts from before.
    pub fn clear_all(&self) -> Result<GraphStats, NotegraphError> {
        let txn: GraphTxn = self.store.write()?;
        let before = txn.clear()?;
        txn.commit()?;
        tracing::warn!(
            entities = before.entities,
            memories = before.memories,
            "notebook cleared"
        );
        Ok(before)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn stats(&self) -> Result<GraphStats, NotegraphError> {
        self.view()?.stats()
    }

    pub fn integrity(&self) -> Result<IntegrityReport, NotegraphError> {
        IntegrityReport::check(&self.view()?)
    }

    pub fn memory(&self, id: MemoryId) -> Result<Memory, NotegraphError> {
        self.view()?
            .memory(id)?
            .ok_or(NotegraphError::MemoryNotFound(id))
    }

    pub fn memories(&self) -> Result<Vec<Memory>, NotegraphError> {
        query::memories(&self.view()?)
    }

    pub fn entities(&self) -> Result<Vec<Entity>, NotegraphError> {
        query::entities(&self.view()?)
    }

    pub fn lookup(&self, name: &str) -> Result<Option<EntityId>, NotegraphError> {
        query::lookup(&self.view()?, name)
    }

    pub fn search(&self, fragment: &str) -> Result<Vec<Entity>, NotegraphError> {
        query::search(&self.view()?, fragment)
    }

    pub fn profile(&self, id: EntityId) -> Result<EntityProfile, NotegraphError> {
        EntityProfile::load(&self.view()?, id)
    }

    pub fn export(&self) -> Result<GraphExport, NotegraphError> {
        GraphExport::from_view(&self.view()?)
    }
}

fn graph_failure(memory: MemoryId, step: Step, err: &NotegraphError) -> NotegraphError {
    tracing::error!(memory = memory.0, step = %step, error = %err, "graph update failed");
    NotegraphError::GraphUpdateFailed {
        memory,
        step: step.to_string(),
        reason: err.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
