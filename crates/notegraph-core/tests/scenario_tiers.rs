//! # Scenario Tier Tests
//!
//! End-to-end note workflows through [`Notebook`], with an extractor that
//! answers from a script keyed by note text.
//!
//! ## Tiers
//! - A: aliases learned through fusion collapse synonyms
//! - B: deleting a note sweeps what only it referenced
//! - C: repeated facts strengthen one relation
//! - D: editing a mention away unlinks and sweeps it
//! - P5: a merged name keeps resolving to the survivor

use notegraph_core::{
    EntityKind, Extraction, ExtractionError, Extractor, GraphPolicy, GraphStats, NoteDraft,
    Notebook, RecalledNote, SaveOutcome, Step,
};
use std::collections::BTreeMap;

// =============================================================================
// SCRIPTED EXTRACTOR
// =============================================================================

#[derive(Default)]
struct Scripted {
    first: BTreeMap<&'static str, Extraction>,
    fused: BTreeMap<&'static str, Extraction>,
}

impl Scripted {
    fn on(mut self, text: &'static str, extraction: Extraction) -> Self {
        self.first.insert(text, extraction);
        self
    }

    fn fused(mut self, text: &'static str, extraction: Extraction) -> Self {
        self.fused.insert(text, extraction);
        self
    }
}

impl Extractor for Scripted {
    fn extract(&self, text: &str) -> Result<Extraction, ExtractionError> {
        Ok(self.first.get(text).cloned().unwrap_or_default())
    }

    fn fuse(
        &self,
        _history: &[RecalledNote],
        text: &str,
    ) -> Result<Option<Extraction>, ExtractionError> {
        Ok(self.fused.get(text).cloned())
    }
}

fn notebook() -> Notebook {
    Notebook::in_memory(GraphPolicy::default()).expect("notebook")
}

fn save(notebook: &Notebook, extractor: &dyn Extractor, text: &str) -> SaveOutcome {
    notebook
        .save_note(extractor, NoteDraft::new(text), &mut |_| {})
        .expect("save")
}

fn person(name: &str) -> Extraction {
    Extraction::default().with_entity(EntityKind::Person, name)
}

// =============================================================================
// TIER A: ALIAS FUSION
// =============================================================================

mod tier_a_alias_fusion {
    use super::*;

    const COLLEAGUE: &str = "Li Ming is my colleague";
    const BROTHER: &str = "Li Ming is my older brother";
    const BYTECO: &str = "My older brother works at ByteCo";

    fn extractor() -> Scripted {
        Scripted::default()
            .on(COLLEAGUE, person("Li Ming"))
            .on(BROTHER, person("Li Ming"))
            .fused(BROTHER, person("Li Ming").with_hint("Li Ming", "my older brother"))
            .on(
                BYTECO,
                person("my older brother")
                    .with_entity(EntityKind::Organization, "ByteCo")
                    .with_relation("my older brother", "ByteCo", "works at"),
            )
    }

    /// A.1: three notes leave one person with an alias, one company, one edge.
    #[test]
    fn synonyms_collapse_into_one_person() {
        let notebook = notebook();
        let extractor = extractor();
        save(&notebook, &extractor, COLLEAGUE);
        let second = save(&notebook, &extractor, BROTHER);
        assert!(second.fused);
        save(&notebook, &extractor, BYTECO);

        let entities = notebook.entities().expect("entities");
        assert_eq!(entities.len(), 2);
        let li = entities
            .iter()
            .find(|e| e.kind == EntityKind::Person)
            .expect("person");
        assert_eq!(li.name, "Li Ming");
        assert!(entities
            .iter()
            .any(|e| e.kind == EntityKind::Organization && e.name == "ByteCo"));

        let profile = notebook.profile(li.id).expect("profile");
        assert_eq!(profile.aliases, vec!["my older brother"]);
        assert_eq!(profile.notes.len(), 3);
        assert_eq!(profile.relations.len(), 1);
        assert_eq!(profile.relations[0].to_name, "ByteCo");
        assert_eq!(profile.relations[0].relation_type, "works at");
        assert_eq!(profile.relations[0].strength, 1);
    }

    /// A.2: fusion that arrives after the duplicate exists merges it.
    #[test]
    fn late_fusion_merges_existing_duplicate() {
        const LATE: &str = "My older brother Li Ming called";
        let extractor = Scripted::default()
            .on(COLLEAGUE, person("Li Ming"))
            .on(
                BYTECO,
                person("my older brother")
                    .with_entity(EntityKind::Organization, "ByteCo")
                    .with_relation("my older brother", "ByteCo", "works at"),
            )
            .on(LATE, person("Li Ming").with_entity(EntityKind::Person, "my older brother"))
            .fused(
                LATE,
                person("Li Ming")
                    .with_entity(EntityKind::Person, "my older brother")
                    .with_hint("Li Ming", "my older brother"),
            );
        let notebook = notebook();
        save(&notebook, &extractor, COLLEAGUE);
        save(&notebook, &extractor, BYTECO);
        assert_eq!(notebook.entities().expect("entities").len(), 3);

        let mut steps = Vec::new();
        notebook
            .save_note(&extractor, NoteDraft::new(LATE), &mut |s| steps.push(s))
            .expect("save");
        assert!(steps.contains(&Step::Merging));

        let li = notebook.lookup("Li Ming").expect("lookup").expect("li");
        assert_eq!(notebook.lookup("my older brother").expect("lookup"), Some(li));
        let profile = notebook.profile(li).expect("profile");
        assert_eq!(profile.notes.len(), 3);
        assert_eq!(profile.relations.len(), 1);
        assert_eq!(notebook.entities().expect("entities").len(), 2);
        assert!(notebook.integrity().expect("check").is_clean());
    }
}

// =============================================================================
// TIER B: DELETE SWEEPS
// =============================================================================

mod tier_b_delete_sweeps {
    use super::*;

    const ALICE_BOB: &str = "Alice introduced me to Bob";
    const BOB_ONLY: &str = "Bob fixed my bike";

    fn extractor() -> Scripted {
        Scripted::default()
            .on(
                ALICE_BOB,
                person("Alice")
                    .with_entity(EntityKind::Person, "Bob")
                    .with_relation("Alice", "Bob", "knows"),
            )
            .on(BOB_ONLY, person("Bob"))
    }

    /// B.1: Alice and her relation go; Bob stays because another note names him.
    #[test]
    fn deleting_only_mention_removes_entity_and_relation() {
        let notebook = notebook();
        let extractor = extractor();
        let first = save(&notebook, &extractor, ALICE_BOB);
        save(&notebook, &extractor, BOB_ONLY);

        let outcome = notebook.delete_note(first.memory).expect("delete");
        assert_eq!(outcome.sweep.removed_entities, 1);
        assert_eq!(outcome.sweep.removed_relations, 1);

        assert_eq!(notebook.lookup("Alice").expect("lookup"), None);
        assert!(notebook.lookup("Bob").expect("lookup").is_some());
        assert!(notebook.export().expect("export").edges.is_empty());
    }

    /// B.2: with no other mention, Bob goes too.
    #[test]
    fn unreferenced_partner_is_swept_as_well() {
        let notebook = notebook();
        let first = save(&notebook, &extractor(), ALICE_BOB);

        let outcome = notebook.delete_note(first.memory).expect("delete");
        assert_eq!(outcome.sweep.removed_entities, 2);
        assert_eq!(notebook.stats().expect("stats"), GraphStats::default());
    }
}

// =============================================================================
// TIER C: EVIDENCE ACCUMULATES
// =============================================================================

mod tier_c_evidence {
    use super::*;

    /// C.1: the same fact in two notes is one relation of strength 2.
    #[test]
    fn repeated_fact_strengthens_one_relation() {
        let fact = || {
            person("Alice")
                .with_entity(EntityKind::Organization, "Acme")
                .with_relation("Alice", "Acme", "works at")
        };
        let extractor = Scripted::default()
            .on("Alice works at Acme", fact())
            .on("Reminder: Alice works at Acme", fact());
        let notebook = notebook();
        save(&notebook, &extractor, "Alice works at Acme");
        save(&notebook, &extractor, "Reminder: Alice works at Acme");

        let export = notebook.export().expect("export");
        assert_eq!(export.nodes.len(), 2);
        assert_eq!(export.edges.len(), 1);
        assert_eq!(export.edges[0].strength, 2);
    }
}

// =============================================================================
// TIER D: EDITS RELINK
// =============================================================================

mod tier_d_edit_relinks {
    use super::*;

    const BEFORE: &str = "Lunch with Alice and Charlie";
    const AFTER: &str = "Lunch with Alice";

    /// D.1: editing Charlie out drops the link and sweeps Charlie.
    #[test]
    fn edited_out_mention_is_swept() {
        let extractor = Scripted::default()
            .on(BEFORE, person("Alice").with_entity(EntityKind::Person, "Charlie"))
            .on(AFTER, person("Alice"));
        let notebook = notebook();
        let saved = save(&notebook, &extractor, BEFORE);

        let updated = notebook
            .update_note(&extractor, saved.memory, NoteDraft::new(AFTER), &mut |_| {})
            .expect("update");

        let diff = updated.link_diff.expect("diff");
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.retained.len(), 1);
        assert_eq!(updated.sweep.expect("sweep").removed_entities, 1);
        assert_eq!(notebook.lookup("Charlie").expect("lookup"), None);
        assert!(notebook.lookup("Alice").expect("lookup").is_some());
    }

    /// D.2: Charlie survives the edit while another note names him.
    #[test]
    fn shared_mention_survives_edit() {
        let extractor = Scripted::default()
            .on(BEFORE, person("Alice").with_entity(EntityKind::Person, "Charlie"))
            .on(AFTER, person("Alice"))
            .on("Charlie's birthday", person("Charlie"));
        let notebook = notebook();
        let saved = save(&notebook, &extractor, BEFORE);
        save(&notebook, &extractor, "Charlie's birthday");

        let updated = notebook
            .update_note(&extractor, saved.memory, NoteDraft::new(AFTER), &mut |_| {})
            .expect("update");
        assert!(updated.sweep.expect("sweep").is_empty());
        assert!(notebook.lookup("Charlie").expect("lookup").is_some());
    }
}

// =============================================================================
// TIER P5: MERGE IS ALIAS-COMPLETE
// =============================================================================

mod tier_p5_merge_alias_complete {
    use super::*;

    /// P5.1: after a manual merge the duplicate's name resolves to canonical.
    #[test]
    fn merged_name_resolves_to_canonical() {
        let extractor = Scripted::default()
            .on("Robert joined the team", person("Robert"))
            .on("Bobby brought cake", person("Bobby"))
            .on("Bobby is leaving", person("Bobby"));
        let notebook = notebook();
        let robert = save(&notebook, &extractor, "Robert joined the team").resolutions[0].id;
        let bobby = save(&notebook, &extractor, "Bobby brought cake").resolutions[0].id;

        let report = notebook.merge(robert, bobby).expect("merge");
        assert!(report.name_aliased);
        assert_eq!(notebook.lookup("bobby").expect("lookup"), Some(robert));

        let later = save(&notebook, &extractor, "Bobby is leaving");
        assert_eq!(later.resolutions[0].id, robert);
        assert_eq!(notebook.entities().expect("entities").len(), 1);
    }

    /// P5.2: merging an entity into itself is rejected and changes nothing.
    #[test]
    fn self_merge_is_rejected() {
        let extractor = Scripted::default().on("Robert joined the team", person("Robert"));
        let notebook = notebook();
        let robert = save(&notebook, &extractor, "Robert joined the team").resolutions[0].id;
        assert!(notebook.merge(robert, robert).is_err());
        assert_eq!(notebook.entities().expect("entities").len(), 1);
    }
}
