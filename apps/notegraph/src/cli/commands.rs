//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::NoteArgs;
use crate::api::{self, AppState, CheckResponse};
use crate::config::AppConfig;
use notegraph_core::{
    EntityId, Extraction, FixedExtractor, MemoryId, NoteDraft, Notebook, NotegraphError, Step,
    primitives::MAX_NOTE_LENGTH,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of an extraction JSON file (16 MB).
const MAX_EXTRACTION_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), NotegraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| NotegraphError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(NotegraphError::InvalidInput(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path: it must exist and be a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, NotegraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        NotegraphError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(NotegraphError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path: its parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, NotegraphError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        NotegraphError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(NotegraphError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| NotegraphError::Io("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn read_limited(path: &Path, max_size: u64) -> Result<String, NotegraphError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, max_size)?;
    std::fs::read_to_string(&validated)
        .map_err(|e| NotegraphError::Io(format!("Read file: {}", e)))
}

// =============================================================================
// INPUT HELPERS
// =============================================================================

/// Parse an extraction given inline (starting with `{`) or as a file path.
pub fn read_extraction(arg: &str) -> Result<Extraction, NotegraphError> {
    let text = if arg.trim_start().starts_with('{') {
        arg.to_string()
    } else {
        read_limited(Path::new(arg), MAX_EXTRACTION_FILE_SIZE)?
    };
    serde_json::from_str(&text)
        .map_err(|e| NotegraphError::InvalidInput(format!("extraction: {}", e)))
}

/// Turn note arguments into a draft and the extractor that replays them.
pub fn note_input(args: &NoteArgs) -> Result<(NoteDraft, FixedExtractor), NotegraphError> {
    let content = match (&args.content, &args.file) {
        (Some(content), _) => content.clone(),
        (None, Some(file)) => read_limited(file, MAX_NOTE_LENGTH as u64)?,
        (None, None) => {
            return Err(NotegraphError::InvalidInput(
                "either --content or --file is required".to_string(),
            ));
        }
    };

    let extraction = match args.extraction.as_deref() {
        Some(arg) => read_extraction(arg)?,
        None => Extraction::default(),
    };
    let fused = args.fused.as_deref().map(read_extraction).transpose()?;

    let draft = NoteDraft {
        content,
        tags: args.tags.clone(),
    };
    Ok((draft, FixedExtractor::new(extraction).with_fused(fused)))
}

fn open_notebook(config: &AppConfig) -> Result<Notebook, NotegraphError> {
    Notebook::open(&config.database, config.policy.clone())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), NotegraphError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| NotegraphError::Serialization(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

/// Progress sink: step names on stderr, unless output is JSON.
fn progress(json_mode: bool) -> impl FnMut(Step) {
    move |step| {
        if json_mode {
            tracing::debug!(step = %step, "note pipeline");
        } else {
            eprintln!("  .. {}", step);
        }
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &AppConfig, host: &str, port: u16) -> Result<(), NotegraphError> {
    let notebook = open_notebook(config)?;

    println!("notegraph server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Database: {:?}", config.database);
    println!();
    println!("Endpoints:");
    println!("  GET|POST       /notes             - List or save notes");
    println!("  GET|PUT|DELETE /notes/{{id}}        - One note");
    println!("  GET            /graph             - Export graph");
    println!("  GET            /entities/{{id}}     - Entity profile");
    println!("  GET            /lookup?name=      - Name or alias lookup");
    println!("  GET            /search?q=         - Name search");
    println!("  POST           /entities/merge    - Merge duplicates");
    println!("  POST           /maintenance/sweep - Remove orphans");
    println!("  GET            /maintenance/check - Integrity report");
    println!("  GET            /status, /health");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, AppState::new(notebook, config.server.clone())).await
}

// =============================================================================
// STATUS / INIT
// =============================================================================

/// Show row counts.
pub fn cmd_status(config: &AppConfig, json_mode: bool) -> Result<(), NotegraphError> {
    let notebook = open_notebook(config)?;
    let stats = notebook.stats()?;

    if json_mode {
        return print_json(&serde_json::json!({
            "database": config.database.to_string_lossy(),
            "entities": stats.entities,
            "aliases": stats.aliases,
            "relations": stats.relations,
            "links": stats.links,
            "memories": stats.memories,
        }));
    }

    println!("notegraph Status");
    println!("================");
    println!("Database:  {:?}", config.database);
    println!();
    println!("Notes:     {}", stats.memories);
    println!("Entities:  {}", stats.entities);
    println!("Aliases:   {}", stats.aliases);
    println!("Relations: {}", stats.relations);
    println!("Links:     {}", stats.links);

    Ok(())
}

/// Create the database, or clear it with `force`.
pub fn cmd_init(config: &AppConfig, force: bool) -> Result<(), NotegraphError> {
    let exists = config.database.exists();
    if exists && !force {
        return Err(NotegraphError::InvalidInput(
            "Database already exists. Use --force to clear it.".to_string(),
        ));
    }

    let notebook = open_notebook(config)?;
    if exists {
        let cleared = notebook.clear_all()?;
        println!(
            "Cleared {} notes and {} entities from {:?}",
            cleared.memories, cleared.entities, config.database
        );
    } else {
        println!("Initialized new database at {:?}", config.database);
    }
    Ok(())
}

// =============================================================================
// NOTE COMMANDS
// =============================================================================

/// Save a note.
pub fn cmd_save(config: &AppConfig, json_mode: bool, args: &NoteArgs) -> Result<(), NotegraphError> {
    let (draft, extractor) = note_input(args)?;
    let notebook = open_notebook(config)?;
    let outcome = notebook.save_note(&extractor, draft, &mut progress(json_mode))?;

    if json_mode {
        return print_json(&outcome);
    }

    println!("Saved {}", outcome.memory);
    println!("  Entities:  {}", outcome.resolutions.len());
    println!("  Relations: {}", outcome.relations.len());
    if outcome.skipped_relations > 0 {
        println!("  Skipped:   {} relation mentions", outcome.skipped_relations);
    }
    if !outcome.hints.is_empty() {
        println!("  Hints:     {}", outcome.hints.len());
    }
    Ok(())
}

/// Replace a note's content.
pub fn cmd_update(
    config: &AppConfig,
    json_mode: bool,
    id: u64,
    args: &NoteArgs,
) -> Result<(), NotegraphError> {
    let (draft, extractor) = note_input(args)?;
    let notebook = open_notebook(config)?;
    let outcome = notebook.update_note(&extractor, MemoryId(id), draft, &mut progress(json_mode))?;

    if json_mode {
        return print_json(&outcome);
    }

    println!("Updated {}", outcome.memory);
    if let Some(diff) = &outcome.link_diff {
        println!(
            "  Links: +{} -{} ={}",
            diff.added.len(),
            diff.removed.len(),
            diff.retained.len()
        );
    }
    if let Some(sweep) = &outcome.sweep {
        println!("  Swept: {} entities", sweep.removed_entities);
    }
    Ok(())
}

/// Delete a note.
pub fn cmd_delete(config: &AppConfig, json_mode: bool, id: u64) -> Result<(), NotegraphError> {
    let notebook = open_notebook(config)?;
    let outcome = notebook.delete_note(MemoryId(id))?;

    if json_mode {
        return print_json(&outcome);
    }

    println!("Deleted {}", outcome.memory);
    println!("  Unlinked: {} entities", outcome.unlinked.len());
    println!("  Swept:    {} entities", outcome.sweep.removed_entities);
    Ok(())
}

// =============================================================================
// MAINTENANCE COMMANDS
// =============================================================================

/// Merge `duplicate` into `canonical`.
pub fn cmd_merge(
    config: &AppConfig,
    json_mode: bool,
    canonical: u64,
    duplicate: u64,
) -> Result<(), NotegraphError> {
    let notebook = open_notebook(config)?;
    let report = notebook.merge(EntityId(canonical), EntityId(duplicate))?;

    if json_mode {
        return print_json(&report);
    }

    println!("Merged {} into {}", report.duplicate, report.canonical);
    println!("  Aliases moved:   {}", report.aliases_moved);
    println!(
        "  Links moved:     {} ({} folded)",
        report.links_moved, report.links_folded
    );
    println!(
        "  Relations moved: {} ({} folded, {} self-loops dropped)",
        report.relations_moved, report.relations_folded, report.self_loops_dropped
    );
    Ok(())
}

/// Run the sweeper.
pub fn cmd_sweep(config: &AppConfig, json_mode: bool) -> Result<(), NotegraphError> {
    let notebook = open_notebook(config)?;
    let report = notebook.sweep()?;

    if json_mode {
        return print_json(&report);
    }

    if report.is_empty() {
        println!("Nothing to sweep");
    } else {
        println!("Swept:");
        println!("  Entities:  {}", report.removed_entities);
        println!("  Relations: {}", report.removed_relations);
        println!("  Links:     {}", report.removed_links);
        println!("  Aliases:   {}", report.removed_aliases);
    }
    Ok(())
}

/// Report integrity problems; fails when a dangling row exists.
pub fn cmd_check(config: &AppConfig, json_mode: bool) -> Result<(), NotegraphError> {
    let notebook = open_notebook(config)?;
    let check = CheckResponse::from(notebook.integrity()?);

    if json_mode {
        print_json(&check)?;
    } else {
        let report = &check.report;
        println!("Dangling aliases:   {}", report.dangling_aliases.len());
        println!("Dangling relations: {}", report.dangling_relations.len());
        println!("Dangling links:     {}", report.dangling_links.len());
        println!("Orphan entities:    {}", report.orphan_entities.len());
    }

    if check.consistent {
        Ok(())
    } else {
        Err(NotegraphError::IntegrityViolation(
            "dangling references found; run `notegraph sweep`".to_string(),
        ))
    }
}

// =============================================================================
// QUERY COMMANDS
// =============================================================================

/// Resolve a name or alias.
pub fn cmd_lookup(config: &AppConfig, json_mode: bool, name: &str) -> Result<(), NotegraphError> {
    let notebook = open_notebook(config)?;
    let found = notebook.lookup(name)?;

    if json_mode {
        return print_json(&serde_json::json!({ "name": name, "entity": found }));
    }

    match found {
        Some(id) => {
            let profile = notebook.profile(id)?;
            println!(
                "{} -> {} ({}, {})",
                name, id, profile.entity.name, profile.entity.kind
            );
        }
        None => println!("{}: not found", name),
    }
    Ok(())
}

/// Substring search.
pub fn cmd_search(
    config: &AppConfig,
    json_mode: bool,
    fragment: &str,
) -> Result<(), NotegraphError> {
    let notebook = open_notebook(config)?;
    let entities = notebook.search(fragment)?;

    if json_mode {
        return print_json(&entities);
    }

    if entities.is_empty() {
        println!("No match for '{}'", fragment);
    }
    for entity in entities {
        println!("{:>6}  {:<12} {}", entity.id.0, entity.kind.label(), entity.name);
    }
    Ok(())
}

/// Show an entity profile.
pub fn cmd_profile(config: &AppConfig, json_mode: bool, id: u64) -> Result<(), NotegraphError> {
    let notebook = open_notebook(config)?;
    let profile = notebook.profile(EntityId(id))?;

    if json_mode {
        return print_json(&profile);
    }

    println!("{} ({})", profile.entity.name, profile.entity.kind);
    if !profile.aliases.is_empty() {
        println!("  Aliases: {}", profile.aliases.join(", "));
    }
    for (key, value) in &profile.entity.attributes {
        println!("  {}: {}", key, value);
    }
    println!("  Relations:");
    for relation in &profile.relations {
        println!(
            "    {} -[{} x{}]-> {}",
            relation.from_name, relation.relation_type, relation.strength, relation.to_name
        );
    }
    println!("  Notes: {}", profile.notes.len());
    for note in &profile.notes {
        println!("    {}  {}", note.id, note.content.lines().next().unwrap_or(""));
    }
    Ok(())
}

/// Export the graph as JSON to `output` or stdout.
pub fn cmd_export(config: &AppConfig, output: Option<&Path>) -> Result<(), NotegraphError> {
    let notebook = open_notebook(config)?;
    let export = notebook.export()?;

    let Some(output) = output else {
        return print_json(&export);
    };

    let validated_output = validate_output_path(output)?;
    let data = serde_json::to_vec_pretty(&export)
        .map_err(|e| NotegraphError::Serialization(e.to_string()))?;
    std::fs::write(&validated_output, &data)
        .map_err(|e| NotegraphError::Io(format!("Write file: {}", e)))?;

    println!(
        "Exported {} nodes and {} edges to {:?}",
        export.nodes.len(),
        export.edges.len(),
        validated_output
    );
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
