//! # notegraph CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show row counts
//! - `init` - Create (or with `--force`, clear) the database
//! - `save` / `update` / `delete` - Note workflows
//! - `merge` - Fold a duplicate entity into its canonical twin
//! - `sweep` / `check` - Maintenance
//! - `lookup` / `search` / `profile` - Queries
//! - `export` - Dump the graph as JSON
//!
//! Notes arrive with their extraction attached (`--extraction`), either as
//! inline JSON or as a path to a JSON file.

mod commands;

use crate::config::AppConfig;
use clap::{Args, Parser, Subcommand};
use notegraph_core::NotegraphError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// notegraph - notes woven into a knowledge graph
///
/// Saves notes together with the entities and relations extracted from
/// them, keeping one entity per real-world thing.
#[derive(Parser, Debug)]
#[command(name = "notegraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the graph database (overrides config and NOTEGRAPH_DATABASE)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to a TOML config file (default: ./notegraph.toml if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Note body plus its pre-computed extraction.
#[derive(Args, Debug, Clone)]
pub struct NoteArgs {
    /// Note text
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub content: Option<String>,

    /// Read the note text from a file
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Extraction as inline JSON or a path to a JSON file
    #[arg(short, long)]
    pub extraction: Option<String>,

    /// Fusion-pass extraction, inline JSON or a path
    #[arg(long)]
    pub fused: Option<String>,

    /// Tag to attach (repeatable)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Show row counts
    Status,

    /// Initialize a new empty database
    Init {
        /// Clear an existing database instead of refusing
        #[arg(short, long)]
        force: bool,
    },

    /// Save a note
    Save {
        #[command(flatten)]
        note: NoteArgs,
    },

    /// Replace a note's content and relink it
    Update {
        /// Note id
        #[arg(long)]
        id: u64,

        #[command(flatten)]
        note: NoteArgs,
    },

    /// Delete a note and sweep what only it referenced
    Delete {
        /// Note id
        #[arg(long)]
        id: u64,
    },

    /// Fold a duplicate entity into its canonical twin
    Merge {
        /// Surviving entity id
        #[arg(long)]
        canonical: u64,

        /// Entity id to absorb
        #[arg(long)]
        duplicate: u64,
    },

    /// Remove orphaned entities and everything pointing at them
    Sweep,

    /// Report dangling rows and orphans
    Check,

    /// Resolve a name or alias to an entity
    Lookup {
        #[arg(short, long)]
        name: String,
    },

    /// Entities whose name or alias contains a fragment
    Search {
        #[arg(short, long)]
        fragment: String,
    },

    /// Show an entity with its aliases, notes and relations
    Profile {
        /// Entity id
        #[arg(long)]
        id: u64,
    },

    /// Export the graph as JSON
    Export {
        /// Output file path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), NotegraphError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&config, &host, port).await,
        Some(Commands::Status) | None => cmd_status(&config, json_mode),
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Save { note }) => cmd_save(&config, json_mode, &note),
        Some(Commands::Update { id, note }) => cmd_update(&config, json_mode, id, &note),
        Some(Commands::Delete { id }) => cmd_delete(&config, json_mode, id),
        Some(Commands::Merge {
            canonical,
            duplicate,
        }) => cmd_merge(&config, json_mode, canonical, duplicate),
        Some(Commands::Sweep) => cmd_sweep(&config, json_mode),
        Some(Commands::Check) => cmd_check(&config, json_mode),
        Some(Commands::Lookup { name }) => cmd_lookup(&config, json_mode, &name),
        Some(Commands::Search { fragment }) => cmd_search(&config, json_mode, &fragment),
        Some(Commands::Profile { id }) => cmd_profile(&config, json_mode, id),
        Some(Commands::Export { output }) => cmd_export(&config, output.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn save_requires_content_or_file() {
        assert!(Cli::try_parse_from(["notegraph", "save"]).is_err());
        assert!(
            Cli::try_parse_from(["notegraph", "save", "--content", "x", "--file", "y"]).is_err()
        );

        let cli = Cli::try_parse_from([
            "notegraph",
            "--json-mode",
            "save",
            "--content",
            "Alice called",
            "--tag",
            "phone",
            "--tag",
            "family",
        ])
        .expect("parse");
        assert!(cli.json_mode);
        assert!(matches!(cli.command, Some(Commands::Save { .. })));
        if let Some(Commands::Save { note }) = cli.command {
            assert_eq!(note.content.as_deref(), Some("Alice called"));
            assert_eq!(note.tags, vec!["phone", "family"]);
        }
    }

    #[test]
    fn global_database_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["notegraph", "sweep", "-D", "other.db"]).expect("parse");
        assert_eq!(cli.database, Some(PathBuf::from("other.db")));
        assert!(matches!(cli.command, Some(Commands::Sweep)));
    }
}
