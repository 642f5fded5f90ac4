//! # notegraph
//!
//! The binary: a CLI over the notebook plus an HTTP server.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │             apps/notegraph (THE BINARY)       │
//! │                                               │
//! │   ┌───────────┐   ┌───────────┐   ┌────────┐  │
//! │   │   CLI     │   │ HTTP API  │   │ config │  │
//! │   │  (clap)   │   │  (axum)   │   │ (toml) │  │
//! │   └─────┬─────┘   └─────┬─────┘   └───┬────┘  │
//! │         └───────────────┼─────────────┘       │
//! │                         ▼                     │
//! │                ┌────────────────┐             │
//! │                │ notegraph-core │             │
//! │                └────────────────┘             │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! notegraph server --host 0.0.0.0 --port 8080
//! notegraph save --content "Alice works at Acme" --extraction alice.json
//! notegraph lookup --name alice
//! notegraph sweep
//! ```

use clap::Parser;
use notegraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // NOTEGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("NOTEGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "notegraph=info,notegraph_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  notegraph v{}
  notes in, one entity per thing out
"#,
        env!("CARGO_PKG_VERSION")
    );
}
