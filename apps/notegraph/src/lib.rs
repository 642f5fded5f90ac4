//! # notegraph
//!
//! Application layer over [`notegraph_core`]: configuration loading, the
//! clap CLI and the axum HTTP API. The binary in `main.rs` only wires
//! logging and hands the parsed command line to [`cli::execute`].

pub mod api;
pub mod cli;
pub mod config;
