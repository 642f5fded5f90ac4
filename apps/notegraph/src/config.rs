//! # Application Configuration
//!
//! Settings come from a TOML file and are then overridden by environment
//! variables:
//!
//! ```toml
//! database = "notegraph.db"
//!
//! [policy]
//! symmetric_relations = ["sibling of", "married to"]
//! strength_cap = 50
//!
//! [server]
//! api_key = "change-me"
//! rate_limit = 100
//! cors_origins = "http://localhost:3000"
//! ```
//!
//! ## Environment Overrides
//!
//! - `NOTEGRAPH_DATABASE`: database path
//! - `NOTEGRAPH_API_KEY`: if set, requires Bearer token authentication
//! - `NOTEGRAPH_RATE_LIMIT`: requests per second (0 disables)
//! - `NOTEGRAPH_CORS_ORIGINS`: comma-separated origins, or "*" for all

use notegraph_core::{GraphPolicy, NotegraphError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "notegraph.toml";

/// Database path used when neither the file nor the environment names one.
pub const DEFAULT_DATABASE: &str = "notegraph.db";

/// Default rate limit: 100 requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Default request body limit (2 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

// =============================================================================
// CONFIG TYPES
// =============================================================================

/// Everything the binary needs to open a notebook and serve it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub database: PathBuf,
    pub policy: GraphPolicy,
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
            policy: GraphPolicy::default(),
            server: ServerConfig::default(),
        }
    }
}

/// HTTP server hardening knobs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Bearer token required on every route except `/health`.
    pub api_key: Option<String>,
    /// Requests per second; 0 disables rate limiting.
    pub rate_limit: u32,
    /// Comma-separated allowed origins, "*" for any. `None` means localhost.
    pub cors_origins: Option<String>,
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl AppConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, NotegraphError> {
        toml::from_str(text).map_err(|e| NotegraphError::InvalidInput(format!("config: {}", e)))
    }

    /// Load configuration the way the binary does.
    ///
    /// An explicit `path` must exist. Without one, `notegraph.toml` in the
    /// working directory is used when present, otherwise defaults. The
    /// process environment is applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, NotegraphError> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::read_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, NotegraphError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            NotegraphError::Io(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "config loaded");
        Self::from_toml_str(&text)
    }

    /// Apply `NOTEGRAPH_*` overrides from `lookup`.
    ///
    /// Empty values are ignored; an unparsable rate limit is ignored with a
    /// warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(database) = get("NOTEGRAPH_DATABASE") {
            self.database = PathBuf::from(database);
        }
        if let Some(key) = get("NOTEGRAPH_API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Some(limit) = get("NOTEGRAPH_RATE_LIMIT") {
            match limit.trim().parse() {
                Ok(rps) => self.server.rate_limit = rps,
                Err(_) => tracing::warn!(value = %limit, "ignoring invalid NOTEGRAPH_RATE_LIMIT"),
            }
        }
        if let Some(origins) = get("NOTEGRAPH_CORS_ORIGINS") {
            self.server.cors_origins = Some(origins);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn empty_document_gives_defaults() {
        let config = AppConfig::from_toml_str("").expect("parse");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.server.rate_limit, DEFAULT_RATE_LIMIT);
    }

    #[test]
    fn policy_table_is_read() {
        let config = AppConfig::from_toml_str(
            r#"
            database = "graph.db"

            [policy]
            symmetric_relations = ["sibling of"]
            strength_cap = 7

            [policy.recall]
            top_k = 3

            [server]
            rate_limit = 0
            "#,
        )
        .expect("parse");

        assert_eq!(config.database, PathBuf::from("graph.db"));
        assert!(config.policy.is_symmetric("sibling of"));
        assert_eq!(config.policy.strength_cap, Some(7));
        assert_eq!(config.policy.recall.top_k, 3);
        assert_eq!(config.server.rate_limit, 0);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AppConfig::from_toml_str("databse = \"typo.db\"").expect_err("typo");
        assert!(matches!(err, NotegraphError::InvalidInput(_)));
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = AppConfig::from_toml_str("[server]\nrate_limit = 5").expect("parse");
        config.apply_overrides(env(&[
            ("NOTEGRAPH_DATABASE", "/tmp/other.db"),
            ("NOTEGRAPH_API_KEY", "secret"),
            ("NOTEGRAPH_RATE_LIMIT", "20"),
            ("NOTEGRAPH_CORS_ORIGINS", "*"),
        ]));

        assert_eq!(config.database, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.server.api_key.as_deref(), Some("secret"));
        assert_eq!(config.server.rate_limit, 20);
        assert_eq!(config.server.cors_origins.as_deref(), Some("*"));
    }

    #[test]
    fn blank_and_invalid_overrides_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[
            ("NOTEGRAPH_API_KEY", "  "),
            ("NOTEGRAPH_RATE_LIMIT", "fast"),
        ]));
        assert_eq!(config.server.api_key, None);
        assert_eq!(config.server.rate_limit, DEFAULT_RATE_LIMIT);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            AppConfig::load(Some(&missing)),
            Err(NotegraphError::Io(_))
        ));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notegraph.toml");
        std::fs::write(&path, "[policy]\nmatch_across_kinds = true\n").expect("write");
        let config = AppConfig::load(Some(&path)).expect("load");
        assert!(config.policy.match_across_kinds);
    }
}
