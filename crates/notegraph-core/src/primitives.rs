//! # Engine Primitives
//!
//! Fixed constants for the notegraph engine: input limits, extraction
//! thresholds and the default recall budget. Policy that users may tune
//! lives in [`crate::config::GraphPolicy`]; these values are the defaults it
//! starts from and the hard limits it cannot exceed.

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of an entity name or alias, in bytes.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum length of a relation label, in bytes.
pub const MAX_RELATION_LABEL_LENGTH: usize = 128;

/// Maximum length of a single attribute key or value, in bytes.
pub const MAX_ATTRIBUTE_LENGTH: usize = 1024;

/// Maximum note body size, in bytes.
pub const MAX_NOTE_LENGTH: usize = 256 * 1024;

/// Maximum number of tags on one note.
pub const MAX_TAGS: usize = 32;

/// Maximum mentions (entities + relations + hints) accepted from a single
/// extraction. Bounds the work done inside one write transaction.
pub const MAX_MENTIONS_PER_NOTE: usize = 512;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Notes whose trimmed body is this many characters or fewer are saved
/// without calling the extractor.
pub const MIN_EXTRACTABLE_CHARS: usize = 5;

/// Evidence added by one relation mention.
pub const DEFAULT_EVIDENCE: i64 = 1;

// =============================================================================
// RECALL DEFAULTS
// =============================================================================

/// Candidate notes gathered per named entity.
pub const RECALL_CANDIDATES_PER_ENTITY: usize = 8;

/// Notes handed to the fusion pass.
pub const RECALL_TOP_K: usize = 6;

/// Budget for all recalled bodies together, in characters.
pub const RECALL_MAX_CONTEXT_CHARS: usize = 2800;

/// Budget for one recalled body, in characters.
pub const RECALL_MAX_NOTE_CHARS: usize = 520;

/// Minimum relevance, in per-mille, for a note without entity hits.
pub const RECALL_MIN_SCORE_PERMILLE: u32 = 120;

/// Token overlap that makes a note relevant regardless of score.
pub const RECALL_MIN_TOKEN_OVERLAP: usize = 2;
