//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use notegraph_core::{
    DeleteOutcome, EntityId, Extraction, FixedExtractor, GraphStats, IntegrityReport, MergeReport,
    NoteDraft, NotegraphError, SaveOutcome, SweepReport,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Row counts plus a cheap consistency verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub stats: GraphStats,
    /// No alias, relation or link points at a missing row.
    pub consistent: bool,
}

// =============================================================================
// NOTE REQUEST/RESPONSE
// =============================================================================

/// Body of `POST /notes` and `PUT /notes/{id}`.
///
/// Extraction runs outside this service; the caller ships its result along
/// with the note and it is replayed through the engine's save path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRequest {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub extraction: Extraction,
    /// Answer to the fusion pass, if the caller ran one.
    #[serde(default)]
    pub fused: Option<Extraction>,
}

impl NoteRequest {
    #[must_use]
    pub fn draft(&self) -> NoteDraft {
        NoteDraft {
            content: self.content.clone(),
            tags: self.tags.clone(),
        }
    }

    #[must_use]
    pub fn extractor(&self) -> FixedExtractor {
        FixedExtractor::new(self.extraction.clone()).with_fused(self.fused.clone())
    }
}

/// Save or update result.
#[derive(Debug, Clone, Serialize)]
pub struct NoteResponse {
    pub success: bool,
    pub outcome: SaveOutcome,
}

/// Delete result.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub outcome: DeleteOutcome,
}

// =============================================================================
// LOOKUP / SEARCH
// =============================================================================

/// Query string of `GET /lookup`.
#[derive(Debug, Clone, Deserialize)]
pub struct LookupParams {
    pub name: String,
}

/// Answer of `GET /lookup`; `entity` is null when nothing matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResponse {
    pub name: String,
    pub entity: Option<EntityId>,
}

/// Query string of `GET /search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    pub q: String,
}

// =============================================================================
// MAINTENANCE
// =============================================================================

/// Body of `POST /entities/merge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub canonical: EntityId,
    pub duplicate: EntityId,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeResponse {
    pub success: bool,
    pub report: MergeReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    pub success: bool,
    pub report: SweepReport,
}

/// Answer of `GET /maintenance/check`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResponse {
    pub consistent: bool,
    pub clean: bool,
    pub report: IntegrityReport,
}

impl From<IntegrityReport> for CheckResponse {
    fn from(report: IntegrityReport) -> Self {
        Self {
            consistent: report.is_consistent(),
            clean: report.is_clean(),
            report,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error body shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Engine error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub NotegraphError);

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            NotegraphError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            NotegraphError::EntityNotFound(_) | NotegraphError::MemoryNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            NotegraphError::IntegrityViolation(_) => StatusCode::CONFLICT,
            NotegraphError::ExtractionUnavailable(_) => StatusCode::BAD_GATEWAY,
            NotegraphError::SweepFailure(_)
            | NotegraphError::GraphUpdateFailed { .. }
            | NotegraphError::Storage(_)
            | NotegraphError::Serialization(_)
            | NotegraphError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<NotegraphError> for ApiError {
    fn from(err: NotegraphError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }
        let body = ErrorResponse {
            success: false,
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================
