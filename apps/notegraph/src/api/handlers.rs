//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    types::{
        ApiError, CheckResponse, DeleteResponse, HealthResponse, LookupParams, LookupResponse,
        MergeRequest, MergeResponse, NoteRequest, NoteResponse, SearchParams, StatusResponse,
        SweepResponse,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use notegraph_core::{
    Entity, EntityId, EntityProfile, GraphExport, Memory, MemoryId, NotegraphError, Step,
};

type ApiResult<T> = Result<T, ApiError>;

/// Progress sink for request-driven saves: steps go to the debug log.
fn log_step(memory: Option<u64>) -> impl FnMut(Step) {
    move |step| tracing::debug!(memory, step = %step, "note pipeline")
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Row counts and a consistency verdict.
pub async fn status_handler(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let stats = state.notebook.stats()?;
    let consistent = state.notebook.integrity()?.is_consistent();
    Ok(Json(StatusResponse { stats, consistent }))
}

// =============================================================================
// NOTE HANDLERS
// =============================================================================

/// List notes, newest first.
pub async fn list_notes_handler(State(state): State<AppState>) -> ApiResult<Json<Vec<Memory>>> {
    Ok(Json(state.notebook.memories()?))
}

/// Save a note and fold its extraction into the graph.
pub async fn create_note_handler(
    State(state): State<AppState>,
    Json(request): Json<NoteRequest>,
) -> ApiResult<(StatusCode, Json<NoteResponse>)> {
    let outcome =
        state
            .notebook
            .save_note(&request.extractor(), request.draft(), &mut log_step(None))?;
    tracing::info!(memory = outcome.memory.0, "note saved");
    Ok((
        StatusCode::CREATED,
        Json(NoteResponse {
            success: true,
            outcome,
        }),
    ))
}

/// Fetch one note.
pub async fn get_note_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Memory>> {
    Ok(Json(state.notebook.memory(MemoryId(id))?))
}

/// Replace a note's content and relink it.
pub async fn update_note_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<NoteRequest>,
) -> ApiResult<Json<NoteResponse>> {
    let outcome = state.notebook.update_note(
        &request.extractor(),
        MemoryId(id),
        request.draft(),
        &mut log_step(Some(id)),
    )?;
    Ok(Json(NoteResponse {
        success: true,
        outcome,
    }))
}

/// Delete a note and sweep what only it referenced.
pub async fn delete_note_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<DeleteResponse>> {
    let outcome = state.notebook.delete_note(MemoryId(id))?;
    Ok(Json(DeleteResponse {
        success: true,
        outcome,
    }))
}

// =============================================================================
// GRAPH HANDLERS
// =============================================================================

/// Whole graph as nodes and labeled edges.
pub async fn graph_handler(State(state): State<AppState>) -> ApiResult<Json<GraphExport>> {
    Ok(Json(state.notebook.export()?))
}

/// Entity profile: aliases, notes, relations.
pub async fn entity_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<EntityProfile>> {
    Ok(Json(state.notebook.profile(EntityId(id))?))
}

/// Resolve a name or alias to an entity id.
pub async fn lookup_handler(
    State(state): State<AppState>,
    Query(params): Query<LookupParams>,
) -> ApiResult<Json<LookupResponse>> {
    if params.name.trim().is_empty() {
        return Err(NotegraphError::InvalidInput("name cannot be empty".to_string()).into());
    }
    let entity = state.notebook.lookup(&params.name)?;
    Ok(Json(LookupResponse {
        name: params.name,
        entity,
    }))
}

/// Entities whose name or alias contains the fragment.
pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<Entity>>> {
    Ok(Json(state.notebook.search(&params.q)?))
}

// =============================================================================
// MAINTENANCE HANDLERS
// =============================================================================

/// Fold `duplicate` into `canonical`.
pub async fn merge_handler(
    State(state): State<AppState>,
    Json(request): Json<MergeRequest>,
) -> ApiResult<Json<MergeResponse>> {
    let report = state.notebook.merge(request.canonical, request.duplicate)?;
    Ok(Json(MergeResponse {
        success: true,
        report,
    }))
}

/// Run the consistency sweeper.
pub async fn sweep_handler(State(state): State<AppState>) -> ApiResult<Json<SweepResponse>> {
    let report = state.notebook.sweep()?;
    Ok(Json(SweepResponse {
        success: true,
        report,
    }))
}

/// Report dangling rows and orphans without changing anything.
pub async fn check_handler(State(state): State<AppState>) -> ApiResult<Json<CheckResponse>> {
    Ok(Json(state.notebook.integrity()?.into()))
}
