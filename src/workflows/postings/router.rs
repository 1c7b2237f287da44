use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ActorIdentity, NewPosting, PostingId};
use super::lifecycle::{TransitionEngine, TransitionError};
use super::projection::{FilterCriteria, ProjectionHandle, ProjectionState};
use super::store::{NotificationDispatcher, PostingStore};
use super::targeting::TargetSelection;

/// Router builder exposing the transition endpoints and the live moderation
/// and directory reads.
pub fn posting_router<S, D>(
    engine: Arc<TransitionEngine<S, D>>,
    projections: Arc<ProjectionHandle>,
) -> Router
where
    S: PostingStore + 'static,
    D: NotificationDispatcher + 'static,
{
    let state = RouterState {
        engine,
        projections,
    };
    Router::new()
        .route("/api/v1/postings", post(create_handler::<S, D>))
        .route(
            "/api/v1/postings/:posting_id/approve",
            post(approve_handler::<S, D>),
        )
        .route(
            "/api/v1/postings/:posting_id/reject",
            post(reject_handler::<S, D>),
        )
        .route(
            "/api/v1/postings/:posting_id/archive",
            post(archive_handler::<S, D>),
        )
        .route("/api/v1/postings/moderation", get(moderation_handler::<S, D>))
        .route("/api/v1/postings/directory", get(directory_handler::<S, D>))
        .with_state(state)
}

struct RouterState<S, D> {
    engine: Arc<TransitionEngine<S, D>>,
    projections: Arc<ProjectionHandle>,
}

impl<S, D> Clone for RouterState<S, D> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            projections: self.projections.clone(),
        }
    }
}

/// Identity is caller-supplied; authentication lives outside this service.
#[derive(Debug, Deserialize)]
struct CreateRequest {
    actor: ActorIdentity,
    posting: NewPosting,
}

#[derive(Debug, Deserialize)]
struct ApproveRequest {
    actor: ActorIdentity,
    #[serde(flatten)]
    selection: TargetSelection,
}

#[derive(Debug, Deserialize)]
struct RejectRequest {
    actor: ActorIdentity,
    reason: String,
}

#[derive(Debug, Deserialize)]
struct ArchiveRequest {
    actor: ActorIdentity,
}

#[derive(Debug, Deserialize, Default)]
struct DirectoryParams {
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    min_postings: Option<usize>,
}

async fn create_handler<S, D>(
    State(state): State<RouterState<S, D>>,
    axum::Json(request): axum::Json<CreateRequest>,
) -> Response
where
    S: PostingStore + 'static,
    D: NotificationDispatcher + 'static,
{
    match state.engine.create_draft(&request.actor, request.posting).await {
        Ok(posting) => (StatusCode::CREATED, axum::Json(posting)).into_response(),
        Err(err) => transition_error_response(err),
    }
}

async fn approve_handler<S, D>(
    State(state): State<RouterState<S, D>>,
    Path(posting_id): Path<String>,
    axum::Json(request): axum::Json<ApproveRequest>,
) -> Response
where
    S: PostingStore + 'static,
    D: NotificationDispatcher + 'static,
{
    let id = PostingId(posting_id);
    match state
        .engine
        .approve(&request.actor, &id, request.selection)
        .await
    {
        Ok(posting) => (StatusCode::OK, axum::Json(posting)).into_response(),
        Err(err) => transition_error_response(err),
    }
}

async fn reject_handler<S, D>(
    State(state): State<RouterState<S, D>>,
    Path(posting_id): Path<String>,
    axum::Json(request): axum::Json<RejectRequest>,
) -> Response
where
    S: PostingStore + 'static,
    D: NotificationDispatcher + 'static,
{
    let id = PostingId(posting_id);
    match state
        .engine
        .reject(&request.actor, &id, &request.reason)
        .await
    {
        Ok(posting) => (StatusCode::OK, axum::Json(posting)).into_response(),
        Err(err) => transition_error_response(err),
    }
}

async fn archive_handler<S, D>(
    State(state): State<RouterState<S, D>>,
    Path(posting_id): Path<String>,
    axum::Json(request): axum::Json<ArchiveRequest>,
) -> Response
where
    S: PostingStore + 'static,
    D: NotificationDispatcher + 'static,
{
    let id = PostingId(posting_id);
    match state.engine.archive(&request.actor, &id).await {
        Ok(posting) => (StatusCode::OK, axum::Json(posting)).into_response(),
        Err(err) => transition_error_response(err),
    }
}

async fn moderation_handler<S, D>(State(state): State<RouterState<S, D>>) -> Response
where
    S: PostingStore + 'static,
    D: NotificationDispatcher + 'static,
{
    let snapshot = state.projections.latest();
    (StatusCode::OK, axum::Json(snapshot)).into_response()
}

async fn directory_handler<S, D>(
    State(state): State<RouterState<S, D>>,
    Query(params): Query<DirectoryParams>,
) -> Response
where
    S: PostingStore + 'static,
    D: NotificationDispatcher + 'static,
{
    let criteria = FilterCriteria {
        search: params.search,
        min_postings: params.min_postings,
    };
    let snapshot = state.projections.latest();
    let derived = ProjectionState::derive(&snapshot, &criteria);
    (
        StatusCode::OK,
        axum::Json(json!({
            "sequence": derived.sequence,
            "directory": derived.directory,
            "counters": derived.counters,
        })),
    )
        .into_response()
}

/// Map engine errors so clients can tell stale state from missing permission.
fn transition_error_response(err: TransitionError) -> Response {
    let (status, message) = match &err {
        TransitionError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
        TransitionError::InvalidTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
        TransitionError::Forbidden(_) => (StatusCode::FORBIDDEN, err.to_string()),
        TransitionError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
        TransitionError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    (status, axum::Json(json!({ "error": message }))).into_response()
}
