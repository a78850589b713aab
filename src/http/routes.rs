use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::async_trait;
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, put};
use axum::Router;
use log::{info, warn};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::{log_manager_error, ArgumentError, ErrorCode, ManagerError};
use crate::supervisor::Supervisor;

use super::query::QueryArgs;

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct ControlState {
    supervisor: Arc<Supervisor>,
}

impl ControlState {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }
}

/// HTTP error variants mapped to JSON responses.
#[derive(Debug)]
pub enum HttpServerError {
    BadRequest(ArgumentError),
    MalformedQuery(String),
    UnknownOperation { method: Method, path: String },
    Internal(ManagerError),
}

impl From<ArgumentError> for HttpServerError {
    fn from(err: ArgumentError) -> Self {
        Self::BadRequest(err)
    }
}

impl From<ManagerError> for HttpServerError {
    fn from(err: ManagerError) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(err) => {
                warn!(
                    "[ControlSurface] Rejected arguments: code={}, message={}",
                    err.code(),
                    err.message()
                );
                (StatusCode::BAD_REQUEST, err.message())
            }
            Self::MalformedQuery(reason) => (StatusCode::BAD_REQUEST, reason),
            Self::UnknownOperation { method, path } => (
                StatusCode::NOT_FOUND,
                format!("no operation registered for {} {}", method, path),
            ),
            Self::Internal(err) => {
                log_manager_error(&err, "control_surface");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal controller error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// What a control operation hands back: nothing, or a JSON value.
#[derive(Debug)]
pub enum ControlReply {
    Empty,
    Json(Value),
}

impl IntoResponse for ControlReply {
    fn into_response(self) -> Response {
        match self {
            ControlReply::Empty => StatusCode::OK.into_response(),
            ControlReply::Json(value) => (StatusCode::OK, Json(value)).into_response(),
        }
    }
}

type ControlResult = Result<ControlReply, HttpServerError>;

#[async_trait]
impl<S> FromRequestParts<S> for QueryArgs
where
    S: Send + Sync,
{
    type Rejection = HttpServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| HttpServerError::MalformedQuery(rejection.body_text()))?;
        Ok(QueryArgs::from_pairs(pairs))
    }
}

/// Build the Axum router with all control operations.
pub fn build_router(state: ControlState) -> Router {
    Router::new()
        .route("/get_current_playlist", get(get_current_playlist))
        .route("/get_playlists", get(get_playlists))
        .route("/get_motion_control_enabled", get(get_motion_control_enabled))
        .route("/set_playback_enabled", put(set_playback_enabled))
        .route("/resume_playback", put(resume_playback))
        .route("/pause_playback", put(pause_playback))
        .route("/set_motion_control_enabled", put(set_motion_control_enabled))
        .route("/enable_motion_control", put(enable_motion_control))
        .route("/disable_motion_control", put(disable_motion_control))
        .route("/next_track", put(next_track))
        .route("/set_current_playlist", put(set_current_playlist))
        .fallback(unknown_operation)
        .with_state(state)
}

/// Serve the control surface until `shutdown` is cancelled.
///
/// Requests already accepted are allowed to finish.
pub async fn run_http_server(
    supervisor: Arc<Supervisor>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding control surface listener on {}", addr))?;
    info!("[ControlSurface] Listening on {}", addr);

    let router = build_router(ControlState::new(supervisor));
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("serving control surface router")?;

    info!("[ControlSurface] Stopped accepting requests");
    Ok(())
}

pub async fn get_current_playlist(State(state): State<ControlState>, args: QueryArgs) -> ControlResult {
    args.allow_only(&[])?;
    let current = state.supervisor.get_current_playlist().await?;
    Ok(ControlReply::Json(json!(current)))
}

pub async fn get_playlists(State(state): State<ControlState>, args: QueryArgs) -> ControlResult {
    args.allow_only(&[])?;
    let playlists = state.supervisor.get_playlists().await?;
    Ok(ControlReply::Json(json!({ "playlists": playlists })))
}

pub async fn get_motion_control_enabled(
    State(state): State<ControlState>,
    args: QueryArgs,
) -> ControlResult {
    args.allow_only(&[])?;
    let enabled = state.supervisor.motion_control_enabled().await?;
    Ok(ControlReply::Json(json!({ "enabled": enabled })))
}

pub async fn set_playback_enabled(State(state): State<ControlState>, args: QueryArgs) -> ControlResult {
    args.allow_only(&["flag"])?;
    let flag = args.required_bool("flag")?;
    state.supervisor.set_playback_enabled(flag)?;
    Ok(ControlReply::Empty)
}

pub async fn resume_playback(State(state): State<ControlState>, args: QueryArgs) -> ControlResult {
    args.allow_only(&[])?;
    state.supervisor.resume_playback()?;
    Ok(ControlReply::Empty)
}

pub async fn pause_playback(State(state): State<ControlState>, args: QueryArgs) -> ControlResult {
    args.allow_only(&[])?;
    state.supervisor.pause_playback()?;
    Ok(ControlReply::Empty)
}

pub async fn set_motion_control_enabled(
    State(state): State<ControlState>,
    args: QueryArgs,
) -> ControlResult {
    args.allow_only(&["flag"])?;
    let flag = args.required_bool("flag")?;
    state.supervisor.set_motion_control_enabled(flag)?;
    Ok(ControlReply::Empty)
}

pub async fn enable_motion_control(State(state): State<ControlState>, args: QueryArgs) -> ControlResult {
    args.allow_only(&[])?;
    state.supervisor.set_motion_control_enabled(true)?;
    Ok(ControlReply::Empty)
}

pub async fn disable_motion_control(State(state): State<ControlState>, args: QueryArgs) -> ControlResult {
    args.allow_only(&[])?;
    state.supervisor.set_motion_control_enabled(false)?;
    Ok(ControlReply::Empty)
}

pub async fn next_track(State(state): State<ControlState>, args: QueryArgs) -> ControlResult {
    args.allow_only(&[])?;
    state.supervisor.next_track()?;
    Ok(ControlReply::Empty)
}

pub async fn set_current_playlist(State(state): State<ControlState>, args: QueryArgs) -> ControlResult {
    args.allow_only(&["index"])?;
    let index = args.required_index("index")?;
    state.supervisor.set_current_playlist(index)?;
    Ok(ControlReply::Empty)
}

async fn unknown_operation(method: Method, uri: Uri) -> HttpServerError {
    HttpServerError::UnknownOperation {
        method,
        path: uri.path().to_string(),
    }
}
