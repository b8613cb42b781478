//! HTTP transport.
//!
//! - `POST /run?task=<description>`: dispatch a task description
//! - `GET /read?path=<path>`: raw bytes of a file inside the sandbox
//! - `POST /filter_csv`: run `csv_filter` with a JSON body
//! - `GET /operations`: the registered catalogue

use std::future::Future;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::dispatch::{ErrorKind, ResultEnvelope, TaskDispatcher};
use crate::operations::Parameter;

#[derive(Debug, Deserialize)]
struct RunParams {
    #[serde(default)]
    task: String,
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    path: String,
}

#[derive(Debug, Serialize)]
struct OperationInfo<'a> {
    name: &'a str,
    description: &'a str,
    dispatchable: bool,
    parameters: &'a [Parameter],
}

pub fn router(dispatcher: TaskDispatcher) -> Router {
    Router::new()
        .route("/run", post(run_task))
        .route("/read", get(read_file))
        .route("/filter_csv", post(filter_csv))
        .route("/operations", get(list_operations))
        .with_state(dispatcher)
}

/// Serves until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    dispatcher: TaskDispatcher,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{addr}");
    }
    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")
}

pub fn status_for(envelope: &ResultEnvelope) -> StatusCode {
    match envelope.error_kind() {
        None => StatusCode::OK,
        Some(ErrorKind::UnrecognizedTask | ErrorKind::InvalidArguments) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::SandboxViolation) => StatusCode::FORBIDDEN,
        Some(ErrorKind::UnknownOperation) => StatusCode::NOT_FOUND,
        Some(ErrorKind::NotImplemented) => StatusCode::NOT_IMPLEMENTED,
        Some(ErrorKind::HandlerFailure) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn envelope_response(envelope: ResultEnvelope) -> Response {
    (status_for(&envelope), Json(envelope)).into_response()
}

async fn run_task(
    State(dispatcher): State<TaskDispatcher>,
    Query(params): Query<RunParams>,
) -> Response {
    envelope_response(dispatcher.dispatch(&params.task).await)
}

async fn filter_csv(State(dispatcher): State<TaskDispatcher>, Json(body): Json<Value>) -> Response {
    envelope_response(dispatcher.invoke("csv_filter", body).await)
}

async fn read_file(
    State(dispatcher): State<TaskDispatcher>,
    Query(params): Query<ReadParams>,
) -> Response {
    let path = match dispatcher.sandbox().check(&params.path) {
        Ok(path) => path,
        Err(e) => {
            warn!("Read refused: {e}");
            return (StatusCode::FORBIDDEN, format!("access denied: {e}")).into_response();
        }
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (
            StatusCode::NOT_FOUND,
            format!("file not found: {}", params.path),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("cannot read {}: {e}", params.path),
        )
            .into_response(),
    }
}

async fn list_operations(State(dispatcher): State<TaskDispatcher>) -> Response {
    let operations: Vec<OperationInfo<'_>> = dispatcher
        .registry()
        .iter()
        .map(|spec| OperationInfo {
            name: spec.name(),
            description: spec.handler.description(),
            dispatchable: spec.is_dispatchable(),
            parameters: spec.handler.parameters(),
        })
        .collect();
    Json(operations).into_response()
}
