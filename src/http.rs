// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! JSON HTTP surface over [`MirrorService`].
//!
//! | Route | Operation |
//! |-------|-----------|
//! | `POST /api/messages` | create a message (201) |
//! | `GET /api/messages?limit&offset` | local feed, newest first |
//! | `GET /api/messages/remote` | feed rebuilt from the repositories, oldest first |
//! | `GET /api/repositories` | registered targets |
//! | `GET /health` | liveness |

use crate::error::{MirrorError, Result};
use crate::service::MirrorService;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

impl MirrorError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            MirrorError::Validation(_) => StatusCode::BAD_REQUEST,
            MirrorError::RemoteNotFound { .. } => StatusCode::NOT_FOUND,
            MirrorError::RemoteUnavailable { .. } | MirrorError::RemoteConflict { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MirrorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(service: Arc<MirrorService>) -> Router {
    Router::new()
        .route("/api/messages", get(list_messages).post(create_message))
        .route("/api/messages/remote", get(remote_messages))
        .route("/api/repositories", get(list_repositories))
        .route("/health", get(health))
        .with_state(service)
}

/// Serve until Ctrl-C.
pub async fn serve(service: Arc<MirrorService>) -> Result<()> {
    let addr = service.config().server.bind_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

#[derive(Deserialize)]
struct CreateMessageRequest {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<u32>,
    #[serde(default)]
    offset: u32,
}

async fn create_message(
    State(service): State<Arc<MirrorService>>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse> {
    let created = service.create_message(&req.content).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_messages(
    State(service): State<Arc<MirrorService>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let feed = service.list_messages(query.limit, query.offset).await?;
    Ok(Json(feed))
}

async fn remote_messages(State(service): State<Arc<MirrorService>>) -> impl IntoResponse {
    Json(service.fetch_remote_messages().await)
}

async fn list_repositories(State(service): State<Arc<MirrorService>>) -> impl IntoResponse {
    Json(service.targets().await)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
