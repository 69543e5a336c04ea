//! HTTP allocation API.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/allocate/{client_id}` | Assign a client to an edge server |
//! | `GET` | `/status` | Snapshot of the node table |

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::warn;
use serde::Serialize;

use crate::{Allocator, Prober, Provisioner};

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    retryable: bool,
}

/// Creates the allocation router.
///
/// # Arguments
/// * `allocator` - The allocator shared by every request.
pub fn router<P, V>(allocator: Arc<Allocator<P, V>>) -> Router
where
    P: Prober + Sync + 'static,
    V: Provisioner + Sync + 'static,
{
    Router::new()
        .route("/allocate/{client_id}", post(allocate::<P, V>))
        .route("/status", get(status::<P, V>))
        .with_state(allocator)
}

/// `POST /allocate/{client_id}`
async fn allocate<P, V>(
    State(allocator): State<Arc<Allocator<P, V>>>,
    Path(client_id): Path<String>,
) -> Response
where
    P: Prober + Sync + 'static,
    V: Provisioner + Sync + 'static,
{
    match allocator.allocate(&client_id).await {
        Ok(allocation) => Json(allocation).into_response(),
        Err(e) => {
            warn!("allocation of {client_id} failed: {e}");

            let (status, retryable) = if e.is_retryable() {
                (StatusCode::SERVICE_UNAVAILABLE, true)
            } else {
                (StatusCode::INTERNAL_SERVER_ERROR, false)
            };

            let body = ErrorResponse {
                error: e.to_string(),
                retryable,
            };

            (status, Json(body)).into_response()
        }
    }
}

/// `GET /status`
async fn status<P, V>(State(allocator): State<Arc<Allocator<P, V>>>) -> Response
where
    P: Prober + Sync + 'static,
    V: Provisioner + Sync + 'static,
{
    Json(allocator.status()).into_response()
}
