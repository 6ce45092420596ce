//! HTTP endpoint serving the latest weight.
//!
//! Only `GET /weight` is routed. Unknown paths and methods get a JSON error
//! body; malformed requests are answered by the HTTP layer itself.

use crate::query::{ErrorResponse, ReadingUnavailable, WeightResponse, get_weight};
use crate::store::LatestReading;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::future::Future;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Path of the weight query.
pub const WEIGHT_PATH: &str = "/weight";

/// Non-success status with a JSON error body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: message.to_string(),
            },
        }
    }
}

impl From<ReadingUnavailable> for ApiError {
    fn from(err: ReadingUnavailable) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: ErrorResponse::from(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Answer a weight query from the store.
pub fn weight_query(store: &LatestReading) -> Result<Json<WeightResponse>, ApiError> {
    get_weight(store).map(Json).map_err(|unavailable| {
        debug!("weight queried before first reading");
        ApiError::from(unavailable)
    })
}

async fn weight(State(store): State<LatestReading>) -> Result<Json<WeightResponse>, ApiError> {
    weight_query(&store)
}

async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not found")
}

/// Routes of the query endpoint.
pub fn router(store: LatestReading) -> Router {
    Router::new()
        .route(WEIGHT_PATH, get(weight).fallback(method_not_allowed))
        .fallback(not_found)
        .with_state(store)
}

/// Serve weight queries until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, store: LatestReading, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "query endpoint listening");
    }

    if let Err(error) = axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(%error, "query endpoint failed");
    }
    debug!("query endpoint stopped");
}
