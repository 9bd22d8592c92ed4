//! skprom-api — HTTP scrape endpoint.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/prometheus` | Prometheus exposition of live samples |
//! | GET | `/healthz` | Liveness probe |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use skprom_metrics::Exporter;

/// Shared state for handlers.
#[derive(Clone)]
pub struct ApiState {
    pub exporter: Arc<Exporter>,
}

/// Build the router serving the scrape endpoint.
pub fn build_router(exporter: Arc<Exporter>) -> Router {
    Router::new()
        .route("/prometheus", get(handlers::prometheus_metrics))
        .route("/healthz", get(handlers::healthz))
        .with_state(ApiState { exporter })
}
