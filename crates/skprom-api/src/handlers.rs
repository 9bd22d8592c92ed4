//! Route handlers. Rendering never fails; an idle exporter yields an empty body.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use tracing::debug;

use skprom_metrics::PROMETHEUS_CONTENT_TYPE;

use crate::ApiState;

/// GET /prometheus
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = state.exporter.render();
    debug!(bytes = body.len(), "prometheus scrape served");
    (StatusCode::OK, [(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body)
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::to_bytes;
    use serde_json::json;
    use skprom_core::{Delta, DeltaBus, ExporterConfig};
    use skprom_metrics::Exporter;

    fn test_state() -> (ApiState, DeltaBus) {
        let bus = DeltaBus::new();
        let exporter = Arc::new(Exporter::new());
        exporter.start("vessels.self", &ExporterConfig::default(), &bus);
        (ApiState { exporter }, bus)
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let (state, _bus) = test_state();
        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get(CONTENT_TYPE).unwrap().to_str().unwrap();
        assert_eq!(content_type, "text/plain; version=0.0.4; charset=utf-8");

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn prometheus_endpoint_renders_samples() {
        let (state, bus) = test_state();
        let delta: Delta = serde_json::from_value(json!({
            "context": "vessels.self",
            "updates": [{"$source": "nmea.II", "values": [{"path": "environment.depth.belowKeel", "value": 4.2}]}]
        }))
        .unwrap();
        bus.publish(&delta);

        let resp = prometheus_metrics(State(state)).await.into_response();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("# TYPE environment_depth_belowKeel gauge\n"));
        assert!(text.contains("environment_depth_belowKeel{context=\"vessels.self\",source=\"nmea.II\"} 4.2 "));
    }

    #[tokio::test]
    async fn stopped_exporter_still_answers() {
        let (state, _bus) = test_state();
        state.exporter.stop();
        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn healthz_ok() {
        assert_eq!(healthz().await, "ok");
    }
}
