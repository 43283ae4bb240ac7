//! API route definitions.

use axum::extract::{Query, State};
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/traffic/status", get(traffic_status))
        .route("/traffic/alerts", get(traffic_alerts))
        .route("/traffic/config", get(traffic_config))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn traffic_status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.detector.status();
    Json(json!({ "data": snapshot }))
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    limit: Option<usize>,
}

async fn traffic_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Json<Value> {
    let alerts = state.detector.recent_alerts(query.limit);
    Json(json!({ "data": alerts, "meta": { "total": alerts.len() } }))
}

async fn traffic_config(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "data": state.detector.config() }))
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::api::state::AppState;
    use crate::config::AppConfig;
    use crate::detect::{Detector, DetectorConfig};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt; // for `oneshot`

    /// Router whose detector rebuilds on every call and alerts on tiny
    /// volumes, so each request is visible immediately.
    fn app() -> Router {
        let detector = Detector::new(DetectorConfig {
            ingest_cache_ms: 0,
            query_cache_ms: 0,
            min_alert_gap_ms: 0,
            high_threshold_rpm: 3,
            critical_threshold_rpm: 5,
            ..DetectorConfig::default()
        })
        .unwrap();
        router(AppState::new(detector, AppConfig::default()))
    }

    async fn get_json(app: &Router, uri: &str, client: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .uri(uri)
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = app();
        let (status, json) = get_json(&app, "/api/v1/health", "198.51.100.1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "ok");
        assert!(json["data"]["version"].is_string());
    }

    #[tokio::test]
    async fn test_status_counts_tracked_requests() {
        let app = app();
        get_json(&app, "/api/v1/health", "203.0.113.5").await;
        get_json(&app, "/api/v1/health", "203.0.113.5").await;

        // The status request itself is tracked too.
        let (status, json) = get_json(&app, "/api/v1/traffic/status", "198.51.100.1").await;
        assert_eq!(status, StatusCode::OK);
        let data = &json["data"];
        assert_eq!(data["requests_per_minute"], 3);
        assert_eq!(data["unique_keys"], 2);
        assert_eq!(data["top_keys"][0]["key"], "203.0.113.5");
        assert_eq!(data["level"], "high");
        assert_eq!(data["label"], "High Traffic");
    }

    #[tokio::test]
    async fn test_unknown_paths_are_tracked_and_404() {
        let app = app();
        let (status, _) = get_json(&app, "/wp-login.php", "203.0.113.9").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, json) = get_json(&app, "/api/v1/traffic/status", "203.0.113.9").await;
        assert_eq!(json["data"]["requests_per_minute"], 2);
        assert_eq!(json["data"]["top_keys"][0]["percent"], 100.0);
    }

    #[tokio::test]
    async fn test_alerts_endpoint_respects_limit() {
        let app = app();
        for _ in 0..6 {
            get_json(&app, "/api/v1/health", "203.0.113.7").await;
        }

        let (status, json) = get_json(&app, "/api/v1/traffic/alerts?limit=2", "203.0.113.7").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["meta"]["total"], 2);
        let alerts = json["data"].as_array().unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0]["level"], "critical");
        assert!(alerts[0]["id"].is_string());
    }

    #[tokio::test]
    async fn test_config_endpoint() {
        let app = app();
        let (_, json) = get_json(&app, "/api/v1/traffic/config", "198.51.100.1").await;
        assert_eq!(json["data"]["window_ms"], 60_000);
        assert_eq!(json["data"]["high_threshold_rpm"], 3);
    }
}
