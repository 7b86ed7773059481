//! Admin HTTP surface: health, status, manual trigger.

use std::sync::Arc;

use argus_scheduler::Scheduler;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
}

/// Build the admin router.
pub fn router(scheduler: Scheduler) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/collect/:source", post(collect))
        .layer(cors)
        .with_state(Arc::new(AppState { scheduler }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "collector",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let config = state.scheduler.config();
    Json(serde_json::json!({
        "scheduler": if state.scheduler.is_running() { "running" } else { "stopped" },
        "pollInterval": format!("{}s", config.poll_interval.as_secs()),
        "lookbackDays": config.lookback_days,
    }))
}

async fn collect(
    State(state): State<Arc<AppState>>,
    Path(source): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    state.scheduler.run_now(&source);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "Collection started",
            "source": source,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_control::{ControlPlane, StateStore};
    use argus_publish::Publisher;
    use argus_scheduler::SchedulerConfig;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn scheduler() -> Scheduler {
        Scheduler::new(
            SchedulerConfig::default(),
            Arc::new(ControlPlane::new("http://127.0.0.1:1", "secret")),
            Arc::new(StateStore::new("http://127.0.0.1:1", "secret")),
            Arc::new(Publisher::new("http://127.0.0.1:1", None)),
            None,
        )
    }

    #[tokio::test]
    async fn health_answers_ok() {
        let app = router(scheduler());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "collector");
    }

    #[tokio::test]
    async fn status_reports_scheduler_state() {
        let app = router(scheduler());
        let response = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["scheduler"], "stopped");
        assert_eq!(json["lookbackDays"], 7);
    }

    #[tokio::test]
    async fn collect_accepts_and_echoes_the_source() {
        let app = router(scheduler());
        let response = app
            .oneshot(
                Request::post("/collect/sentinelone")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["source"], "sentinelone");
    }
}
