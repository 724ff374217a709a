//! Health and version endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - liveness (is the gateway running?)
//! - /ready, /readyz - readiness (is the backing store reachable?)
//!
//! Dev mode runs on in-memory stores, so readiness has nothing external to
//! probe and reports ready.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::json_response;
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    healthy: bool,
    status: &'static str,
    version: &'static str,
    uptime: u64,
    mode: &'static str,
    node_id: String,
    timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadyResponse {
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
    commit: &'static str,
    built: &'static str,
}

pub fn health_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            healthy: true,
            status: "online",
            version: env!("CARGO_PKG_VERSION"),
            uptime: state.started.elapsed().as_secs(),
            mode: if state.args.dev_mode {
                "development"
            } else {
                "production"
            },
            node_id: state.args.node_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    )
}

pub async fn readiness_check(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match &state.mongo {
        Some(mongo) => match mongo.ping().await {
            Ok(()) => json_response(
                StatusCode::OK,
                &ReadyResponse {
                    ready: true,
                    error: None,
                },
            ),
            Err(_) => json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &ReadyResponse {
                    ready: false,
                    error: Some("storage unavailable".to_string()),
                },
            ),
        },
        None => json_response(
            StatusCode::OK,
            &ReadyResponse {
                ready: true,
                error: None,
            },
        ),
    }
}

pub fn version_info() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            version: env!("CARGO_PKG_VERSION"),
            commit: env!("GIT_COMMIT_SHORT"),
            built: env!("BUILD_TIMESTAMP"),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use clap::Parser;

    #[tokio::test]
    async fn liveness_and_readiness_in_dev_mode() {
        let state = Arc::new(AppState::in_memory(Args::parse_from([
            "turnstile",
            "--dev-mode",
            "true",
        ])));

        let health = health_check(Arc::clone(&state));
        assert_eq!(health.status(), StatusCode::OK);

        let ready = readiness_check(state).await;
        assert_eq!(ready.status(), StatusCode::OK);
    }
}
