//! Challenge issuance
//!
//! `GET /auth/challenge?action=vote|generate&identity=...`
//!
//! Unauthenticated and therefore rate-limited per client IP. The issued
//! token must appear inside the message the wallet signs.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{error_response, json_response};
use crate::auth::nonce::{Action, NonceError};
use crate::server::AppState;
use crate::types::TurnstileError;

#[derive(Deserialize)]
struct ChallengeQuery {
    action: String,
    identity: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeResponse {
    nonce: String,
    ttl_seconds: u64,
}

pub async fn handle_challenge(
    state: Arc<AppState>,
    query: &str,
    client_ip: &str,
) -> Response<Full<Bytes>> {
    if let Err(e) = state.rate.check(&format!("challenge:{}", client_ip)).await {
        return error_response(&e);
    }

    let query: ChallengeQuery = match serde_urlencoded::from_str(query) {
        Ok(q) => q,
        Err(_) => {
            return error_response(&TurnstileError::BadRequest(
                "action and identity query parameters are required".to_string(),
            ))
        }
    };

    let action = match Action::parse(&query.action) {
        Some(action) => action,
        None => return error_response(&TurnstileError::from(NonceError::InvalidAction)),
    };

    match state.nonces.issue(action, &query.identity).await {
        Ok(issued) => json_response(
            StatusCode::OK,
            &ChallengeResponse {
                nonce: issued.token,
                ttl_seconds: issued.ttl_seconds,
            },
        ),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use clap::Parser;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::in_memory(Args::parse_from([
            "turnstile",
            "--dev-mode",
            "true",
        ])))
    }

    fn identity() -> String {
        bs58::encode([7u8; 32]).into_string()
    }

    #[tokio::test]
    async fn issues_a_nonce_for_a_valid_request() {
        let state = state();
        let query = format!("action=vote&identity={}", identity());

        let response = handle_challenge(state, &query, "1.2.3.4").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_action_is_a_bad_request() {
        let state = state();
        let query = format!("action=mint&identity={}", identity());

        let response = handle_challenge(state, &query, "1.2.3.4").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_parameters_are_a_bad_request() {
        let state = state();

        let response = handle_challenge(state, "action=vote", "1.2.3.4").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn issuance_is_rate_limited_per_ip() {
        let state = state();
        let query = format!("action=vote&identity={}", identity());
        let limit = state.rate.limit_per_window();

        for _ in 0..limit {
            let response = handle_challenge(Arc::clone(&state), &query, "9.9.9.9").await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        let over = handle_challenge(Arc::clone(&state), &query, "9.9.9.9").await;
        assert_eq!(over.status(), StatusCode::TOO_MANY_REQUESTS);

        // A different client is unaffected
        let other = handle_challenge(state, &query, "8.8.8.8").await;
        assert_eq!(other.status(), StatusCode::OK);
    }
}
