//! HTTP routes for Turnstile

pub mod cards;
pub mod challenge;
pub mod generate;
pub mod health;
pub mod media;
pub mod vote;

pub use cards::{handle_get_card, handle_list_cards, CardView};
pub use challenge::handle_challenge;
pub use generate::handle_generate;
pub use health::{health_check, readiness_check, version_info};
pub use media::handle_card_image;
pub use vote::handle_vote;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::types::TurnstileError;

/// Create a JSON response with permissive CORS
pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let payload = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(payload)))
        .unwrap()
}

/// Render an error as its JSON body. Server-side detail goes to the log,
/// not the client.
pub(crate) fn error_response(err: &TurnstileError) -> Response<Full<Bytes>> {
    let status = err.status_code();
    if status.is_server_error() {
        error!("request failed: {}", err);
    }
    json_response(status, &serde_json::json!({ "error": err.public_message() }))
}
