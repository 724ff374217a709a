//! Card image delivery
//!
//! `GET /cards/{id}/image` with the conditional-GET contract for derived
//! binary artifacts: strong content-hash ETag, `304` short-circuit on a
//! matching `If-None-Match`, long-lived immutable cache headers otherwise.
//! An artifact never changes under its key.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

use super::error_response;
use crate::ledger::VoteStore;
use crate::server::AppState;
use crate::services::ObjectStore;
use crate::types::TurnstileError;

/// Check an `If-None-Match` header value against a strong ETag
fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match
        .split(',')
        .any(|candidate| candidate.trim() == etag || candidate.trim() == "*")
}

pub async fn handle_card_image(
    state: Arc<AppState>,
    card_id: &str,
    if_none_match: Option<&str>,
) -> Response<Full<Bytes>> {
    let card = match state.votes.get_card(card_id).await {
        Ok(Some(card)) => card,
        Ok(None) => {
            return error_response(&TurnstileError::NotFound("card not found".to_string()))
        }
        Err(e) => return error_response(&e.into()),
    };

    let object = match state.objects.get(&card.image_key).await {
        Ok(Some(object)) => object,
        Ok(None) => {
            return error_response(&TurnstileError::NotFound("image not found".to_string()))
        }
        Err(e) => return error_response(&e),
    };

    if let Some(candidates) = if_none_match {
        if etag_matches(candidates, &object.etag) {
            debug!(card_id, "ETag match, returning 304");
            return Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .body(Full::new(Bytes::new()))
                .unwrap();
        }
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &object.content_type)
        .header(header::CONTENT_LENGTH, object.data.len())
        .header(header::ETAG, &object.etag)
        .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(object.data))
        .unwrap()
}
