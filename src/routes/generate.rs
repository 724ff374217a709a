//! Card generation
//!
//! `POST /generate` with a wallet-signed challenge. Admission is layered:
//! per-IP rate limit first (cheapest), then signature + single-use nonce,
//! then the once-per-day quota. Only after all gates pass does the provider
//! get called and the card row created.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::cards::CardView;
use super::{error_response, json_response};
use crate::auth::nonce::Action;
use crate::auth::signature;
use crate::ledger::{Card, VoteStore};
use crate::server::AppState;
use crate::services::{ImageGenerator, ObjectStore, TokenSource};
use crate::types::TurnstileError;

/// Prompt length bounds in UTF-8 bytes, same spirit as the signed-message
/// bounds: a cap on the request surface, nothing semantic.
pub const MAX_PROMPT_LEN: usize = 300;

/// Card id suffix length taken from the minted token
const CARD_ID_LEN: usize = 12;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    identity: String,
    nonce: String,
    message: String,
    signature: String,
    prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    ok: bool,
    card: CardView,
}

pub async fn handle_generate(
    state: Arc<AppState>,
    body: Bytes,
    client_ip: &str,
) -> Response<Full<Bytes>> {
    if let Err(e) = state.rate.check(&format!("img:{}", client_ip)).await {
        return error_response(&e);
    }

    let request: GenerateRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => {
            return error_response(&TurnstileError::BadRequest(
                "invalid JSON body".to_string(),
            ))
        }
    };

    if request.prompt.is_empty() || request.prompt.len() > MAX_PROMPT_LEN {
        return error_response(&TurnstileError::BadRequest(format!(
            "prompt length must be between 1 and {} bytes",
            MAX_PROMPT_LEN
        )));
    }

    if let Err(e) = signature::verify(&request.identity, &request.message, &request.signature) {
        return error_response(&e.into());
    }

    if !request.message.contains(&request.nonce) {
        return error_response(&TurnstileError::Unauthorized("unauthorized".to_string()));
    }

    if let Err(e) = state
        .nonces
        .consume(Action::Generate, &request.identity, &request.nonce)
        .await
    {
        return error_response(&e);
    }

    if let Err(e) = state.quota.try_consume(&request.identity).await {
        return error_response(&e);
    }

    let image = match state.images.generate(&request.prompt).await {
        Ok(image) => image,
        Err(e) => return error_response(&e),
    };

    let token = state.tokens.mint();
    let id = format!("CC_{}", &token[..CARD_ID_LEN.min(token.len())]);
    let image_key = format!("cards/{}.png", id);

    if let Err(e) = state
        .objects
        .put(&image_key, image, "image/png")
        .await
    {
        return error_response(&e);
    }

    let card = Card {
        id: id.clone(),
        owner: request.identity,
        prompt: request.prompt,
        upvotes: 0,
        downvotes: 0,
        image_key,
        created_at: chrono::Utc::now(),
    };

    if let Err(e) = state.votes.create_card(card.clone()).await {
        return error_response(&e.into());
    }

    info!(card_id = %id, "card generated");
    json_response(
        StatusCode::OK,
        &GenerateResponse {
            ok: true,
            card: CardView::from(card),
        },
    )
}
