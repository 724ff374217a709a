//! Vote casting
//!
//! `POST /cards/{id}/vote` with a wallet-signed challenge. The pipeline is
//! shape validation, signature verification, nonce binding, single-use
//! nonce consumption, then the ledger write. Signature and nonce failures
//! return the same unauthorized body.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::{error_response, json_response};
use crate::auth::nonce::Action;
use crate::auth::signature;
use crate::ledger::{VoteStore, VoteValue};
use crate::server::AppState;
use crate::types::TurnstileError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteRequest {
    identity: String,
    nonce: String,
    message: String,
    signature: String,
    value: i32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoteResponse {
    ok: bool,
    upvotes: u64,
    downvotes: u64,
    score: i64,
}

pub async fn handle_vote(
    state: Arc<AppState>,
    card_id: &str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let request: VoteRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(_) => {
            return error_response(&TurnstileError::BadRequest(
                "invalid JSON body".to_string(),
            ))
        }
    };

    let value = match VoteValue::try_from(request.value) {
        Ok(v) => v,
        Err(e) => return error_response(&e),
    };

    if let Err(e) = signature::verify(&request.identity, &request.message, &request.signature) {
        return error_response(&e.into());
    }

    // The signed message must embed the challenge token, otherwise an old
    // signed message could ride on a freshly issued nonce.
    if !request.message.contains(&request.nonce) {
        return error_response(&TurnstileError::Unauthorized("unauthorized".to_string()));
    }

    if let Err(e) = state
        .nonces
        .consume(Action::Vote, &request.identity, &request.nonce)
        .await
    {
        return error_response(&e);
    }

    match state
        .votes
        .cast_vote(card_id, &request.identity, value)
        .await
    {
        Ok(tally) => {
            info!(card_id, value = value.as_i32(), "vote recorded");
            json_response(
                StatusCode::OK,
                &VoteResponse {
                    ok: true,
                    upvotes: tally.upvotes,
                    downvotes: tally.downvotes,
                    score: tally.score,
                },
            )
        }
        Err(e) => error_response(&e.into()),
    }
}
