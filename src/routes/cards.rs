//! Card listing and lookup
//!
//! `GET /cards?sort=trending|top|newest&limit=N` and `GET /cards/{id}`.
//! Sorting happens in-process because the trending order is computed from
//! the request time; the three orders share one code path.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{error_response, json_response};
use crate::ledger::{sort_cards, Card, SortOrder, VoteStore};
use crate::server::AppState;
use crate::types::TurnstileError;

/// Listing size defaults and cap
const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;

/// Public JSON shape of a card
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub id: String,
    pub owner: String,
    pub prompt: String,
    pub upvotes: u64,
    pub downvotes: u64,
    pub score: i64,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<Card> for CardView {
    fn from(card: Card) -> Self {
        let image_url = format!("/cards/{}/image", card.id);
        Self {
            score: card.score(),
            id: card.id,
            owner: card.owner,
            prompt: card.prompt,
            upvotes: card.upvotes,
            downvotes: card.downvotes,
            image_url,
            created_at: card.created_at,
        }
    }
}

#[derive(Deserialize)]
struct ListQuery {
    sort: Option<String>,
    limit: Option<usize>,
}

pub async fn handle_list_cards(state: Arc<AppState>, query: &str) -> Response<Full<Bytes>> {
    let query: ListQuery = match serde_urlencoded::from_str(query) {
        Ok(q) => q,
        Err(_) => {
            return error_response(&TurnstileError::BadRequest(
                "invalid query parameters".to_string(),
            ))
        }
    };

    let order = match query.sort.as_deref() {
        None => SortOrder::default(),
        Some(s) => match SortOrder::parse(s) {
            Some(order) => order,
            None => {
                return error_response(&TurnstileError::BadRequest(
                    "sort must be one of newest, top, trending".to_string(),
                ))
            }
        },
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let mut cards = match state.votes.list_cards().await {
        Ok(cards) => cards,
        Err(e) => return error_response(&e.into()),
    };

    sort_cards(&mut cards, order, Utc::now(), &state.trend);
    cards.truncate(limit);

    let views: Vec<CardView> = cards.into_iter().map(CardView::from).collect();
    json_response(StatusCode::OK, &views)
}

pub async fn handle_get_card(state: Arc<AppState>, card_id: &str) -> Response<Full<Bytes>> {
    match state.votes.get_card(card_id).await {
        Ok(Some(card)) => json_response(StatusCode::OK, &CardView::from(card)),
        Ok(None) => error_response(&TurnstileError::NotFound("card not found".to_string())),
        Err(e) => error_response(&e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use crate::ledger::VoteStore;
    use chrono::Duration;
    use clap::Parser;
    use http_body_util::BodyExt;

    fn state() -> Arc<AppState> {
        Arc::new(AppState::in_memory(Args::parse_from([
            "turnstile",
            "--dev-mode",
            "true",
        ])))
    }

    async fn seed(state: &AppState, id: &str, upvotes: u64, downvotes: u64, age_hours: i64) {
        state
            .votes
            .create_card(Card {
                id: id.to_string(),
                owner: "owner-wallet".to_string(),
                prompt: "much meme".to_string(),
                upvotes,
                downvotes,
                image_key: format!("cards/{id}.png"),
                created_at: Utc::now() - Duration::hours(age_hours),
            })
            .await
            .unwrap();
    }

    async fn listed_ids(response: Response<Full<Bytes>>) -> Vec<String> {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        json.as_array()
            .unwrap()
            .iter()
            .map(|card| card["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn listing_defaults_to_trending() {
        let state = state();
        seed(&state, "CC_OLD", 10, 0, 72).await;
        seed(&state, "CC_NEW", 10, 0, 1).await;

        let response = handle_list_cards(state, "").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(listed_ids(response).await, ["CC_NEW", "CC_OLD"]);
    }

    #[tokio::test]
    async fn top_ignores_age() {
        let state = state();
        seed(&state, "CC_OLD", 10, 0, 72).await;
        seed(&state, "CC_NEW", 3, 0, 1).await;

        let response = handle_list_cards(state, "sort=top").await;
        assert_eq!(listed_ids(response).await, ["CC_OLD", "CC_NEW"]);
    }

    #[tokio::test]
    async fn limit_truncates_after_sorting() {
        let state = state();
        for i in 0..5 {
            seed(&state, &format!("CC_{i}"), i, 0, 1).await;
        }

        let response = handle_list_cards(state, "sort=top&limit=2").await;
        assert_eq!(listed_ids(response).await, ["CC_4", "CC_3"]);
    }

    #[tokio::test]
    async fn unknown_sort_is_a_bad_request() {
        let state = state();
        let response = handle_list_cards(state, "sort=spicy").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn single_card_lookup() {
        let state = state();
        seed(&state, "CC_ABC", 2, 1, 1).await;

        let found = handle_get_card(Arc::clone(&state), "CC_ABC").await;
        assert_eq!(found.status(), StatusCode::OK);
        let bytes = found.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["score"], 1);
        assert_eq!(json["imageUrl"], "/cards/CC_ABC/image");

        let missing = handle_get_card(state, "CC_NOPE").await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
