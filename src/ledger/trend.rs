//! Trend scoring and card ordering
//!
//! `trending` divides net votes by a power of the card's age so popularity
//! decays faster than linearly but slower than quadratically. The offset
//! keeps brand-new cards from dividing by ~zero and caps their early-life
//! volatility.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use super::Card;

/// Tunable ranking policy for the trending order
#[derive(Debug, Clone, Copy)]
pub struct TrendWeights {
    /// Hours added to card age before decay
    pub age_offset_hours: f64,
    /// Exponent applied to the offset age
    pub decay_exponent: f64,
}

impl Default for TrendWeights {
    fn default() -> Self {
        Self {
            age_offset_hours: 2.0,
            decay_exponent: 1.5,
        }
    }
}

/// Card listing orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Newest,
    Top,
    #[default]
    Trending,
}

impl SortOrder {
    pub fn parse(s: &str) -> Option<SortOrder> {
        match s {
            "newest" => Some(SortOrder::Newest),
            "top" => Some(SortOrder::Top),
            "trending" => Some(SortOrder::Trending),
            _ => None,
        }
    }
}

/// Time-decayed popularity score
pub fn trend_score(
    upvotes: u64,
    downvotes: u64,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    weights: &TrendWeights,
) -> f64 {
    let hours = ((now - created_at).num_seconds().max(0)) as f64 / 3600.0;
    let net = upvotes as f64 - downvotes as f64;
    net / (hours + weights.age_offset_hours).powf(weights.decay_exponent)
}

/// Sort cards in place by the requested order.
///
/// Ties break on `created_at` descending; `top` additionally breaks score
/// ties on `upvotes` descending first. Non-finite trend scores sort last.
pub fn sort_cards(cards: &mut [Card], order: SortOrder, now: DateTime<Utc>, weights: &TrendWeights) {
    match order {
        SortOrder::Newest => {
            cards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        SortOrder::Top => {
            cards.sort_by(|a, b| {
                b.score()
                    .cmp(&a.score())
                    .then_with(|| b.upvotes.cmp(&a.upvotes))
                    .then_with(|| b.created_at.cmp(&a.created_at))
            });
        }
        SortOrder::Trending => {
            cards.sort_by(|a, b| {
                let score_a = trend_score(a.upvotes, a.downvotes, a.created_at, now, weights);
                let score_b = trend_score(b.upvotes, b.downvotes, b.created_at, now, weights);
                match (score_a.is_finite(), score_b.is_finite()) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => score_b
                        .partial_cmp(&score_a)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| b.created_at.cmp(&a.created_at)),
                }
            });
        }
    }
}
