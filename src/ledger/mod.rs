//! Vote ledger and card aggregates
//!
//! At most one vote per (card, voter) pair; a second vote replaces the
//! first. Card counters are maintained incrementally by signed deltas so an
//! aggregate update is O(1) no matter how much vote history exists, and the
//! counters always equal a recount of the live vote rows.

pub mod memory;
pub mod mongo;
pub mod trend;

pub use memory::MemoryVotes;
pub use mongo::MongoVotes;
pub use trend::{sort_cards, trend_score, SortOrder, TrendWeights};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TurnstileError;

/// A vote's direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn as_i32(&self) -> i32 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

impl TryFrom<i32> for VoteValue {
    type Error = TurnstileError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            _ => Err(TurnstileError::BadRequest(
                "vote value must be 1 or -1".to_string(),
            )),
        }
    }
}

/// Post-vote aggregate counters for a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub upvotes: u64,
    pub downvotes: u64,
    pub score: i64,
}

impl VoteTally {
    pub fn new(upvotes: u64, downvotes: u64) -> Self {
        Self {
            upvotes,
            downvotes,
            score: upvotes as i64 - downvotes as i64,
        }
    }
}

/// A generated card with its running vote aggregates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub owner: String,
    pub prompt: String,
    pub upvotes: u64,
    pub downvotes: u64,
    /// Object storage key of the rendered image
    pub image_key: String,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn score(&self) -> i64 {
        self.upvotes as i64 - self.downvotes as i64
    }
}

/// Vote ledger failures
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("subject not found")]
    SubjectNotFound,

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<LedgerError> for TurnstileError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::SubjectNotFound => TurnstileError::NotFound("card not found".to_string()),
            LedgerError::Storage(msg) => TurnstileError::Database(msg),
        }
    }
}

/// Transactional vote/card capability.
///
/// `cast_vote` must observe the previous vote and write the new one as one
/// atomic step per (card, voter) key, then apply deltas to the card's
/// counters with an atomic increment. Implementations never recount.
#[async_trait::async_trait]
pub trait VoteStore: Send + Sync {
    async fn create_card(&self, card: Card) -> Result<(), LedgerError>;

    async fn get_card(&self, id: &str) -> Result<Option<Card>, LedgerError>;

    async fn list_cards(&self) -> Result<Vec<Card>, LedgerError>;

    /// Insert or replace the voter's vote on `subject` and return the
    /// post-update counters. An unchanged re-vote is a no-op, not an error.
    async fn cast_vote(
        &self,
        subject: &str,
        voter: &str,
        value: VoteValue,
    ) -> Result<VoteTally, LedgerError>;
}

/// Counter deltas caused by replacing `prev` with `value`:
///
/// | prev | value | up | down |
/// |------|-------|----|------|
/// | None | +1    | +1 |  0   |
/// | None | -1    |  0 | +1   |
/// | v    | v     |  0 |  0   |
/// | +1   | -1    | -1 | +1   |
/// | -1   | +1    | +1 | -1   |
pub(crate) fn vote_deltas(prev: Option<VoteValue>, value: VoteValue) -> (i64, i64) {
    match (prev, value) {
        (None, VoteValue::Up) => (1, 0),
        (None, VoteValue::Down) => (0, 1),
        (Some(p), v) if p == v => (0, 0),
        (Some(VoteValue::Up), VoteValue::Down) => (-1, 1),
        (Some(VoteValue::Down), VoteValue::Up) => (1, -1),
        // The guard above covers equal pairs; only the two flips remain.
        _ => unreachable!(),
    }
}
