//! In-memory vote ledger
//!
//! Dev-mode and test backend. The vote-row entry guard serializes
//! concurrent casts for the same (card, voter) pair, mirroring the
//! conditional upsert the MongoDB backend relies on; counter updates are
//! commutative deltas, so their ordering across voters does not matter.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{vote_deltas, Card, LedgerError, VoteStore, VoteTally, VoteValue};

/// DashMap-backed [`VoteStore`] implementation
#[derive(Default)]
pub struct MemoryVotes {
    cards: DashMap<String, Card>,
    votes: DashMap<(String, String), VoteValue>,
}

impl MemoryVotes {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_deltas(card: &mut Card, up: i64, down: i64) {
        card.upvotes = (card.upvotes as i64 + up).max(0) as u64;
        card.downvotes = (card.downvotes as i64 + down).max(0) as u64;
    }

    #[cfg(test)]
    fn recount(&self, subject: &str) -> (u64, u64) {
        let mut up = 0;
        let mut down = 0;
        for entry in self.votes.iter() {
            if entry.key().0 == subject {
                match entry.value() {
                    VoteValue::Up => up += 1,
                    VoteValue::Down => down += 1,
                }
            }
        }
        (up, down)
    }
}

#[async_trait::async_trait]
impl VoteStore for MemoryVotes {
    async fn create_card(&self, card: Card) -> Result<(), LedgerError> {
        self.cards.insert(card.id.clone(), card);
        Ok(())
    }

    async fn get_card(&self, id: &str) -> Result<Option<Card>, LedgerError> {
        Ok(self.cards.get(id).map(|card| card.clone()))
    }

    async fn list_cards(&self) -> Result<Vec<Card>, LedgerError> {
        Ok(self.cards.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn cast_vote(
        &self,
        subject: &str,
        voter: &str,
        value: VoteValue,
    ) -> Result<VoteTally, LedgerError> {
        if !self.cards.contains_key(subject) {
            return Err(LedgerError::SubjectNotFound);
        }

        // Entry guard: concurrent casts from the same voter on the same
        // card serialize here, so each one observes the prior value its
        // deltas are computed against.
        let vote_key = (subject.to_string(), voter.to_string());
        let prev = match self.votes.entry(vote_key.clone()) {
            Entry::Occupied(mut occupied) => {
                let prev = *occupied.get();
                occupied.insert(value);
                Some(prev)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(value);
                None
            }
        };

        let (up, down) = vote_deltas(prev, value);

        if up == 0 && down == 0 {
            // Unchanged re-vote: counters stay as they are
            return self
                .cards
                .get(subject)
                .map(|card| VoteTally::new(card.upvotes, card.downvotes))
                .ok_or(LedgerError::SubjectNotFound);
        }

        match self.cards.get_mut(subject) {
            Some(mut card) => {
                Self::apply_deltas(&mut *card, up, down);
                Ok(VoteTally::new(card.upvotes, card.downvotes))
            }
            None => {
                // Card vanished between the vote write and the counter
                // update: undo the vote row so none is left dangling.
                match prev {
                    Some(p) => {
                        self.votes.insert(vote_key, p);
                    }
                    None => {
                        self.votes.remove(&vote_key);
                    }
                }
                Err(LedgerError::SubjectNotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn card(id: &str) -> Card {
        Card {
            id: id.to_string(),
            owner: "owner-wallet".to_string(),
            prompt: "much meme".to_string(),
            upvotes: 0,
            downvotes: 0,
            image_key: format!("cards/{id}.png"),
            created_at: Utc::now(),
        }
    }

    async fn ledger_with(subject: &str) -> MemoryVotes {
        let ledger = MemoryVotes::new();
        ledger.create_card(card(subject)).await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn first_vote_counts_once() {
        let ledger = ledger_with("CC_ABC").await;

        let tally = ledger
            .cast_vote("CC_ABC", "voter-1", VoteValue::Up)
            .await
            .unwrap();
        assert_eq!(tally, VoteTally::new(1, 0));
        assert_eq!(tally.score, 1);
    }

    #[tokio::test]
    async fn repeating_the_same_vote_is_a_noop() {
        let ledger = ledger_with("CC_ABC").await;

        ledger
            .cast_vote("CC_ABC", "voter-1", VoteValue::Up)
            .await
            .unwrap();
        let tally = ledger
            .cast_vote("CC_ABC", "voter-1", VoteValue::Up)
            .await
            .unwrap();
        assert_eq!(tally, VoteTally::new(1, 0));
    }

    #[tokio::test]
    async fn flipping_a_vote_moves_one_count_each_way() {
        let ledger = ledger_with("CC_ABC").await;

        let first = ledger
            .cast_vote("CC_ABC", "voter-1", VoteValue::Up)
            .await
            .unwrap();
        let flipped = ledger
            .cast_vote("CC_ABC", "voter-1", VoteValue::Down)
            .await
            .unwrap();

        assert_eq!(flipped.upvotes, first.upvotes - 1);
        assert_eq!(flipped.downvotes, first.downvotes + 1);
        // Net score moves by exactly 2
        assert_eq!(first.score - flipped.score, 2);
    }

    #[tokio::test]
    async fn unknown_subject_is_rejected_without_a_vote_row() {
        let ledger = MemoryVotes::new();

        let result = ledger.cast_vote("CC_NOPE", "voter-1", VoteValue::Up).await;
        assert!(matches!(result, Err(LedgerError::SubjectNotFound)));
        assert_eq!(ledger.votes.len(), 0);
    }

    #[tokio::test]
    async fn counters_always_match_a_recount() {
        let ledger = ledger_with("CC_ABC").await;

        // A fixed sequence of casts and re-casts from several voters
        let ops: &[(&str, VoteValue)] = &[
            ("alice", VoteValue::Up),
            ("bob", VoteValue::Down),
            ("carol", VoteValue::Up),
            ("alice", VoteValue::Down),
            ("bob", VoteValue::Down),
            ("dave", VoteValue::Up),
            ("carol", VoteValue::Down),
            ("alice", VoteValue::Up),
            ("erin", VoteValue::Down),
        ];
        for (voter, value) in ops {
            ledger.cast_vote("CC_ABC", voter, *value).await.unwrap();
        }

        let card = ledger.get_card("CC_ABC").await.unwrap().unwrap();
        assert_eq!((card.upvotes, card.downvotes), ledger.recount("CC_ABC"));
        assert_eq!((card.upvotes, card.downvotes), (2, 3));
    }

    #[tokio::test]
    async fn racing_flips_from_one_voter_leave_a_single_vote() {
        let ledger = Arc::new(ledger_with("CC_ABC").await);

        let mut handles = Vec::new();
        for i in 0..30 {
            let ledger = Arc::clone(&ledger);
            let value = if i % 2 == 0 {
                VoteValue::Up
            } else {
                VoteValue::Down
            };
            handles.push(tokio::spawn(async move {
                ledger.cast_vote("CC_ABC", "flipper", value).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let card = ledger.get_card("CC_ABC").await.unwrap().unwrap();
        // One live vote row, so the counters must sum to one
        assert_eq!(card.upvotes + card.downvotes, 1);
        assert_eq!((card.upvotes, card.downvotes), ledger.recount("CC_ABC"));
    }

    #[tokio::test]
    async fn votes_on_different_cards_do_not_interfere() {
        let ledger = ledger_with("CC_ONE").await;
        ledger.create_card(card("CC_TWO")).await.unwrap();

        ledger
            .cast_vote("CC_ONE", "voter-1", VoteValue::Up)
            .await
            .unwrap();
        let tally = ledger
            .cast_vote("CC_TWO", "voter-1", VoteValue::Down)
            .await
            .unwrap();

        assert_eq!(tally, VoteTally::new(0, 1));
        let one = ledger.get_card("CC_ONE").await.unwrap().unwrap();
        assert_eq!((one.upvotes, one.downvotes), (1, 0));
    }
}
