//! MongoDB vote ledger
//!
//! Vote rows live in a `votes` collection keyed by `{subject}:{voter}`, so
//! the collection's unique `_id` is the per-pair constraint. The previous
//! vote is observed atomically with the new write via a single
//! `find_one_and_update` upsert returning the pre-image; two concurrent
//! casts from the same voter serialize at the server instead of both
//! reading a stale previous value. Card counters are `$inc`-maintained,
//! never recounted.

use bson::{doc, DateTime};
use futures_util::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{vote_deltas, Card, LedgerError, VoteStore, VoteTally, VoteValue};
use crate::store::MongoClient;

#[derive(Debug, Serialize, Deserialize)]
struct VoteDoc {
    /// `{subject}:{voter}` - the unique (card, voter) constraint
    #[serde(rename = "_id")]
    id: String,
    subject: String,
    voter: String,
    value: i32,
    created_at: DateTime,
    updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct CardDoc {
    #[serde(rename = "_id")]
    id: String,
    owner: String,
    prompt: String,
    upvotes: i64,
    downvotes: i64,
    image_key: String,
    created_at: DateTime,
}

impl From<Card> for CardDoc {
    fn from(card: Card) -> Self {
        Self {
            id: card.id,
            owner: card.owner,
            prompt: card.prompt,
            upvotes: card.upvotes as i64,
            downvotes: card.downvotes as i64,
            image_key: card.image_key,
            created_at: DateTime::from_chrono(card.created_at),
        }
    }
}

impl From<CardDoc> for Card {
    fn from(doc: CardDoc) -> Self {
        Self {
            id: doc.id,
            owner: doc.owner,
            prompt: doc.prompt,
            upvotes: doc.upvotes.max(0) as u64,
            downvotes: doc.downvotes.max(0) as u64,
            image_key: doc.image_key,
            created_at: doc.created_at.to_chrono(),
        }
    }
}

/// MongoDB-backed [`VoteStore`] implementation
#[derive(Clone)]
pub struct MongoVotes {
    cards: Collection<CardDoc>,
    votes: Collection<VoteDoc>,
}

fn storage(err: mongodb::error::Error) -> LedgerError {
    LedgerError::Storage(err.to_string())
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}

impl MongoVotes {
    /// Open the collections and ensure their indexes exist
    pub async fn new(client: &MongoClient) -> Result<Self, LedgerError> {
        let database = client.database();
        let cards = database.collection::<CardDoc>("cards");
        let votes = database.collection::<VoteDoc>("votes");

        // Per-subject lookups for audits; uniqueness is already the _id's job
        votes
            .create_index(IndexModel::builder().keys(doc! { "subject": 1 }).build())
            .await
            .map_err(storage)?;
        cards
            .create_index(IndexModel::builder().keys(doc! { "created_at": -1 }).build())
            .await
            .map_err(storage)?;

        Ok(Self { cards, votes })
    }

    fn vote_id(subject: &str, voter: &str) -> String {
        format!("{}:{}", subject, voter)
    }

    /// Upsert the vote row and return the previous value, atomically per
    /// (subject, voter).
    async fn upsert_vote(
        &self,
        subject: &str,
        voter: &str,
        value: VoteValue,
    ) -> Result<Option<VoteValue>, LedgerError> {
        let now = DateTime::now();
        let update = doc! {
            "$set": { "value": value.as_i32(), "updated_at": now },
            "$setOnInsert": {
                "subject": subject,
                "voter": voter,
                "created_at": now,
            },
        };

        // Racing upserts on the same missing _id can surface E11000 on one
        // side; the retry resolves against the now-existing row.
        for _ in 0..2 {
            match self
                .votes
                .find_one_and_update(doc! { "_id": Self::vote_id(subject, voter) }, update.clone())
                .upsert(true)
                .return_document(ReturnDocument::Before)
                .await
            {
                Ok(Some(prev)) => {
                    let prev = VoteValue::try_from(prev.value).map_err(|_| {
                        LedgerError::Storage(format!("corrupt vote value {}", prev.value))
                    })?;
                    return Ok(Some(prev));
                }
                Ok(None) => return Ok(None),
                Err(e) if is_duplicate_key(&e) => continue,
                Err(e) => return Err(storage(e)),
            }
        }
        Err(LedgerError::Storage(
            "vote upsert kept colliding".to_string(),
        ))
    }

    /// Undo a vote write after the card turned out to be gone
    async fn rollback_vote(
        &self,
        subject: &str,
        voter: &str,
        prev: Option<VoteValue>,
    ) -> Result<(), LedgerError> {
        let id = Self::vote_id(subject, voter);
        match prev {
            Some(p) => {
                self.votes
                    .update_one(
                        doc! { "_id": &id },
                        doc! { "$set": { "value": p.as_i32(), "updated_at": DateTime::now() } },
                    )
                    .await
                    .map_err(storage)?;
            }
            None => {
                self.votes
                    .delete_one(doc! { "_id": &id })
                    .await
                    .map_err(storage)?;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl VoteStore for MongoVotes {
    async fn create_card(&self, card: Card) -> Result<(), LedgerError> {
        self.cards
            .insert_one(CardDoc::from(card))
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn get_card(&self, id: &str) -> Result<Option<Card>, LedgerError> {
        let found = self
            .cards
            .find_one(doc! { "_id": id })
            .await
            .map_err(storage)?;
        Ok(found.map(Card::from))
    }

    async fn list_cards(&self) -> Result<Vec<Card>, LedgerError> {
        let cursor = self
            .cards
            .find(doc! {})
            .sort(doc! { "created_at": -1 })
            .await
            .map_err(storage)?;
        let docs: Vec<CardDoc> = cursor.try_collect().await.map_err(storage)?;
        Ok(docs.into_iter().map(Card::from).collect())
    }

    async fn cast_vote(
        &self,
        subject: &str,
        voter: &str,
        value: VoteValue,
    ) -> Result<VoteTally, LedgerError> {
        // Pre-validate the subject so no vote row is written for a card
        // that never existed.
        if self
            .cards
            .find_one(doc! { "_id": subject })
            .await
            .map_err(storage)?
            .is_none()
        {
            return Err(LedgerError::SubjectNotFound);
        }

        let prev = self.upsert_vote(subject, voter, value).await?;
        let (up, down) = vote_deltas(prev, value);

        if up == 0 && down == 0 {
            // Unchanged re-vote: return the counters as they stand
            let card = self
                .cards
                .find_one(doc! { "_id": subject })
                .await
                .map_err(storage)?
                .ok_or(LedgerError::SubjectNotFound)?;
            let card = Card::from(card);
            return Ok(VoteTally::new(card.upvotes, card.downvotes));
        }

        let updated = self
            .cards
            .find_one_and_update(
                doc! { "_id": subject },
                doc! { "$inc": { "upvotes": up, "downvotes": down } },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(storage)?;

        match updated {
            Some(card) => {
                let card = Card::from(card);
                Ok(VoteTally::new(card.upvotes, card.downvotes))
            }
            None => {
                // Card deleted between the vote write and the increment
                warn!(subject, voter, "card vanished mid-vote, rolling back");
                self.rollback_vote(subject, voter, prev).await?;
                Err(LedgerError::SubjectNotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running MongoDB instance; the
    // ledger contract is covered against the in-memory backend.
}
