use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    db::Vote,
    mongodb::{hex_id, Id},
};

/// A voter's choice, as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    #[serde(with = "hex_id")]
    pub candidate_id: Id,
}

/// An admitted vote, as shown back to the voter who cast it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteDesc {
    #[serde(with = "hex_id")]
    pub id: Id,
    #[serde(with = "hex_id")]
    pub election_id: Id,
    #[serde(with = "hex_id")]
    pub candidate_id: Id,
    pub cast_at: DateTime<Utc>,
}

impl From<Vote> for VoteDesc {
    fn from(vote: Vote) -> Self {
        Self {
            id: vote.id,
            election_id: vote.election_id,
            candidate_id: vote.candidate_id,
            cast_at: vote.cast_at,
        }
    }
}
