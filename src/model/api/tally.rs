use serde::{Deserialize, Serialize};

use crate::integrity::tally::{CandidateTally, TallySnapshot};
use crate::model::mongodb::{hex_id, Id};

/// API-friendly representation of one candidate's tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTallyDesc {
    #[serde(with = "hex_id")]
    pub candidate_id: Id,
    pub candidate_name: String,
    pub vote_count: u64,
}

impl From<CandidateTally> for CandidateTallyDesc {
    fn from(tally: CandidateTally) -> Self {
        Self {
            candidate_id: tally.candidate_id,
            candidate_name: tally.candidate_name,
            vote_count: tally.vote_count,
        }
    }
}

/// API-friendly representation of a tally snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyDesc {
    #[serde(with = "hex_id")]
    pub election_id: Id,
    pub per_candidate: Vec<CandidateTallyDesc>,
    pub total_votes: u64,
    /// Provisional results are still subject to change.
    pub finalized: bool,
}

impl From<TallySnapshot> for TallyDesc {
    fn from(snapshot: TallySnapshot) -> Self {
        Self {
            election_id: snapshot.election_id,
            per_candidate: snapshot.per_candidate.into_iter().map(Into::into).collect(),
            total_votes: snapshot.total_votes,
            finalized: snapshot.finalized,
        }
    }
}
