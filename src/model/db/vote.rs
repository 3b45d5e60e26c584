use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::identity::SubjectId, mongodb::Id};

/// A single admitted vote. Written once by ballot admission and never
/// mutated; at most one exists per `(election_id, voter_id)`.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    /// Foreign key election ID.
    pub election_id: Id,
    /// Foreign key candidate ID, belonging to the same election.
    pub candidate_id: Id,
    pub voter_id: SubjectId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(
        election_id: Id,
        candidate_id: Id,
        voter_id: SubjectId,
        cast_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Id::new(),
            election_id,
            candidate_id,
            voter_id,
            cast_at,
        }
    }
}
