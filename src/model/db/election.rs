use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{election::ElectionState, identity::SubjectId},
    mongodb::Id,
};

/// The owner-editable part of an election.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ElectionDetails {
    /// Election title, never empty.
    pub title: String,
    pub description: Option<String>,
    /// Voting opens at this instant (inclusive).
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub opens_at: DateTime<Utc>,
    /// Voting closes at this instant (exclusive). Always after `opens_at`.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub closes_at: DateTime<Utc>,
}

/// An election, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Election {
    /// Unique ID.
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub details: ElectionDetails,
    /// Lifecycle state.
    pub state: ElectionState,
    /// The committee member who created the election.
    pub owner_id: SubjectId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Election {
    /// Create a new draft election owned by `owner_id`.
    pub fn new(details: ElectionDetails, owner_id: SubjectId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Id::new(),
            details,
            state: ElectionState::Draft,
            owner_id,
            created_at,
        }
    }
}
