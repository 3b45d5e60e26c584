use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// A candidate standing in a single election.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    /// Foreign key election ID.
    pub election_id: Id,
    /// Display name, never empty.
    pub name: String,
    pub description: Option<String>,
    /// Insertion order within the election; ties in a tally are broken on this.
    pub position: u32,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(
        election_id: Id,
        name: String,
        description: Option<String>,
        position: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Id::new(),
            election_id,
            name,
            description,
            position,
            created_at,
        }
    }
}
