use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::integrity::lifecycle::{
    is_accepting_votes, is_finalized, validate_window, MIN_CANDIDATES,
};
use crate::model::{
    common::{election::ElectionState, identity::SubjectId},
    db::{Candidate, Election, ElectionDetails},
    mongodb::{hex_id, Id},
};

use super::vote::VoteDesc;

/// Editable election fields, as submitted by a committee member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionDetailsSpec {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

impl ElectionDetailsSpec {
    /// Validate and normalise into stored details.
    pub fn into_details(self) -> Result<ElectionDetails> {
        let title = non_empty(self.title, "Election title")?;
        validate_window(self.opens_at, self.closes_at)?;
        Ok(ElectionDetails {
            title,
            description: optional_text(self.description),
            opens_at: self.opens_at,
            closes_at: self.closes_at,
        })
    }
}

/// A candidate, as submitted by a committee member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CandidateSpec {
    /// Validate into a candidate of the given election.
    pub fn into_candidate(
        self,
        election_id: Id,
        position: u32,
        now: DateTime<Utc>,
    ) -> Result<Candidate> {
        let name = non_empty(self.name, "Candidate name")?;
        Ok(Candidate::new(
            election_id,
            name,
            optional_text(self.description),
            position,
            now,
        ))
    }
}

/// A complete new election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    #[serde(flatten)]
    pub details: ElectionDetailsSpec,
    pub candidates: Vec<CandidateSpec>,
}

impl ElectionSpec {
    /// Validate this spec and turn it into a draft election owned by
    /// `owner`, plus its candidates in submission order.
    pub fn into_election(
        self,
        owner: SubjectId,
        now: DateTime<Utc>,
    ) -> Result<(Election, Vec<Candidate>)> {
        if self.candidates.len() < MIN_CANDIDATES {
            return Err(Error::BadRequest(format!(
                "An election needs at least {MIN_CANDIDATES} candidates"
            )));
        }
        let election = Election::new(self.details.into_details()?, owner, now);
        let candidates = self
            .candidates
            .into_iter()
            .zip(0..)
            .map(|(spec, position)| spec.into_candidate(election.id, position, now))
            .collect::<Result<Vec<_>>>()?;
        Ok((election, candidates))
    }
}

fn non_empty(text: String, what: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(Error::BadRequest(format!("{what} must not be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}

fn optional_text(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Summary of an election, without candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    #[serde(with = "hex_id")]
    pub id: Id,
    pub title: String,
    pub description: Option<String>,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub state: ElectionState,
    /// Whether a vote would be admitted right now.
    pub accepting_votes: bool,
    /// Whether the election is over, explicitly or by elapsed time.
    pub finalized: bool,
}

impl ElectionSummary {
    pub fn new(election: Election, now: DateTime<Utc>) -> Self {
        Self {
            accepting_votes: is_accepting_votes(&election, now),
            finalized: is_finalized(&election, now),
            id: election.id,
            title: election.details.title,
            description: election.details.description,
            opens_at: election.details.opens_at,
            closes_at: election.details.closes_at,
            state: election.state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDesc {
    #[serde(with = "hex_id")]
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
}

impl From<Candidate> for CandidateDesc {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.name,
            description: candidate.description,
        }
    }
}

/// Full description of an election: its summary, ballot and, for voters,
/// the caller's own vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    #[serde(flatten)]
    pub summary: ElectionSummary,
    pub candidates: Vec<CandidateDesc>,
    pub own_vote: Option<VoteDesc>,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use chrono::Duration;

    impl ElectionSpec {
        /// An election open for the whole of the surrounding 24 hours.
        pub fn current_example() -> Self {
            let now = Utc::now();
            Self {
                details: ElectionDetailsSpec {
                    title: "Chair of the Debating Society".to_string(),
                    description: Some("Two-year term".to_string()),
                    opens_at: now - Duration::hours(12),
                    closes_at: now + Duration::hours(12),
                },
                candidates: vec![
                    CandidateSpec::example("Chris Riches"),
                    CandidateSpec::example("Parry Hotter"),
                ],
            }
        }
    }

    impl CandidateSpec {
        pub fn example(name: &str) -> Self {
            Self {
                name: name.to_string(),
                description: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    #[test]
    fn spec_becomes_a_draft_with_ordered_candidates() {
        let now = Utc::now();
        let (election, candidates) = ElectionSpec::current_example()
            .into_election(SubjectId::new("owner"), now)
            .unwrap();
        assert_eq!(election.state, ElectionState::Draft);
        assert_eq!(election.owner_id, SubjectId::new("owner"));
        let names: Vec<_> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Chris Riches", "Parry Hotter"]);
        assert!(candidates.iter().all(|c| c.election_id == election.id));
        assert_eq!(candidates[0].position, 0);
        assert_eq!(candidates[1].position, 1);
    }

    #[test]
    fn spec_needs_two_candidates() {
        let mut spec = ElectionSpec::current_example();
        spec.candidates.truncate(1);
        let result = spec.into_election(SubjectId::new("owner"), Utc::now());
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }

    #[test]
    fn blank_title_and_names_are_rejected() {
        let mut spec = ElectionSpec::current_example();
        spec.details.title = "   ".to_string();
        assert!(spec.into_election(SubjectId::new("o"), Utc::now()).is_err());

        let mut spec = ElectionSpec::current_example();
        spec.candidates[1].name = String::new();
        assert!(spec.into_election(SubjectId::new("o"), Utc::now()).is_err());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut spec = ElectionSpec::current_example();
        spec.details.closes_at = spec.details.opens_at - Duration::minutes(1);
        let result = spec.into_election(SubjectId::new("o"), Utc::now());
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }

    #[test]
    fn blank_descriptions_are_dropped() {
        let details = ElectionDetailsSpec {
            description: Some("  ".to_string()),
            ..ElectionSpec::current_example().details
        }
        .into_details()
        .unwrap();
        assert_eq!(details.description, None);
    }
}
