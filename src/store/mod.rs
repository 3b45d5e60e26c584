//! The election store: the only shared mutable resource in the system.
//!
//! Every call is async, fallible and potentially slow. Implementations must
//! provide atomic single-record writes and, crucially, reject a second vote
//! for the same `(election_id, voter_id)` with [`StoreError::Duplicate`].

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::model::{
    common::{election::ElectionState, identity::SubjectId},
    db::{Candidate, Election, ElectionDetails, Vote},
    mongodb::Id,
};

mod deadline;
mod memory;
mod mongo;

pub use deadline::Deadline;
pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The shared store handle placed into managed state.
pub type Store = Arc<dyn ElectionStore>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Uniqueness constraint violated")]
    Duplicate,
    /// Timeout, connection failure, or any other unrecognised failure.
    #[error("{0}")]
    Unavailable(String),
}

/// Candidates and per-candidate vote counts taken from one logical read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TallyRead {
    /// Candidates in insertion order.
    pub candidates: Vec<Candidate>,
    /// Vote count by candidate ID. Contains an entry for every candidate ID
    /// referenced by any vote of the election, listed candidate or not.
    pub counts: HashMap<Id, u64>,
}

#[rocket::async_trait]
pub trait ElectionStore: Send + Sync {
    /// Point lookup of an election.
    async fn election(&self, id: Id) -> StoreResult<Option<Election>>;

    /// All elections created by `owner`, newest first.
    async fn elections_by_owner(&self, owner: &SubjectId) -> StoreResult<Vec<Election>>;

    /// All elections in the given lifecycle state, soonest closing first.
    async fn elections_in_state(&self, state: ElectionState) -> StoreResult<Vec<Election>>;

    /// Insert an election together with its initial candidates, atomically.
    async fn insert_election(&self, election: &Election, candidates: &[Candidate])
        -> StoreResult<()>;

    /// Replace the editable details of a draft election owned by `owner`.
    /// Returns false if no such draft exists.
    async fn update_election_details(
        &self,
        id: Id,
        owner: &SubjectId,
        details: &ElectionDetails,
    ) -> StoreResult<bool>;

    /// Move an election owned by `owner` from `from` to `to`, only if it is
    /// still in `from` and has at least `min_candidates` candidates. Both
    /// conditions are checked atomically with the write. Returns false if
    /// either does not hold.
    async fn set_state(
        &self,
        id: Id,
        owner: &SubjectId,
        from: ElectionState,
        to: ElectionState,
        min_candidates: usize,
    ) -> StoreResult<bool>;

    /// Delete an election owned by `owner` along with all its candidates and
    /// votes. Returns false if nothing matched.
    async fn delete_election(&self, id: Id, owner: &SubjectId) -> StoreResult<bool>;

    /// Point lookup of a candidate.
    async fn candidate(&self, id: Id) -> StoreResult<Option<Candidate>>;

    /// Candidates of an election in insertion order.
    async fn candidates(&self, election_id: Id) -> StoreResult<Vec<Candidate>>;

    // Ballot writes apply only while the candidate's election is a draft
    // owned by `owner`, checked atomically with the write, and conflict with
    // a concurrent `set_state` on that election.

    /// Returns false if the election is not an owned draft.
    async fn insert_candidate(&self, owner: &SubjectId, candidate: &Candidate)
        -> StoreResult<bool>;

    /// Replace a candidate's name and description. Returns false if the
    /// election is not an owned draft or the candidate is not in it.
    async fn update_candidate(&self, owner: &SubjectId, candidate: &Candidate)
        -> StoreResult<bool>;

    /// Returns false if the election is not an owned draft or the candidate
    /// is not in it.
    async fn delete_candidate(
        &self,
        owner: &SubjectId,
        election_id: Id,
        candidate_id: Id,
    ) -> StoreResult<bool>;

    /// The vote cast by `voter` in the given election, if any.
    async fn vote_for(&self, election_id: Id, voter: &SubjectId) -> StoreResult<Option<Vote>>;

    /// Every vote cast by `voter`, newest first.
    async fn votes_by_voter(&self, voter: &SubjectId) -> StoreResult<Vec<Vote>>;

    /// Insert a vote, guarded by the `(election_id, voter_id)` uniqueness
    /// constraint. A conflict yields [`StoreError::Duplicate`] and leaves the
    /// store unchanged.
    async fn insert_vote(&self, vote: &Vote) -> StoreResult<()>;

    /// Candidates and grouped vote counts for one election, read from a
    /// single consistent snapshot.
    async fn tally_snapshot(&self, election_id: Id) -> StoreResult<TallyRead>;
}
