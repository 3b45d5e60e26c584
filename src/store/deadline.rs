use std::future::Future;
use std::time::Duration;

use rocket::tokio::time::timeout;

use crate::model::{
    common::{election::ElectionState, identity::SubjectId},
    db::{Candidate, Election, ElectionDetails, Vote},
    mongodb::Id,
};

use super::{ElectionStore, StoreError, StoreResult, TallyRead};

/// Wraps a store so that every call must finish within a fixed deadline.
/// A call that overruns is abandoned and reported as
/// [`StoreError::Unavailable`].
pub struct Deadline<S> {
    inner: S,
    limit: Duration,
}

impl<S> Deadline<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn run<T>(&self, call: &str, fut: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        match timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Store call `{call}` exceeded its {:?} deadline", self.limit);
                Err(StoreError::Unavailable(format!(
                    "`{call}` timed out after {:?}",
                    self.limit
                )))
            }
        }
    }
}

#[rocket::async_trait]
impl<S: ElectionStore> ElectionStore for Deadline<S> {
    async fn election(&self, id: Id) -> StoreResult<Option<Election>> {
        self.run("election", self.inner.election(id)).await
    }

    async fn elections_by_owner(&self, owner: &SubjectId) -> StoreResult<Vec<Election>> {
        self.run("elections_by_owner", self.inner.elections_by_owner(owner))
            .await
    }

    async fn elections_in_state(&self, state: ElectionState) -> StoreResult<Vec<Election>> {
        self.run("elections_in_state", self.inner.elections_in_state(state))
            .await
    }

    async fn insert_election(
        &self,
        election: &Election,
        candidates: &[Candidate],
    ) -> StoreResult<()> {
        self.run(
            "insert_election",
            self.inner.insert_election(election, candidates),
        )
        .await
    }

    async fn update_election_details(
        &self,
        id: Id,
        owner: &SubjectId,
        details: &ElectionDetails,
    ) -> StoreResult<bool> {
        self.run(
            "update_election_details",
            self.inner.update_election_details(id, owner, details),
        )
        .await
    }

    async fn set_state(
        &self,
        id: Id,
        owner: &SubjectId,
        from: ElectionState,
        to: ElectionState,
        min_candidates: usize,
    ) -> StoreResult<bool> {
        self.run(
            "set_state",
            self.inner.set_state(id, owner, from, to, min_candidates),
        )
        .await
    }

    async fn delete_election(&self, id: Id, owner: &SubjectId) -> StoreResult<bool> {
        self.run("delete_election", self.inner.delete_election(id, owner))
            .await
    }

    async fn candidate(&self, id: Id) -> StoreResult<Option<Candidate>> {
        self.run("candidate", self.inner.candidate(id)).await
    }

    async fn candidates(&self, election_id: Id) -> StoreResult<Vec<Candidate>> {
        self.run("candidates", self.inner.candidates(election_id))
            .await
    }

    async fn insert_candidate(
        &self,
        owner: &SubjectId,
        candidate: &Candidate,
    ) -> StoreResult<bool> {
        self.run(
            "insert_candidate",
            self.inner.insert_candidate(owner, candidate),
        )
        .await
    }

    async fn update_candidate(
        &self,
        owner: &SubjectId,
        candidate: &Candidate,
    ) -> StoreResult<bool> {
        self.run(
            "update_candidate",
            self.inner.update_candidate(owner, candidate),
        )
        .await
    }

    async fn delete_candidate(
        &self,
        owner: &SubjectId,
        election_id: Id,
        candidate_id: Id,
    ) -> StoreResult<bool> {
        self.run(
            "delete_candidate",
            self.inner.delete_candidate(owner, election_id, candidate_id),
        )
        .await
    }

    async fn vote_for(&self, election_id: Id, voter: &SubjectId) -> StoreResult<Option<Vote>> {
        self.run("vote_for", self.inner.vote_for(election_id, voter))
            .await
    }

    async fn votes_by_voter(&self, voter: &SubjectId) -> StoreResult<Vec<Vote>> {
        self.run("votes_by_voter", self.inner.votes_by_voter(voter))
            .await
    }

    async fn insert_vote(&self, vote: &Vote) -> StoreResult<()> {
        self.run("insert_vote", self.inner.insert_vote(vote)).await
    }

    async fn tally_snapshot(&self, election_id: Id) -> StoreResult<TallyRead> {
        self.run("tally_snapshot", self.inner.tally_snapshot(election_id))
            .await
    }
}
