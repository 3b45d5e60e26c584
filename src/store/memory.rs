use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rocket::tokio::{self, sync::RwLock};

use crate::model::{
    common::{election::ElectionState, identity::SubjectId},
    db::{Candidate, Election, ElectionDetails, Vote},
    mongodb::Id,
};

use super::{ElectionStore, StoreError, StoreResult, TallyRead};

#[derive(Default)]
struct Tables {
    elections: HashMap<Id, Election>,
    /// Kept in insertion order.
    candidates: Vec<Candidate>,
    votes: Vec<Vote>,
    /// The `(election_id, voter_id)` uniqueness constraint.
    ballots_cast: HashSet<(Id, SubjectId)>,
}

impl Tables {
    fn is_owned_draft(&self, election_id: Id, owner: &SubjectId) -> bool {
        matches!(
            self.elections.get(&election_id),
            Some(election) if &election.owner_id == owner && election.state == ElectionState::Draft
        )
    }
}

#[derive(Default)]
struct Faults {
    outage: AtomicBool,
    latency: std::sync::Mutex<Option<Duration>>,
    stale_vote_reads: AtomicBool,
}

/// An in-process store for tests and local development.
///
/// Each operation takes the table lock exactly once, which gives every write
/// the same atomicity a database provides for single-record operations, and
/// every read a consistent snapshot. Cloning yields another handle on the
/// same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`]
    /// until cleared.
    pub fn set_outage(&self, outage: bool) {
        self.faults.outage.store(outage, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self
            .faults
            .latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = latency;
    }

    /// Make [`ElectionStore::vote_for`] miss every vote, as a read that
    /// races a concurrent insert would.
    pub fn set_stale_vote_reads(&self, stale: bool) {
        self.faults.stale_vote_reads.store(stale, Ordering::SeqCst);
    }

    /// Total number of stored votes across all elections.
    pub async fn vote_count(&self) -> usize {
        self.tables.read().await.votes.len()
    }

    /// Simulated I/O: the only suspension point besides the table lock.
    async fn io(&self) -> StoreResult<()> {
        let latency = *self
            .faults
            .latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.faults.outage.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("Simulated outage".to_string()));
        }
        Ok(())
    }
}

#[rocket::async_trait]
impl ElectionStore for MemoryStore {
    async fn election(&self, id: Id) -> StoreResult<Option<Election>> {
        self.io().await?;
        Ok(self.tables.read().await.elections.get(&id).cloned())
    }

    async fn elections_by_owner(&self, owner: &SubjectId) -> StoreResult<Vec<Election>> {
        self.io().await?;
        let tables = self.tables.read().await;
        let mut elections: Vec<_> = tables
            .elections
            .values()
            .filter(|e| &e.owner_id == owner)
            .cloned()
            .collect();
        elections.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(elections)
    }

    async fn elections_in_state(&self, state: ElectionState) -> StoreResult<Vec<Election>> {
        self.io().await?;
        let tables = self.tables.read().await;
        let mut elections: Vec<_> = tables
            .elections
            .values()
            .filter(|e| e.state == state)
            .cloned()
            .collect();
        elections.sort_by(|a, b| {
            a.details
                .closes_at
                .cmp(&b.details.closes_at)
                .then(a.id.cmp(&b.id))
        });
        Ok(elections)
    }

    async fn insert_election(
        &self,
        election: &Election,
        candidates: &[Candidate],
    ) -> StoreResult<()> {
        self.io().await?;
        let mut tables = self.tables.write().await;
        if tables.elections.contains_key(&election.id) {
            return Err(StoreError::Duplicate);
        }
        tables.elections.insert(election.id, election.clone());
        tables.candidates.extend(candidates.iter().cloned());
        Ok(())
    }

    async fn update_election_details(
        &self,
        id: Id,
        owner: &SubjectId,
        details: &ElectionDetails,
    ) -> StoreResult<bool> {
        self.io().await?;
        let mut tables = self.tables.write().await;
        match tables.elections.get_mut(&id) {
            Some(election) if &election.owner_id == owner && election.state == ElectionState::Draft => {
                election.details = details.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_state(
        &self,
        id: Id,
        owner: &SubjectId,
        from: ElectionState,
        to: ElectionState,
        min_candidates: usize,
    ) -> StoreResult<bool> {
        self.io().await?;
        let mut tables = self.tables.write().await;
        let candidates = tables
            .candidates
            .iter()
            .filter(|c| c.election_id == id)
            .count();
        match tables.elections.get_mut(&id) {
            Some(election)
                if &election.owner_id == owner
                    && election.state == from
                    && candidates >= min_candidates =>
            {
                election.state = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_election(&self, id: Id, owner: &SubjectId) -> StoreResult<bool> {
        self.io().await?;
        let mut tables = self.tables.write().await;
        match tables.elections.get(&id) {
            Some(election) if &election.owner_id == owner => {}
            _ => return Ok(false),
        }
        tables.elections.remove(&id);
        tables.candidates.retain(|c| c.election_id != id);
        tables.votes.retain(|v| v.election_id != id);
        tables.ballots_cast.retain(|(election_id, _)| *election_id != id);
        Ok(true)
    }

    async fn candidate(&self, id: Id) -> StoreResult<Option<Candidate>> {
        self.io().await?;
        let tables = self.tables.read().await;
        Ok(tables.candidates.iter().find(|c| c.id == id).cloned())
    }

    async fn candidates(&self, election_id: Id) -> StoreResult<Vec<Candidate>> {
        self.io().await?;
        let tables = self.tables.read().await;
        Ok(candidates_of(&tables, election_id))
    }

    async fn insert_candidate(
        &self,
        owner: &SubjectId,
        candidate: &Candidate,
    ) -> StoreResult<bool> {
        self.io().await?;
        let mut tables = self.tables.write().await;
        if !tables.is_owned_draft(candidate.election_id, owner) {
            return Ok(false);
        }
        if tables.candidates.iter().any(|c| c.id == candidate.id) {
            return Err(StoreError::Duplicate);
        }
        tables.candidates.push(candidate.clone());
        Ok(true)
    }

    async fn update_candidate(
        &self,
        owner: &SubjectId,
        candidate: &Candidate,
    ) -> StoreResult<bool> {
        self.io().await?;
        let mut tables = self.tables.write().await;
        if !tables.is_owned_draft(candidate.election_id, owner) {
            return Ok(false);
        }
        let existing = tables
            .candidates
            .iter_mut()
            .find(|c| c.id == candidate.id && c.election_id == candidate.election_id);
        match existing {
            Some(existing) => {
                existing.name = candidate.name.clone();
                existing.description = candidate.description.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_candidate(
        &self,
        owner: &SubjectId,
        election_id: Id,
        candidate_id: Id,
    ) -> StoreResult<bool> {
        self.io().await?;
        let mut tables = self.tables.write().await;
        if !tables.is_owned_draft(election_id, owner) {
            return Ok(false);
        }
        let before = tables.candidates.len();
        tables
            .candidates
            .retain(|c| !(c.id == candidate_id && c.election_id == election_id));
        Ok(tables.candidates.len() != before)
    }

    async fn vote_for(&self, election_id: Id, voter: &SubjectId) -> StoreResult<Option<Vote>> {
        self.io().await?;
        if self.faults.stale_vote_reads.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let tables = self.tables.read().await;
        Ok(tables
            .votes
            .iter()
            .find(|v| v.election_id == election_id && &v.voter_id == voter)
            .cloned())
    }

    async fn votes_by_voter(&self, voter: &SubjectId) -> StoreResult<Vec<Vote>> {
        self.io().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .votes
            .iter()
            .rev()
            .filter(|v| &v.voter_id == voter)
            .cloned()
            .collect())
    }

    async fn insert_vote(&self, vote: &Vote) -> StoreResult<()> {
        self.io().await?;
        let mut tables = self.tables.write().await;
        // Check and insert under one lock acquisition.
        if !tables
            .ballots_cast
            .insert((vote.election_id, vote.voter_id.clone()))
        {
            return Err(StoreError::Duplicate);
        }
        tables.votes.push(vote.clone());
        Ok(())
    }

    async fn tally_snapshot(&self, election_id: Id) -> StoreResult<TallyRead> {
        self.io().await?;
        let tables = self.tables.read().await;
        let candidates = candidates_of(&tables, election_id);
        let mut counts = HashMap::new();
        for vote in tables.votes.iter().filter(|v| v.election_id == election_id) {
            *counts.entry(vote.candidate_id).or_insert(0) += 1;
        }
        Ok(TallyRead { candidates, counts })
    }
}

fn candidates_of(tables: &Tables, election_id: Id) -> Vec<Candidate> {
    let mut candidates: Vec<_> = tables
        .candidates
        .iter()
        .filter(|c| c.election_id == election_id)
        .cloned()
        .collect();
    // Stable sort keeps insertion order among equal positions.
    candidates.sort_by_key(|c| c.position);
    candidates
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn vote(election_id: Id, voter: &str) -> Vote {
        Vote::new(election_id, Id::new(), SubjectId::new(voter), Utc::now())
    }

    #[backend_test]
    async fn second_insert_for_same_voter_is_a_duplicate(store: MemoryStore) {
        let election_id = Id::new();
        store.insert_vote(&vote(election_id, "alice")).await.unwrap();
        let second = store.insert_vote(&vote(election_id, "alice")).await;
        assert_eq!(second, Err(StoreError::Duplicate));
        assert_eq!(store.vote_count().await, 1);

        // Other elections and other voters are unaffected.
        store.insert_vote(&vote(Id::new(), "alice")).await.unwrap();
        store.insert_vote(&vote(election_id, "bob")).await.unwrap();
        assert_eq!(store.vote_count().await, 3);
    }

    #[backend_test]
    async fn concurrent_inserts_admit_exactly_one(store: MemoryStore) {
        const ATTEMPTS: usize = 32;
        let election_id = Id::new();

        let tasks: Vec<_> = (0..ATTEMPTS)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.insert_vote(&vote(election_id, "carol")).await })
            })
            .collect();
        let mut admitted = 0;
        let mut duplicates = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => admitted += 1,
                Err(StoreError::Duplicate) => duplicates += 1,
                Err(e) => panic!("unexpected store error: {e}"),
            }
        }

        assert_eq!(admitted, 1);
        assert_eq!(duplicates, ATTEMPTS - 1);
        assert_eq!(store.vote_count().await, 1);
    }

    #[backend_test]
    async fn state_change_requires_owner_and_expected_state(store: MemoryStore) {
        let election = Election::example("owner", ElectionState::Draft);
        store.insert_election(&election, &[]).await.unwrap();
        let owner = election.owner_id.clone();
        let stranger = SubjectId::new("stranger");

        let changed = store
            .set_state(election.id, &stranger, ElectionState::Draft, ElectionState::Open, 0)
            .await
            .unwrap();
        assert!(!changed);
        let changed = store
            .set_state(election.id, &owner, ElectionState::Open, ElectionState::Closed, 0)
            .await
            .unwrap();
        assert!(!changed);
        let changed = store
            .set_state(election.id, &owner, ElectionState::Draft, ElectionState::Open, 0)
            .await
            .unwrap();
        assert!(changed);

        let stored = store.election(election.id).await.unwrap().unwrap();
        assert_eq!(stored.state, ElectionState::Open);
    }

    #[backend_test]
    async fn delete_election_cascades(store: MemoryStore) {
        let election = Election::example("owner", ElectionState::Open);
        let candidate = Candidate::example(election.id, "Ada", 0);
        store
            .insert_election(&election, &[candidate.clone()])
            .await
            .unwrap();
        let cast = Vote::new(election.id, candidate.id, SubjectId::new("v"), Utc::now());
        store.insert_vote(&cast).await.unwrap();

        assert!(!store
            .delete_election(election.id, &SubjectId::new("stranger"))
            .await
            .unwrap());
        assert!(store
            .delete_election(election.id, &election.owner_id)
            .await
            .unwrap());

        assert!(store.election(election.id).await.unwrap().is_none());
        assert!(store.candidates(election.id).await.unwrap().is_empty());
        assert_eq!(store.vote_count().await, 0);
        // The voter's slot is free again along with the election.
        assert!(store
            .vote_for(election.id, &SubjectId::new("v"))
            .await
            .unwrap()
            .is_none());
    }

    #[backend_test]
    async fn outage_is_reported_as_unavailable(store: MemoryStore) {
        store.set_outage(true);
        let result = store.election(Id::new()).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        store.set_outage(false);
        assert_eq!(store.election(Id::new()).await, Ok(None));
    }

    #[backend_test]
    async fn opening_rechecks_candidate_count(store: MemoryStore) {
        let election = Election::example("owner", ElectionState::Draft);
        let candidate = Candidate::example(election.id, "Ada", 0);
        store.insert_election(&election, &[candidate]).await.unwrap();
        let owner = election.owner_id.clone();

        let opened = store
            .set_state(election.id, &owner, ElectionState::Draft, ElectionState::Open, 2)
            .await
            .unwrap();
        assert!(!opened);

        let second = Candidate::example(election.id, "Grace", 1);
        assert!(store.insert_candidate(&owner, &second).await.unwrap());
        let opened = store
            .set_state(election.id, &owner, ElectionState::Draft, ElectionState::Open, 2)
            .await
            .unwrap();
        assert!(opened);
    }

    #[backend_test]
    async fn ballot_writes_need_an_owned_draft(store: MemoryStore) {
        let election = Election::example("owner", ElectionState::Open);
        let candidate = Candidate::example(election.id, "Ada", 0);
        store
            .insert_election(&election, &[candidate.clone()])
            .await
            .unwrap();
        let owner = election.owner_id.clone();

        let late = Candidate::example(election.id, "Latecomer", 1);
        assert!(!store.insert_candidate(&owner, &late).await.unwrap());
        assert!(!store.update_candidate(&owner, &candidate).await.unwrap());
        assert!(!store
            .delete_candidate(&owner, election.id, candidate.id)
            .await
            .unwrap());
        assert_eq!(store.candidates(election.id).await.unwrap(), vec![candidate.clone()]);

        let draft = Election::example("owner", ElectionState::Draft);
        let ballot = Candidate::example(draft.id, "Ada", 0);
        store.insert_election(&draft, &[ballot.clone()]).await.unwrap();
        let stranger = SubjectId::new("stranger");
        assert!(!store
            .delete_candidate(&stranger, draft.id, ballot.id)
            .await
            .unwrap());
        assert!(store
            .delete_candidate(&owner, draft.id, ballot.id)
            .await
            .unwrap());
    }

    #[backend_test]
    async fn stale_vote_reads_miss_existing_votes(store: MemoryStore) {
        let election_id = Id::new();
        store.insert_vote(&vote(election_id, "dave")).await.unwrap();
        store.set_stale_vote_reads(true);
        let voter = SubjectId::new("dave");
        assert_eq!(store.vote_for(election_id, &voter).await, Ok(None));
        // The constraint still holds.
        let again = store.insert_vote(&vote(election_id, "dave")).await;
        assert_eq!(again, Err(StoreError::Duplicate));
    }
}
