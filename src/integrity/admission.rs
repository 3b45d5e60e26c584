use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{
    common::identity::{Identity, Role},
    db::Vote,
    mongodb::Id,
};
use crate::store::{ElectionStore, StoreError};

use super::lifecycle::is_accepting_votes;

/// Cast `voter`'s single vote in an election.
///
/// Fast-fail checks, in order: the election exists, it accepts votes at
/// `now`, the candidate stands in it, and the voter has not voted yet. The
/// last check is only an early exit; the store's uniqueness constraint on
/// `(election_id, voter_id)` is what actually guarantees one vote per voter,
/// and a conflict there is reported as [`Error::AlreadyVoted`] too.
///
/// On success exactly one vote is stored; on any error none is. A
/// [`Error::StoreUnavailable`] may be retried with the same arguments: the
/// retry either succeeds once or observes the earlier success as
/// [`Error::AlreadyVoted`].
pub async fn cast_vote(
    store: &dyn ElectionStore,
    election_id: Id,
    candidate_id: Id,
    voter: &Identity,
    now: DateTime<Utc>,
) -> Result<Vote> {
    if voter.role != Role::Voter {
        return Err(Error::NotAuthorized(format!(
            "{} is a {} and cannot vote",
            voter.subject, voter.role
        )));
    }

    let election = store
        .election(election_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))?;

    if !is_accepting_votes(&election, now) {
        debug!(
            "Rejected vote by {} in election {election_id}: not accepting votes ({}, now {now})",
            voter.subject, election.state
        );
        return Err(Error::ElectionNotOpen(election_id));
    }

    match store.candidate(candidate_id).await? {
        Some(candidate) if candidate.election_id == election_id => {}
        _ => {
            debug!(
                "Rejected vote by {} in election {election_id}: unknown candidate {candidate_id}",
                voter.subject
            );
            return Err(Error::InvalidCandidate {
                election: election_id,
                candidate: candidate_id,
            });
        }
    }

    if store.vote_for(election_id, &voter.subject).await?.is_some() {
        debug!(
            "Rejected vote by {} in election {election_id}: already voted",
            voter.subject
        );
        return Err(Error::AlreadyVoted(election_id));
    }

    let vote = Vote::new(election_id, candidate_id, voter.subject.clone(), now);
    match store.insert_vote(&vote).await {
        Ok(()) => {
            info!(
                "Admitted vote {} by {} in election {election_id}",
                vote.id, voter.subject
            );
            Ok(vote)
        }
        Err(StoreError::Duplicate) => {
            debug!(
                "Rejected vote by {} in election {election_id}: lost a concurrent race",
                voter.subject
            );
            Err(Error::AlreadyVoted(election_id))
        }
        Err(e) => {
            error!(
                "Failed to store vote by {} in election {election_id}: {e}",
                voter.subject
            );
            Err(e.into())
        }
    }
}

/// The vote `voter` cast in an election, if any.
pub async fn own_vote(
    store: &dyn ElectionStore,
    election_id: Id,
    voter: &Identity,
) -> Result<Option<Vote>> {
    Ok(store.vote_for(election_id, &voter.subject).await?)
}

/// Every vote `voter` has cast, newest first.
pub async fn past_votes(store: &dyn ElectionStore, voter: &Identity) -> Result<Vec<Vote>> {
    Ok(store.votes_by_voter(&voter.subject).await?)
}
