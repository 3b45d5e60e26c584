use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{
    common::identity::Identity,
    db::Election,
    mongodb::Id,
};
use crate::store::{ElectionStore, TallyRead};

use super::lifecycle::{ensure_owner, is_finalized};

/// One row of a tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTally {
    pub candidate_id: Id,
    pub candidate_name: String,
    pub vote_count: u64,
}

/// A ranked, internally consistent view of an election's votes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallySnapshot {
    pub election_id: Id,
    /// Most votes first; ties in candidate insertion order.
    pub per_candidate: Vec<CandidateTally>,
    /// Every vote of the election, whichever candidate it names.
    pub total_votes: u64,
    /// False while votes may still land or the owner has yet to close.
    pub finalized: bool,
}

/// Compute the tally of an election. Safe to call at any time; while the
/// election is still running the result is provisional.
pub async fn compute_tally(
    store: &dyn ElectionStore,
    election_id: Id,
    now: DateTime<Utc>,
) -> Result<TallySnapshot> {
    let election = store
        .election(election_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))?;
    tally_of(store, &election, now).await
}

/// Compute the tally of an election on behalf of its owner.
pub async fn results_for_owner(
    store: &dyn ElectionStore,
    actor: &Identity,
    election_id: Id,
    now: DateTime<Utc>,
) -> Result<TallySnapshot> {
    let election = store
        .election(election_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))?;
    ensure_owner(actor, &election)?;
    tally_of(store, &election, now).await
}

async fn tally_of(
    store: &dyn ElectionStore,
    election: &Election,
    now: DateTime<Utc>,
) -> Result<TallySnapshot> {
    let read = store.tally_snapshot(election.id).await?;
    let (per_candidate, total_votes) = rank(read);
    Ok(TallySnapshot {
        election_id: election.id,
        per_candidate,
        total_votes,
        finalized: is_finalized(election, now),
    })
}

/// Rank candidates by vote count, most first, ties broken by insertion
/// order. The total counts every vote in the read, so it does not depend on
/// the candidate list.
fn rank(read: TallyRead) -> (Vec<CandidateTally>, u64) {
    let TallyRead {
        mut candidates,
        counts,
    } = read;
    let total_votes: u64 = counts.values().sum();

    candidates.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
    let listed: HashSet<Id> = candidates.iter().map(|c| c.id).collect();
    let orphaned: u64 = counts
        .iter()
        .filter(|(id, _)| !listed.contains(id))
        .map(|(_, count)| count)
        .sum();
    if orphaned > 0 {
        warn!("{orphaned} votes reference candidates that no longer exist");
    }

    let mut per_candidate: Vec<_> = candidates
        .into_iter()
        .map(|c| CandidateTally {
            vote_count: counts.get(&c.id).copied().unwrap_or(0),
            candidate_id: c.id,
            candidate_name: c.name,
        })
        .collect();
    // Stable, so equal counts keep insertion order.
    per_candidate.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));
    (per_candidate, total_votes)
}
