use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{
    common::{
        election::ElectionState,
        identity::{Identity, Role},
    },
    db::Election,
    mongodb::Id,
};
use crate::store::ElectionStore;

/// Minimum number of candidates an election needs before it may open.
pub const MIN_CANDIDATES: usize = 2;

/// Does the election accept votes at `now`?
pub fn is_accepting_votes(election: &Election, now: DateTime<Utc>) -> bool {
    election.state == ElectionState::Open
        && election.details.opens_at <= now
        && now < election.details.closes_at
}

/// Is the election over at `now`, either explicitly closed or past its end?
///
/// Only an explicit close is terminal; an open election past its end time is
/// read-only but its tally stays provisional until the owner closes it.
pub fn is_finalized(election: &Election, now: DateTime<Utc>) -> bool {
    election.state == ElectionState::Closed || now >= election.details.closes_at
}

/// Check that a voting window is coherent.
pub fn validate_window(opens_at: DateTime<Utc>, closes_at: DateTime<Utc>) -> Result<()> {
    if opens_at < closes_at {
        Ok(())
    } else {
        Err(Error::BadRequest(format!(
            "Election must open ({opens_at}) strictly before it closes ({closes_at})"
        )))
    }
}

/// Only the committee member who created an election may change it.
pub fn ensure_owner(actor: &Identity, election: &Election) -> Result<()> {
    if actor.role == Role::Committee && actor.subject == election.owner_id {
        Ok(())
    } else {
        Err(Error::NotAuthorized(format!(
            "{} does not own election {}",
            actor.subject, election.id
        )))
    }
}

/// Move an election to `target`.
///
/// Checks, in order: the election exists, `actor` owns it, and the move is
/// legal. The write is conditional on the state we read and, when opening,
/// on there being enough candidates at that moment, so neither a racing
/// transition nor a racing ballot edit can slip past the checks.
pub async fn transition(
    store: &dyn ElectionStore,
    actor: &Identity,
    election_id: Id,
    target: ElectionState,
) -> Result<Election> {
    let mut election = store
        .election(election_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))?;
    ensure_owner(actor, &election)?;

    let current = election.state;
    if !current.can_transition_to(target) {
        return Err(Error::InvalidTransition(format!(
            "Election {election_id} cannot move from {current} to {target}"
        )));
    }

    let min_candidates = if target == ElectionState::Open {
        MIN_CANDIDATES
    } else {
        0
    };
    let applied = store
        .set_state(election_id, &actor.subject, current, target, min_candidates)
        .await?;
    if !applied {
        return Err(rejected_transition(store, election_id, current, target).await?);
    }

    info!("Election {election_id} moved {current} -> {target} by {}", actor.subject);
    election.state = target;
    Ok(election)
}

/// Work out why a conditional state change matched nothing.
async fn rejected_transition(
    store: &dyn ElectionStore,
    election_id: Id,
    expected: ElectionState,
    target: ElectionState,
) -> Result<Error> {
    let unchanged = store
        .election(election_id)
        .await?
        .is_some_and(|e| e.state == expected);
    if unchanged && target == ElectionState::Open {
        let candidates = store.candidates(election_id).await?.len();
        return Ok(Error::InvalidTransition(format!(
            "Election {election_id} needs at least {MIN_CANDIDATES} candidates to open, \
has {candidates}"
        )));
    }
    // Moved or deleted between our read and write.
    Ok(Error::InvalidTransition(format!(
        "Election {election_id} changed state concurrently; expected {expected}"
    )))
}
