//! Committee-side management of elections and their ballots, plus the
//! read-only views handed to voters.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{
    api::election::{CandidateSpec, ElectionDetailsSpec, ElectionSpec},
    common::{
        election::ElectionState,
        identity::{Identity, Role},
    },
    db::{Candidate, Election},
    mongodb::Id,
};
use crate::store::ElectionStore;

use super::lifecycle::ensure_owner;

fn ensure_committee(actor: &Identity) -> Result<()> {
    if actor.role == Role::Committee {
        Ok(())
    } else {
        Err(Error::NotAuthorized(format!(
            "{} is not a committee member",
            actor.subject
        )))
    }
}

async fn load(store: &dyn ElectionStore, election_id: Id) -> Result<Election> {
    store
        .election(election_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election {election_id}")))
}

/// Load an election `actor` owns that is still a draft.
async fn load_owned_draft(
    store: &dyn ElectionStore,
    actor: &Identity,
    election_id: Id,
) -> Result<Election> {
    let election = load(store, election_id).await?;
    ensure_owner(actor, &election)?;
    if election.state != ElectionState::Draft {
        return Err(Error::InvalidTransition(format!(
            "Election {election_id} is {} and can no longer be edited",
            election.state
        )));
    }
    Ok(election)
}

/// Work out why a conditional ballot write on `election_id` matched
/// nothing. If the election is still an owned draft, `otherwise` is the
/// reason.
async fn rejected_ballot_write(
    store: &dyn ElectionStore,
    actor: &Identity,
    election_id: Id,
    otherwise: Error,
) -> Error {
    match load_owned_draft(store, actor, election_id).await {
        Ok(_) => otherwise,
        Err(e) => e,
    }
}

/// Create a draft election with its initial candidates.
pub async fn create_election(
    store: &dyn ElectionStore,
    actor: &Identity,
    spec: ElectionSpec,
    now: DateTime<Utc>,
) -> Result<(Election, Vec<Candidate>)> {
    ensure_committee(actor)?;
    let (election, candidates) = spec.into_election(actor.subject.clone(), now)?;
    store.insert_election(&election, &candidates).await?;
    info!(
        "Election {} created by {} with {} candidates",
        election.id,
        actor.subject,
        candidates.len()
    );
    Ok((election, candidates))
}

/// Elections created by `actor`, newest first.
pub async fn owned_elections(store: &dyn ElectionStore, actor: &Identity) -> Result<Vec<Election>> {
    ensure_committee(actor)?;
    Ok(store.elections_by_owner(&actor.subject).await?)
}

/// Replace the title, description and window of a draft election.
pub async fn edit_election(
    store: &dyn ElectionStore,
    actor: &Identity,
    election_id: Id,
    spec: ElectionDetailsSpec,
) -> Result<Election> {
    let mut election = load_owned_draft(store, actor, election_id).await?;
    let details = spec.into_details()?;
    if !store
        .update_election_details(election_id, &actor.subject, &details)
        .await?
    {
        // Opened or deleted since we looked.
        return Err(Error::InvalidTransition(format!(
            "Election {election_id} is no longer a draft"
        )));
    }
    election.details = details;
    Ok(election)
}

/// Delete an election with all its candidates and votes.
pub async fn delete_election(
    store: &dyn ElectionStore,
    actor: &Identity,
    election_id: Id,
) -> Result<()> {
    let election = load(store, election_id).await?;
    ensure_owner(actor, &election)?;
    if !store.delete_election(election_id, &actor.subject).await? {
        return Err(Error::not_found(format!("Election {election_id}")));
    }
    info!("Election {election_id} deleted by {}", actor.subject);
    Ok(())
}

/// Append a candidate to the ballot of a draft election.
pub async fn add_candidate(
    store: &dyn ElectionStore,
    actor: &Identity,
    election_id: Id,
    spec: CandidateSpec,
    now: DateTime<Utc>,
) -> Result<Candidate> {
    load_owned_draft(store, actor, election_id).await?;
    let position = store
        .candidates(election_id)
        .await?
        .iter()
        .map(|c| c.position + 1)
        .max()
        .unwrap_or(0);
    let candidate = spec.into_candidate(election_id, position, now)?;
    if !store.insert_candidate(&actor.subject, &candidate).await? {
        let err = Error::InvalidTransition(format!("Election {election_id} is no longer a draft"));
        return Err(rejected_ballot_write(store, actor, election_id, err).await);
    }
    Ok(candidate)
}

async fn load_candidate(
    store: &dyn ElectionStore,
    election_id: Id,
    candidate_id: Id,
) -> Result<Candidate> {
    store
        .candidate(candidate_id)
        .await?
        .filter(|c| c.election_id == election_id)
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))
}

/// Rename or redescribe a candidate of a draft election. Its position is
/// kept.
pub async fn update_candidate(
    store: &dyn ElectionStore,
    actor: &Identity,
    election_id: Id,
    candidate_id: Id,
    spec: CandidateSpec,
) -> Result<Candidate> {
    load_owned_draft(store, actor, election_id).await?;
    let existing = load_candidate(store, election_id, candidate_id).await?;
    let mut candidate = spec.into_candidate(election_id, existing.position, existing.created_at)?;
    candidate.id = existing.id;
    if !store.update_candidate(&actor.subject, &candidate).await? {
        let err = Error::not_found(format!("Candidate {candidate_id}"));
        return Err(rejected_ballot_write(store, actor, election_id, err).await);
    }
    Ok(candidate)
}

/// Take a candidate off the ballot of a draft election.
pub async fn remove_candidate(
    store: &dyn ElectionStore,
    actor: &Identity,
    election_id: Id,
    candidate_id: Id,
) -> Result<()> {
    if !store
        .delete_candidate(&actor.subject, election_id, candidate_id)
        .await?
    {
        let err = Error::not_found(format!("Candidate {candidate_id}"));
        return Err(rejected_ballot_write(store, actor, election_id, err).await);
    }
    info!("Candidate {candidate_id} removed from election {election_id} by {}", actor.subject);
    Ok(())
}

/// Elections in `state`, as listed to voters. Drafts are never listed.
pub async fn listed_elections(
    store: &dyn ElectionStore,
    state: ElectionState,
) -> Result<Vec<Election>> {
    if state == ElectionState::Draft {
        return Err(Error::BadRequest(
            "Draft elections are not publicly listed".to_string(),
        ));
    }
    Ok(store.elections_in_state(state).await?)
}

/// An election and its ballot as seen by `viewer`. Drafts are only visible
/// to their owner; everyone else gets [`Error::NotFound`].
pub async fn election_with_ballot(
    store: &dyn ElectionStore,
    viewer: &Identity,
    election_id: Id,
) -> Result<(Election, Vec<Candidate>)> {
    let election = load(store, election_id).await?;
    if election.state == ElectionState::Draft && ensure_owner(viewer, &election).is_err() {
        return Err(Error::not_found(format!("Election {election_id}")));
    }
    let candidates = store.candidates(election_id).await?;
    Ok((election, candidates))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    use crate::integrity::admission::cast_vote;
    use crate::integrity::lifecycle::transition;
    use crate::store::MemoryStore;

    fn owner() -> Identity {
        Identity::committee("returning-officer")
    }

    async fn draft(store: &MemoryStore) -> (Election, Vec<Candidate>) {
        create_election(store, &owner(), ElectionSpec::current_example(), Utc::now())
            .await
            .unwrap()
    }

    #[backend_test]
    async fn committee_creates_drafts(store: MemoryStore) {
        let (election, candidates) = draft(&store).await;
        assert_eq!(election.state, ElectionState::Draft);
        assert_eq!(store.candidates(election.id).await.unwrap(), candidates);

        let listed = owned_elections(&store, &owner()).await.unwrap();
        assert_eq!(listed, vec![election]);
    }

    #[backend_test]
    async fn voters_cannot_manage_elections(store: MemoryStore) {
        let voter = Identity::voter("returning-officer");
        let result =
            create_election(&store, &voter, ElectionSpec::current_example(), Utc::now()).await;
        assert!(matches!(result, Err(Error::NotAuthorized(_))));
        assert!(matches!(
            owned_elections(&store, &voter).await,
            Err(Error::NotAuthorized(_))
        ));
    }

    #[backend_test]
    async fn drafts_can_be_edited_until_opened(store: MemoryStore) {
        let (election, _) = draft(&store).await;
        let mut details = ElectionSpec::current_example().details;
        details.title = "Treasurer".to_string();

        let edited = edit_election(&store, &owner(), election.id, details.clone())
            .await
            .unwrap();
        assert_eq!(edited.details.title, "Treasurer");
        let stored = store.election(election.id).await.unwrap().unwrap();
        assert_eq!(stored.details.title, "Treasurer");

        transition(&store, &owner(), election.id, ElectionState::Open)
            .await
            .unwrap();
        let result = edit_election(&store, &owner(), election.id, details).await;
        assert!(matches!(result, Err(Error::InvalidTransition(_))));
    }

    #[backend_test]
    async fn only_owner_edits(store: MemoryStore) {
        let (election, _) = draft(&store).await;
        let rival = Identity::committee("rival");
        let details = ElectionSpec::current_example().details;
        let result = edit_election(&store, &rival, election.id, details).await;
        assert!(matches!(result, Err(Error::NotAuthorized(_))));
        let result = delete_election(&store, &rival, election.id).await;
        assert!(matches!(result, Err(Error::NotAuthorized(_))));
        assert!(store.election(election.id).await.unwrap().is_some());
    }

    #[backend_test]
    async fn candidates_are_appended_edited_and_removed(store: MemoryStore) {
        let (election, initial) = draft(&store).await;
        let added = add_candidate(
            &store,
            &owner(),
            election.id,
            CandidateSpec::example("Third Option"),
            Utc::now(),
        )
        .await
        .unwrap();
        assert_eq!(added.position, 2);

        let renamed = update_candidate(
            &store,
            &owner(),
            election.id,
            initial[0].id,
            CandidateSpec::example("Christopher Riches"),
        )
        .await
        .unwrap();
        assert_eq!(renamed.position, initial[0].position);

        remove_candidate(&store, &owner(), election.id, initial[1].id)
            .await
            .unwrap();
        let names: Vec<_> = store
            .candidates(election.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["Christopher Riches", "Third Option"]);
    }

    #[backend_test]
    async fn candidates_of_other_elections_are_not_found(store: MemoryStore) {
        let (first, _) = draft(&store).await;
        let (_, other) = draft(&store).await;
        let result = update_candidate(
            &store,
            &owner(),
            first.id,
            other[0].id,
            CandidateSpec::example("Hijack"),
        )
        .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        let result = remove_candidate(&store, &owner(), first.id, other[0].id).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[backend_test]
    async fn only_owner_edits_the_ballot(store: MemoryStore) {
        let (election, candidates) = draft(&store).await;
        let rival = Identity::committee("rival");
        let result = remove_candidate(&store, &rival, election.id, candidates[0].id).await;
        assert!(matches!(result, Err(Error::NotAuthorized(_))));
        let result = add_candidate(
            &store,
            &rival,
            election.id,
            CandidateSpec::example("Plant"),
            Utc::now(),
        )
        .await;
        assert!(matches!(result, Err(Error::NotAuthorized(_))));
        assert_eq!(store.candidates(election.id).await.unwrap(), candidates);

        let result = remove_candidate(&store, &owner(), Id::new(), candidates[0].id).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[backend_test]
    async fn ballot_is_frozen_once_open(store: MemoryStore) {
        let (election, candidates) = draft(&store).await;
        transition(&store, &owner(), election.id, ElectionState::Open)
            .await
            .unwrap();
        let result = add_candidate(
            &store,
            &owner(),
            election.id,
            CandidateSpec::example("Latecomer"),
            Utc::now(),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidTransition(_))));
        let result = remove_candidate(&store, &owner(), election.id, candidates[0].id).await;
        assert!(matches!(result, Err(Error::InvalidTransition(_))));
        assert_eq!(store.candidates(election.id).await.unwrap().len(), 2);
    }

    #[backend_test]
    async fn delete_cascades_to_votes(store: MemoryStore) {
        let (election, candidates) = draft(&store).await;
        transition(&store, &owner(), election.id, ElectionState::Open)
            .await
            .unwrap();
        let voter = Identity::voter("v1");
        cast_vote(&store, election.id, candidates[0].id, &voter, Utc::now())
            .await
            .unwrap();

        delete_election(&store, &owner(), election.id).await.unwrap();
        assert!(store.election(election.id).await.unwrap().is_none());
        assert!(store.candidates(election.id).await.unwrap().is_empty());
        assert_eq!(store.vote_count().await, 0);

        let again = delete_election(&store, &owner(), election.id).await;
        assert!(matches!(again, Err(Error::NotFound(_))));
    }

    #[backend_test]
    async fn drafts_are_hidden_from_voters(store: MemoryStore) {
        let (election, _) = draft(&store).await;
        let voter = Identity::voter("v1");

        let result = election_with_ballot(&store, &voter, election.id).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(election_with_ballot(&store, &owner(), election.id)
            .await
            .is_ok());
        assert!(matches!(
            listed_elections(&store, ElectionState::Draft).await,
            Err(Error::BadRequest(_))
        ));

        transition(&store, &owner(), election.id, ElectionState::Open)
            .await
            .unwrap();
        let (seen, ballot) = election_with_ballot(&store, &voter, election.id)
            .await
            .unwrap();
        assert_eq!(seen.state, ElectionState::Open);
        assert_eq!(ballot.len(), 2);
        let open = listed_elections(&store, ElectionState::Open).await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[backend_test]
    async fn creation_validates_window(store: MemoryStore) {
        let mut spec = ElectionSpec::current_example();
        spec.details.opens_at = spec.details.closes_at + Duration::hours(1);
        let result = create_election(&store, &owner(), spec, Utc::now()).await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
        assert!(owned_elections(&store, &owner()).await.unwrap().is_empty());
    }
}
