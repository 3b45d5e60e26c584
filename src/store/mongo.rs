use std::collections::HashMap;

use mongodb::{
    bson::{doc, Document},
    error::Error as DbError,
    options::{FindOptions, SessionOptions},
    Client, ClientSession, Database,
};
use rocket::futures::TryStreamExt;

use crate::model::{
    common::{election::ElectionState, identity::SubjectId},
    db::{Candidate, Election, ElectionDetails, Vote},
    mongodb::{is_duplicate_key_error, Coll, Id},
};

use super::{ElectionStore, StoreError, StoreResult, TallyRead};

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        if is_duplicate_key_error(&err) {
            StoreError::Duplicate
        } else {
            StoreError::Unavailable(err.to_string())
        }
    }
}

/// The production store, backed by MongoDB.
///
/// Multi-document operations run in transactions and tallies read from a
/// snapshot session, so the server must be a replica set.
pub struct MongoStore {
    client: Client,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
}

impl MongoStore {
    pub fn new(client: Client, db: &Database) -> Self {
        Self {
            client,
            elections: Coll::from_db(db),
            candidates: Coll::from_db(db),
            votes: Coll::from_db(db),
        }
    }

    fn candidate_order() -> FindOptions {
        FindOptions::builder()
            .sort(doc! {"position": 1, "_id": 1})
            .build()
    }

    async fn transaction(&self) -> Result<ClientSession, DbError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(session)
    }

    /// Within `session`, touch the election if it is a draft owned by
    /// `owner`. Every ballot write and every state change writes the election
    /// document, so concurrent ones hit a write conflict instead of each
    /// committing against a stale read.
    async fn claim_draft(
        &self,
        election_id: Id,
        owner: &SubjectId,
        session: &mut ClientSession,
    ) -> Result<bool, DbError> {
        let filter = doc! {
            "_id": election_id,
            "owner_id": owner,
            "state": ElectionState::Draft,
        };
        let update = doc! {"$inc": {"ballot_revision": 1}};
        let result = self
            .elections
            .update_one_with_session(filter, update, None, session)
            .await?;
        Ok(result.matched_count == 1)
    }
}

#[rocket::async_trait]
impl ElectionStore for MongoStore {
    async fn election(&self, id: Id) -> StoreResult<Option<Election>> {
        Ok(self.elections.find_one(id.as_doc(), None).await?)
    }

    async fn elections_by_owner(&self, owner: &SubjectId) -> StoreResult<Vec<Election>> {
        let options = FindOptions::builder()
            .sort(doc! {"created_at": -1, "_id": -1})
            .build();
        let elections = self
            .elections
            .find(doc! {"owner_id": owner}, options)
            .await?
            .try_collect()
            .await?;
        Ok(elections)
    }

    async fn elections_in_state(&self, state: ElectionState) -> StoreResult<Vec<Election>> {
        let options = FindOptions::builder()
            .sort(doc! {"closes_at": 1, "_id": 1})
            .build();
        let elections = self
            .elections
            .find(doc! {"state": state}, options)
            .await?
            .try_collect()
            .await?;
        Ok(elections)
    }

    async fn insert_election(
        &self,
        election: &Election,
        candidates: &[Candidate],
    ) -> StoreResult<()> {
        let mut session = self.transaction().await?;
        self.elections
            .insert_one_with_session(election, None, &mut session)
            .await?;
        if !candidates.is_empty() {
            self.candidates
                .insert_many_with_session(candidates, None, &mut session)
                .await?;
        }
        session.commit_transaction().await?;
        Ok(())
    }

    async fn update_election_details(
        &self,
        id: Id,
        owner: &SubjectId,
        details: &ElectionDetails,
    ) -> StoreResult<bool> {
        let filter = doc! {
            "_id": id,
            "owner_id": owner,
            "state": ElectionState::Draft,
        };
        let update = doc! {
            "$set": {
                "title": details.title.as_str(),
                "description": details.description.as_deref(),
                "opens_at": details.opens_at,
                "closes_at": details.closes_at,
            }
        };
        let result = self.elections.update_one(filter, update, None).await?;
        Ok(result.matched_count == 1)
    }

    async fn set_state(
        &self,
        id: Id,
        owner: &SubjectId,
        from: ElectionState,
        to: ElectionState,
        min_candidates: usize,
    ) -> StoreResult<bool> {
        let mut session = self.transaction().await?;
        let filter = doc! {
            "_id": id,
            "owner_id": owner,
            "state": from,
        };
        let update = doc! {
            "$set": {
                "state": to,
            }
        };
        let result = self
            .elections
            .update_one_with_session(filter, update, None, &mut session)
            .await?;
        if result.modified_count != 1 {
            session.abort_transaction().await?;
            return Ok(false);
        }
        if min_candidates > 0 {
            let candidates = self
                .candidates
                .count_documents_with_session(doc! {"election_id": id}, None, &mut session)
                .await?;
            if candidates < min_candidates as u64 {
                session.abort_transaction().await?;
                return Ok(false);
            }
        }
        session.commit_transaction().await?;
        Ok(true)
    }

    async fn delete_election(&self, id: Id, owner: &SubjectId) -> StoreResult<bool> {
        let mut session = self.transaction().await?;
        let filter = doc! {
            "_id": id,
            "owner_id": owner,
        };
        let result = self
            .elections
            .delete_one_with_session(filter, None, &mut session)
            .await?;
        if result.deleted_count == 0 {
            session.abort_transaction().await?;
            return Ok(false);
        }
        let children = doc! {"election_id": id};
        self.candidates
            .delete_many_with_session(children.clone(), None, &mut session)
            .await?;
        self.votes
            .delete_many_with_session(children, None, &mut session)
            .await?;
        session.commit_transaction().await?;
        Ok(true)
    }

    async fn candidate(&self, id: Id) -> StoreResult<Option<Candidate>> {
        Ok(self.candidates.find_one(id.as_doc(), None).await?)
    }

    async fn candidates(&self, election_id: Id) -> StoreResult<Vec<Candidate>> {
        let candidates = self
            .candidates
            .find(doc! {"election_id": election_id}, Self::candidate_order())
            .await?
            .try_collect()
            .await?;
        Ok(candidates)
    }

    async fn insert_candidate(
        &self,
        owner: &SubjectId,
        candidate: &Candidate,
    ) -> StoreResult<bool> {
        let mut session = self.transaction().await?;
        if !self
            .claim_draft(candidate.election_id, owner, &mut session)
            .await?
        {
            session.abort_transaction().await?;
            return Ok(false);
        }
        self.candidates
            .insert_one_with_session(candidate, None, &mut session)
            .await?;
        session.commit_transaction().await?;
        Ok(true)
    }

    async fn update_candidate(
        &self,
        owner: &SubjectId,
        candidate: &Candidate,
    ) -> StoreResult<bool> {
        let mut session = self.transaction().await?;
        if !self
            .claim_draft(candidate.election_id, owner, &mut session)
            .await?
        {
            session.abort_transaction().await?;
            return Ok(false);
        }
        let filter = doc! {
            "_id": candidate.id,
            "election_id": candidate.election_id,
        };
        let update = doc! {
            "$set": {
                "name": candidate.name.as_str(),
                "description": candidate.description.as_deref(),
            }
        };
        let result = self
            .candidates
            .update_one_with_session(filter, update, None, &mut session)
            .await?;
        if result.matched_count != 1 {
            session.abort_transaction().await?;
            return Ok(false);
        }
        session.commit_transaction().await?;
        Ok(true)
    }

    async fn delete_candidate(
        &self,
        owner: &SubjectId,
        election_id: Id,
        candidate_id: Id,
    ) -> StoreResult<bool> {
        let mut session = self.transaction().await?;
        if !self.claim_draft(election_id, owner, &mut session).await? {
            session.abort_transaction().await?;
            return Ok(false);
        }
        let filter = doc! {
            "_id": candidate_id,
            "election_id": election_id,
        };
        let result = self
            .candidates
            .delete_one_with_session(filter, None, &mut session)
            .await?;
        if result.deleted_count != 1 {
            session.abort_transaction().await?;
            return Ok(false);
        }
        session.commit_transaction().await?;
        Ok(true)
    }

    async fn vote_for(&self, election_id: Id, voter: &SubjectId) -> StoreResult<Option<Vote>> {
        let filter = doc! {
            "election_id": election_id,
            "voter_id": voter,
        };
        Ok(self.votes.find_one(filter, None).await?)
    }

    async fn votes_by_voter(&self, voter: &SubjectId) -> StoreResult<Vec<Vote>> {
        let options = FindOptions::builder()
            .sort(doc! {"cast_at": -1, "_id": -1})
            .build();
        let votes = self
            .votes
            .find(doc! {"voter_id": voter}, options)
            .await?
            .try_collect()
            .await?;
        Ok(votes)
    }

    async fn insert_vote(&self, vote: &Vote) -> StoreResult<()> {
        // The unique (election_id, voter_id) index turns a second vote into a
        // duplicate key error, which `From<DbError>` maps to `Duplicate`.
        self.votes.insert_one(vote, None).await?;
        Ok(())
    }

    async fn tally_snapshot(&self, election_id: Id) -> StoreResult<TallyRead> {
        // Read candidates and counts at the same cluster time.
        let session_options = SessionOptions::builder().snapshot(true).build();
        let mut session = self.client.start_session(Some(session_options)).await?;

        let mut candidates = Vec::new();
        let mut cursor = self
            .candidates
            .find_with_session(
                doc! {"election_id": election_id},
                Self::candidate_order(),
                &mut session,
            )
            .await?;
        while let Some(candidate) = cursor.next(&mut session).await {
            candidates.push(candidate?);
        }

        let pipeline = [
            doc! {"$match": {"election_id": election_id}},
            doc! {"$group": {"_id": "$candidate_id", "count": {"$sum": 1}}},
        ];
        let mut counts = HashMap::new();
        let mut cursor = self
            .votes
            .aggregate_with_session(pipeline, None, &mut session)
            .await?;
        while let Some(group) = cursor.next(&mut session).await {
            let (candidate_id, count) = parse_count(group?)?;
            counts.insert(candidate_id, count);
        }

        Ok(TallyRead { candidates, counts })
    }
}

/// Decode one `{_id: <candidate id>, count: <n>}` group.
fn parse_count(group: Document) -> StoreResult<(Id, u64)> {
    let candidate_id = group
        .get_object_id("_id")
        .map_err(|e| StoreError::Unavailable(format!("Malformed tally group: {e}")))?;
    // `$sum` yields an i32 until it overflows into an i64.
    let count = match group.get_i32("count") {
        Ok(count) => i64::from(count),
        Err(_) => group
            .get_i64("count")
            .map_err(|e| StoreError::Unavailable(format!("Malformed tally group: {e}")))?,
    };
    let count = u64::try_from(count)
        .map_err(|_| StoreError::Unavailable(format!("Negative tally count {count}")))?;
    Ok((candidate_id.into(), count))
}
