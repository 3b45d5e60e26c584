use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{Candidate, Election, Vote};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for Election {
    const NAME: &'static str = "elections";
}

impl MongoCollection for Candidate {
    const NAME: &'static str = "candidates";
}

impl MongoCollection for Vote {
    const NAME: &'static str = "votes";
}

/// Ensure that all the required indexes exist on the given database.
///
/// The unique `(election_id, voter_id)` index on votes is what makes ballot
/// admission safe under concurrent submissions; the server must not start
/// without it.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // One vote per voter per election.
    let one_vote_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "voter_id": 1})
        .options(unique)
        .build();
    // Tally aggregation.
    let tally_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "candidate_id": 1})
        .build();
    // Past votes for a voter.
    let voter_index = IndexModel::builder().keys(doc! {"voter_id": 1}).build();
    Coll::<Vote>::from_db(db)
        .create_indexes([one_vote_index, tally_index, voter_index], None)
        .await?;

    // Candidates in ballot order.
    let candidate_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "position": 1})
        .build();
    Coll::<Candidate>::from_db(db)
        .create_index(candidate_index, None)
        .await?;

    // Committee dashboards and voter listings.
    let owner_index = IndexModel::builder().keys(doc! {"owner_id": 1}).build();
    let state_index = IndexModel::builder().keys(doc! {"state": 1}).build();
    Coll::<Election>::from_db(db)
        .create_indexes([owner_index, state_index], None)
        .await?;

    Ok(())
}
