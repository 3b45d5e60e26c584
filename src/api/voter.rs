use chrono::Utc;
use rocket::{http::Status, response::status::Custom, serde::json::Json, Route, State};

use crate::error::Result;
use crate::integrity::{admission, elections};
use crate::model::{
    api::{
        auth::{AnyRole, AuthToken, Voter},
        election::{ElectionDescription, ElectionSummary},
        vote::{VoteDesc, VoteRequest},
    },
    common::{election::ElectionState, identity::Role},
    mongodb::Id,
};
use crate::store::Store;

pub fn routes() -> Vec<Route> {
    routes![get_elections, get_election, cast_vote, get_own_votes]
}

#[get("/elections?<state>")]
async fn get_elections(
    _token: AuthToken<AnyRole>,
    state: Option<ElectionState>,
    store: &State<Store>,
) -> Result<Json<Vec<ElectionSummary>>> {
    let now = Utc::now();
    let listed = elections::listed_elections(
        store.inner().as_ref(),
        state.unwrap_or(ElectionState::Open),
    )
    .await?;
    Ok(Json(
        listed
            .into_iter()
            .map(|election| ElectionSummary::new(election, now))
            .collect(),
    ))
}

#[get("/elections/<election_id>")]
async fn get_election(
    token: AuthToken<AnyRole>,
    election_id: Id,
    store: &State<Store>,
) -> Result<Json<ElectionDescription>> {
    let store = store.inner().as_ref();
    let viewer = token.identity();
    let (election, candidates) =
        elections::election_with_ballot(store, &viewer, election_id).await?;
    let own_vote = if viewer.role == Role::Voter {
        admission::own_vote(store, election_id, &viewer).await?
    } else {
        None
    };
    Ok(Json(ElectionDescription {
        summary: ElectionSummary::new(election, Utc::now()),
        candidates: candidates.into_iter().map(Into::into).collect(),
        own_vote: own_vote.map(Into::into),
    }))
}

#[post("/elections/<election_id>/votes", data = "<request>", format = "json")]
async fn cast_vote(
    token: AuthToken<Voter>,
    election_id: Id,
    request: Json<VoteRequest>,
    store: &State<Store>,
) -> Result<Custom<Json<VoteDesc>>> {
    let vote = admission::cast_vote(
        store.inner().as_ref(),
        election_id,
        request.candidate_id,
        &token.identity(),
        Utc::now(),
    )
    .await?;
    Ok(Custom(Status::Created, Json(vote.into())))
}

#[get("/voter/votes")]
async fn get_own_votes(
    token: AuthToken<Voter>,
    store: &State<Store>,
) -> Result<Json<Vec<VoteDesc>>> {
    let votes = admission::past_votes(store.inner().as_ref(), &token.identity()).await?;
    Ok(Json(votes.into_iter().map(Into::into).collect()))
}
