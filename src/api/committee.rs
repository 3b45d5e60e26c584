use chrono::Utc;
use rocket::{http::Status, response::status::Custom, serde::json::Json, Route, State};

use crate::error::Result;
use crate::integrity::{elections, lifecycle, tally};
use crate::model::{
    api::{
        auth::{AuthToken, Committee},
        election::{
            CandidateDesc, CandidateSpec, ElectionDescription, ElectionDetailsSpec,
            ElectionSpec, ElectionSummary,
        },
        tally::TallyDesc,
    },
    common::election::ElectionState,
    mongodb::Id,
};
use crate::store::Store;

pub fn routes() -> Vec<Route> {
    routes![
        get_owned_elections,
        create_election,
        modify_election,
        delete_election,
        add_candidate,
        modify_candidate,
        delete_candidate,
        open_election,
        close_election,
        get_results,
    ]
}

#[get("/committee/elections")]
async fn get_owned_elections(
    token: AuthToken<Committee>,
    store: &State<Store>,
) -> Result<Json<Vec<ElectionSummary>>> {
    let now = Utc::now();
    let owned = elections::owned_elections(store.inner().as_ref(), &token.identity()).await?;
    Ok(Json(
        owned
            .into_iter()
            .map(|election| ElectionSummary::new(election, now))
            .collect(),
    ))
}

#[post("/committee/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: AuthToken<Committee>,
    spec: Json<ElectionSpec>,
    store: &State<Store>,
) -> Result<Custom<Json<ElectionDescription>>> {
    let now = Utc::now();
    let (election, candidates) =
        elections::create_election(store.inner().as_ref(), &token.identity(), spec.0, now)
            .await?;
    Ok(Custom(
        Status::Created,
        Json(ElectionDescription {
            summary: ElectionSummary::new(election, now),
            candidates: candidates.into_iter().map(Into::into).collect(),
            own_vote: None,
        }),
    ))
}

#[put("/committee/elections/<election_id>", data = "<spec>", format = "json")]
async fn modify_election(
    token: AuthToken<Committee>,
    election_id: Id,
    spec: Json<ElectionDetailsSpec>,
    store: &State<Store>,
) -> Result<Json<ElectionSummary>> {
    let election = elections::edit_election(
        store.inner().as_ref(),
        &token.identity(),
        election_id,
        spec.0,
    )
    .await?;
    Ok(Json(ElectionSummary::new(election, Utc::now())))
}

#[delete("/committee/elections/<election_id>")]
async fn delete_election(
    token: AuthToken<Committee>,
    election_id: Id,
    store: &State<Store>,
) -> Result<()> {
    elections::delete_election(store.inner().as_ref(), &token.identity(), election_id).await
}

#[post(
    "/committee/elections/<election_id>/candidates",
    data = "<spec>",
    format = "json"
)]
async fn add_candidate(
    token: AuthToken<Committee>,
    election_id: Id,
    spec: Json<CandidateSpec>,
    store: &State<Store>,
) -> Result<Custom<Json<CandidateDesc>>> {
    let candidate = elections::add_candidate(
        store.inner().as_ref(),
        &token.identity(),
        election_id,
        spec.0,
        Utc::now(),
    )
    .await?;
    Ok(Custom(Status::Created, Json(candidate.into())))
}

#[put(
    "/committee/elections/<election_id>/candidates/<candidate_id>",
    data = "<spec>",
    format = "json"
)]
async fn modify_candidate(
    token: AuthToken<Committee>,
    election_id: Id,
    candidate_id: Id,
    spec: Json<CandidateSpec>,
    store: &State<Store>,
) -> Result<Json<CandidateDesc>> {
    let candidate = elections::update_candidate(
        store.inner().as_ref(),
        &token.identity(),
        election_id,
        candidate_id,
        spec.0,
    )
    .await?;
    Ok(Json(candidate.into()))
}

#[delete("/committee/elections/<election_id>/candidates/<candidate_id>")]
async fn delete_candidate(
    token: AuthToken<Committee>,
    election_id: Id,
    candidate_id: Id,
    store: &State<Store>,
) -> Result<()> {
    elections::remove_candidate(
        store.inner().as_ref(),
        &token.identity(),
        election_id,
        candidate_id,
    )
    .await
}

#[post("/committee/elections/<election_id>/open")]
async fn open_election(
    token: AuthToken<Committee>,
    election_id: Id,
    store: &State<Store>,
) -> Result<Json<ElectionSummary>> {
    let election = lifecycle::transition(
        store.inner().as_ref(),
        &token.identity(),
        election_id,
        ElectionState::Open,
    )
    .await?;
    Ok(Json(ElectionSummary::new(election, Utc::now())))
}

#[post("/committee/elections/<election_id>/close")]
async fn close_election(
    token: AuthToken<Committee>,
    election_id: Id,
    store: &State<Store>,
) -> Result<Json<ElectionSummary>> {
    let election = lifecycle::transition(
        store.inner().as_ref(),
        &token.identity(),
        election_id,
        ElectionState::Closed,
    )
    .await?;
    Ok(Json(ElectionSummary::new(election, Utc::now())))
}

#[get("/committee/elections/<election_id>/results")]
async fn get_results(
    token: AuthToken<Committee>,
    election_id: Id,
    store: &State<Store>,
) -> Result<Json<TallyDesc>> {
    let snapshot = tally::results_for_owner(
        store.inner().as_ref(),
        &token.identity(),
        election_id,
        Utc::now(),
    )
    .await?;
    Ok(Json(snapshot.into()))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::ContentType,
        local::asynchronous::{Client, LocalResponse},
        serde::json::{json, Value},
    };

    use super::*;

    use crate::bearer;
    use crate::model::{api::vote::VoteRequest, common::identity::Identity};
    use crate::store::{ElectionStore, MemoryStore};

    fn officer() -> Identity {
        Identity::committee("officer")
    }

    async fn create<'c>(client: &'c Client, spec: &ElectionSpec) -> LocalResponse<'c> {
        client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .header(bearer(officer()))
            .body(json!(spec).to_string())
            .dispatch()
            .await
    }

    async fn created(client: &Client) -> ElectionDescription {
        let response = create(client, &ElectionSpec::current_example()).await;
        assert_eq!(Status::Created, response.status());
        response.into_json().await.unwrap()
    }

    async fn post_as(client: &Client, uri: String, who: Identity) -> Status {
        client
            .post(uri)
            .header(bearer(who))
            .dispatch()
            .await
            .status()
    }

    #[backend_test]
    async fn create_and_list(client: Client, store: MemoryStore) {
        let description = created(&client).await;
        assert_eq!(description.summary.state, ElectionState::Draft);
        assert!(!description.summary.accepting_votes);
        assert_eq!(description.candidates.len(), 2);
        assert!(store.election(description.summary.id).await.unwrap().is_some());

        let response = client
            .get(uri!(get_owned_elections))
            .header(bearer(officer()))
            .dispatch()
            .await;
        let owned: Vec<ElectionSummary> = response.into_json().await.unwrap();
        assert_eq!(owned, vec![description.summary]);

        let response = client
            .get(uri!(get_owned_elections))
            .header(bearer(Identity::committee("rival")))
            .dispatch()
            .await;
        let owned: Vec<ElectionSummary> = response.into_json().await.unwrap();
        assert!(owned.is_empty());
    }

    #[backend_test]
    async fn bad_specs_are_rejected(client: Client, store: MemoryStore) {
        let mut spec = ElectionSpec::current_example();
        spec.candidates.pop();
        let response = create(&client, &spec).await;
        assert_eq!(Status::BadRequest, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "bad_request");

        let mut spec = ElectionSpec::current_example();
        std::mem::swap(&mut spec.details.opens_at, &mut spec.details.closes_at);
        let response = create(&client, &spec).await;
        assert_eq!(Status::BadRequest, response.status());

        let owned = store
            .elections_by_owner(&officer().subject)
            .await
            .unwrap();
        assert!(owned.is_empty());
    }

    #[backend_test]
    async fn voters_cannot_reach_committee_routes(client: Client) {
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .header(bearer(Identity::voter("alice")))
            .body(json!(ElectionSpec::current_example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "not_authorized");
    }

    #[backend_test]
    async fn full_lifecycle(client: Client) {
        let description = created(&client).await;
        let id = description.summary.id;

        // Edit the ballot while it is still a draft.
        let response = client
            .post(uri!(add_candidate(id)))
            .header(ContentType::JSON)
            .header(bearer(officer()))
            .body(json!({ "name": "Third Candidate" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        let third: CandidateDesc = response.into_json().await.unwrap();

        let response = client
            .put(uri!(modify_candidate(id, third.id)))
            .header(ContentType::JSON)
            .header(bearer(officer()))
            .body(json!({ "name": "Renamed", "description": "Late entry" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        // Open, vote, close.
        let status = post_as(&client, uri!(open_election(id)).to_string(), officer()).await;
        assert_eq!(Status::Ok, status);

        for (voter, candidate) in [("a", third.id), ("b", third.id), ("c", description.candidates[0].id)] {
            let response = client
                .post(format!("/elections/{id}/votes"))
                .header(ContentType::JSON)
                .header(bearer(Identity::voter(voter)))
                .body(json!(VoteRequest { candidate_id: candidate }).to_string())
                .dispatch()
                .await;
            assert_eq!(Status::Created, response.status());
        }

        let status = post_as(&client, uri!(close_election(id)).to_string(), officer()).await;
        assert_eq!(Status::Ok, status);
        let status = post_as(&client, uri!(close_election(id)).to_string(), officer()).await;
        assert_eq!(Status::Conflict, status);

        let response = client
            .get(uri!(get_results(id)))
            .header(bearer(officer()))
            .dispatch()
            .await;
        let results: TallyDesc = response.into_json().await.unwrap();
        assert!(results.finalized);
        assert_eq!(results.total_votes, 3);
        let counts: Vec<_> = results
            .per_candidate
            .iter()
            .map(|c| (c.candidate_name.as_str(), c.vote_count))
            .collect();
        assert_eq!(
            counts,
            vec![("Renamed", 2), ("Chris Riches", 1), ("Parry Hotter", 0)]
        );
    }

    #[backend_test]
    async fn open_ballot_is_frozen(client: Client) {
        let description = created(&client).await;
        let id = description.summary.id;
        post_as(&client, uri!(open_election(id)).to_string(), officer()).await;

        let response = client
            .delete(uri!(delete_candidate(id, description.candidates[0].id)))
            .header(bearer(officer()))
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());

        let response = client
            .put(uri!(modify_election(id)))
            .header(ContentType::JSON)
            .header(bearer(officer()))
            .body(json!(ElectionSpec::current_example().details).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test]
    async fn only_owner_manages(client: Client, store: MemoryStore) {
        let description = created(&client).await;
        let id = description.summary.id;
        let rival = Identity::committee("rival");

        let status = post_as(&client, uri!(open_election(id)).to_string(), rival.clone()).await;
        assert_eq!(Status::Forbidden, status);

        let response = client
            .get(uri!(get_results(id)))
            .header(bearer(rival.clone()))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        let response = client
            .delete(uri!(delete_election(id)))
            .header(bearer(rival))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
        assert!(store.election(id).await.unwrap().is_some());

        let response = client
            .delete(uri!(delete_election(id)))
            .header(bearer(officer()))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(store.election(id).await.unwrap().is_none());
    }

    #[backend_test]
    async fn opening_needs_two_candidates(client: Client) {
        let description = created(&client).await;
        let id = description.summary.id;
        let response = client
            .delete(uri!(delete_candidate(id, description.candidates[0].id)))
            .header(bearer(officer()))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let status = post_as(&client, uri!(open_election(id)).to_string(), officer()).await;
        assert_eq!(Status::Conflict, status);
    }
}
