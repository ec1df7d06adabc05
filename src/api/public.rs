use std::sync::Arc;

use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::{QuorumStatus, VoteDump, VotingEngine},
    error::Result,
    model::{ClosedResult, Member, MemberId, Vote, VoteId, VoteState},
    registry::MemberRegistry,
};

pub fn routes() -> Vec<Route> {
    routes![
        list_votes,
        get_vote,
        quorum_status,
        get_result,
        dump_vote,
        get_member
    ]
}

#[get("/votes?<state>")]
async fn list_votes(
    state: Option<&str>,
    engine: &State<Arc<VotingEngine>>,
) -> Result<Json<Vec<Vote>>> {
    let state = state.map(str::parse::<VoteState>).transpose()?;
    Ok(Json(engine.list_votes(state).await?))
}

#[get("/votes/<vote_id>")]
async fn get_vote(vote_id: VoteId, engine: &State<Arc<VotingEngine>>) -> Result<Json<Vote>> {
    Ok(Json(engine.get_vote(vote_id).await?))
}

/// Live tally and turnout, re-evaluated against the current eligible count.
#[get("/votes/<vote_id>/quorum")]
async fn quorum_status(
    vote_id: VoteId,
    engine: &State<Arc<VotingEngine>>,
) -> Result<Json<QuorumStatus>> {
    Ok(Json(engine.quorum_status(vote_id).await?))
}

#[get("/votes/<vote_id>/result")]
async fn get_result(
    vote_id: VoteId,
    engine: &State<Arc<VotingEngine>>,
) -> Result<Json<ClosedResult>> {
    Ok(Json(engine.get_result(vote_id).await?))
}

/// Everything needed to check a result independently.
#[get("/votes/<vote_id>/dump")]
async fn dump_vote(vote_id: VoteId, engine: &State<Arc<VotingEngine>>) -> Result<Json<VoteDump>> {
    Ok(Json(engine.dump(vote_id).await?))
}

#[get("/members/<member_id>")]
async fn get_member(
    member_id: MemberId,
    registry: &State<MemberRegistry>,
) -> Result<Json<Member>> {
    Ok(Json(registry.get(member_id).await?))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{serde_json::json, Value},
    };

    use crate::api::test_util::{admin_auth, voter_auth};
    use crate::engine::clock::ManualClock;
    use crate::model::{Ballot, Outcome, VoteSpec};
    use crate::store::{MemoryStore, Store};

    use super::*;

    async fn seed_members(store: &MemoryStore, count: MemberId) {
        for id in 1..=count {
            store
                .insert_member(&Member::approved_example(id))
                .await
                .unwrap();
        }
    }

    async fn publish(client: &Client) -> Vote {
        client
            .post("/votes/publish")
            .header(ContentType::JSON)
            .header(admin_auth())
            .body(json!(VoteSpec::example()).to_string())
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap()
    }

    async fn cast(client: &Client, vote_id: VoteId, member_id: MemberId, option: &str) -> Status {
        client
            .post(format!("/votes/{vote_id}/ballot"))
            .header(ContentType::JSON)
            .header(voter_auth(member_id))
            .body(json!({ "option": option }).to_string())
            .dispatch()
            .await
            .status()
    }

    #[backend_test]
    async fn list_filters_by_state(client: Client) {
        let first = publish(&client).await;
        publish(&client).await;
        client
            .post(format!("/votes/{}/cancel", first.id))
            .header(admin_auth())
            .dispatch()
            .await;

        let all: Vec<Vote> = client
            .get("/votes")
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let active: Vec<Vote> = client
            .get("/votes?state=active")
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_ne!(active[0].id, first.id);

        let response = client.get("/votes?state=expired").dispatch().await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test]
    async fn unknown_vote_is_not_found(client: Client) {
        let response = client.get(uri!(get_vote(404))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test]
    async fn quorum_tracks_live_ballots(client: Client, store: MemoryStore) {
        seed_members(&store, 4).await;
        let vote = publish(&client).await;
        assert_eq!(Status::Ok, cast(&client, vote.id, 1, "Yes").await);

        let status: Value = client
            .get(uri!(quorum_status(vote.id)))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(status["distinct_voters"], 1);
        assert_eq!(status["eligible_members"], 4);
        assert_eq!(status["meets_quorum"], false);

        assert_eq!(Status::Ok, cast(&client, vote.id, 2, "No").await);
        let status: Value = client
            .get(uri!(quorum_status(vote.id)))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(status["meets_quorum"], true);
    }

    #[backend_test]
    async fn result_is_conflict_until_closed(
        client: Client,
        store: MemoryStore,
        clock: ManualClock,
    ) {
        seed_members(&store, 3).await;
        let vote = publish(&client).await;
        cast(&client, vote.id, 1, "Yes").await;
        cast(&client, vote.id, 2, "Yes").await;

        let response = client.get(uri!(get_result(vote.id))).dispatch().await;
        assert_eq!(Status::Conflict, response.status());

        clock.advance(Duration::days(8));
        client
            .post(format!("/votes/{}/close", vote.id))
            .header(admin_auth())
            .dispatch()
            .await;

        let result: ClosedResult = client
            .get(uri!(get_result(vote.id)))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(
            result.outcome,
            Outcome::Winner {
                option: "Yes".to_string()
            }
        );
        assert_eq!(result.count_for("Yes"), Some(2));
    }

    #[backend_test]
    async fn dump_holds_every_ballot(client: Client, store: MemoryStore) {
        seed_members(&store, 2).await;
        let vote = publish(&client).await;
        cast(&client, vote.id, 1, "Yes").await;
        cast(&client, vote.id, 2, "No").await;

        let dump: VoteDump = client
            .get(uri!(dump_vote(vote.id)))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert_eq!(dump.vote.id, vote.id);
        let mut members: Vec<MemberId> = dump
            .ballots
            .iter()
            .map(|ballot: &Ballot| ballot.member_id)
            .collect();
        members.sort_unstable();
        assert_eq!(members, vec![1, 2]);
        assert_eq!(dump.verify(), Ok(()));
    }

    #[backend_test]
    async fn member_lookup(client: Client, store: MemoryStore) {
        seed_members(&store, 1).await;
        let member: Member = client
            .get(uri!(get_member(1)))
            .dispatch()
            .await
            .into_json()
            .await
            .unwrap();
        assert!(member.can_vote());

        let response = client.get(uri!(get_member(2))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }
}
