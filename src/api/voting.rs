use std::sync::Arc;

use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::{
    engine::{clock::Clock, VotingEngine},
    error::Result,
    model::{
        auth::{AuthToken, Voter},
        Ballot, Member, OptionId, Registration, VoteId,
    },
    registry::MemberRegistry,
};

pub fn routes() -> Vec<Route> {
    routes![register, cast_ballot]
}

/// Register the token holder as a member, pending admin review.
#[post("/members", data = "<registration>", format = "json")]
async fn register(
    token: AuthToken<Voter>,
    registration: Json<Registration>,
    registry: &State<MemberRegistry>,
    clock: &State<Arc<dyn Clock>>,
) -> Result<Json<Member>> {
    let member = registry
        .register(token.member_id(), registration.0, clock.now())
        .await?;
    Ok(Json(member))
}

/// The option a member picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotRequest {
    pub option: OptionId,
}

/// Cast or change the token holder's ballot.
#[post("/votes/<vote_id>/ballot", data = "<request>", format = "json")]
async fn cast_ballot(
    token: AuthToken<Voter>,
    vote_id: VoteId,
    request: Json<BallotRequest>,
    engine: &State<Arc<VotingEngine>>,
    clock: &State<Arc<dyn Clock>>,
) -> Result<Json<Ballot>> {
    let ballot = engine
        .cast_ballot(vote_id, token.member_id(), &request.option, clock.now())
        .await?;
    Ok(Json(ballot))
}
