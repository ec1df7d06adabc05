use std::sync::Arc;

use rocket::{serde::json::Json, Route, State};

use crate::{
    engine::{clock::Clock, CloseOutcome, Scheduler, TickReport, VotingEngine},
    error::Result,
    model::{
        auth::{Admin, AuthToken},
        Member, MemberId, Vote, VoteId, VoteSpec,
    },
    registry::MemberRegistry,
};

pub fn routes() -> Vec<Route> {
    routes![
        approve_member,
        reject_member,
        deactivate_member,
        reactivate_member,
        create_draft,
        publish_new,
        publish_draft,
        cancel_vote,
        close_vote,
        purge_vote,
        run_scheduler,
    ]
}

#[post("/members/<member_id>/approve")]
async fn approve_member(
    token: AuthToken<Admin>,
    member_id: MemberId,
    registry: &State<MemberRegistry>,
    clock: &State<Arc<dyn Clock>>,
) -> Result<Json<Member>> {
    info!("Admin {} approving member {member_id}", token.member_id());
    Ok(Json(registry.approve(member_id, clock.now()).await?))
}

#[post("/members/<member_id>/reject")]
async fn reject_member(
    token: AuthToken<Admin>,
    member_id: MemberId,
    registry: &State<MemberRegistry>,
    clock: &State<Arc<dyn Clock>>,
) -> Result<Json<Member>> {
    info!("Admin {} rejecting member {member_id}", token.member_id());
    Ok(Json(registry.reject(member_id, clock.now()).await?))
}

#[post("/members/<member_id>/deactivate")]
async fn deactivate_member(
    _token: AuthToken<Admin>,
    member_id: MemberId,
    registry: &State<MemberRegistry>,
) -> Result<Json<Member>> {
    Ok(Json(registry.deactivate(member_id).await?))
}

#[post("/members/<member_id>/reactivate")]
async fn reactivate_member(
    _token: AuthToken<Admin>,
    member_id: MemberId,
    registry: &State<MemberRegistry>,
) -> Result<Json<Member>> {
    Ok(Json(registry.reactivate(member_id).await?))
}

#[post("/votes", data = "<spec>", format = "json")]
async fn create_draft(
    _token: AuthToken<Admin>,
    spec: Json<VoteSpec>,
    engine: &State<Arc<VotingEngine>>,
    clock: &State<Arc<dyn Clock>>,
) -> Result<Json<Vote>> {
    Ok(Json(engine.create_draft(spec.0, clock.now()).await?))
}

#[post("/votes/publish", data = "<spec>", format = "json")]
async fn publish_new(
    token: AuthToken<Admin>,
    spec: Json<VoteSpec>,
    engine: &State<Arc<VotingEngine>>,
    clock: &State<Arc<dyn Clock>>,
) -> Result<Json<Vote>> {
    let vote = engine.publish(spec.0, clock.now()).await?;
    info!("Admin {} published vote {}", token.member_id(), vote.id);
    Ok(Json(vote))
}

#[post("/votes/<vote_id>/publish")]
async fn publish_draft(
    token: AuthToken<Admin>,
    vote_id: VoteId,
    engine: &State<Arc<VotingEngine>>,
    clock: &State<Arc<dyn Clock>>,
) -> Result<Json<Vote>> {
    let vote = engine.publish_draft(vote_id, clock.now()).await?;
    info!("Admin {} published draft {vote_id}", token.member_id());
    Ok(Json(vote))
}

#[post("/votes/<vote_id>/cancel")]
async fn cancel_vote(
    token: AuthToken<Admin>,
    vote_id: VoteId,
    engine: &State<Arc<VotingEngine>>,
    clock: &State<Arc<dyn Clock>>,
) -> Result<Json<Vote>> {
    info!("Admin {} cancelling vote {vote_id}", token.member_id());
    Ok(Json(engine.cancel(vote_id, clock.now()).await?))
}

/// Close a vote whose deadline has passed, or any active vote with `force`.
#[post("/votes/<vote_id>/close?<force>")]
async fn close_vote(
    token: AuthToken<Admin>,
    vote_id: VoteId,
    force: Option<bool>,
    engine: &State<Arc<VotingEngine>>,
    clock: &State<Arc<dyn Clock>>,
) -> Result<Json<CloseOutcome>> {
    let now = clock.now();
    let outcome = if force.unwrap_or(false) {
        info!("Admin {} force-closing vote {vote_id}", token.member_id());
        engine.force_close(vote_id, now).await?
    } else {
        engine.close_if_due(vote_id, now).await?
    };
    Ok(Json(outcome))
}

#[delete("/votes/<vote_id>")]
async fn purge_vote(
    token: AuthToken<Admin>,
    vote_id: VoteId,
    engine: &State<Arc<VotingEngine>>,
) -> Result<()> {
    engine.purge(vote_id).await?;
    info!("Admin {} purged vote {vote_id}", token.member_id());
    Ok(())
}

/// Run a scheduler pass now instead of waiting for the next tick.
#[post("/scheduler/run")]
async fn run_scheduler(
    _token: AuthToken<Admin>,
    scheduler: &State<Arc<Scheduler>>,
    clock: &State<Arc<dyn Clock>>,
) -> Result<Json<TickReport>> {
    Ok(Json(scheduler.run_once(clock.now()).await?))
}
