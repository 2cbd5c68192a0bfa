use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        auth::{Admin, AuthToken},
        election::{ElectionDescription, ElectionSpec},
        tally::TallyAudit,
    },
    common::election::ElectionState,
    mongodb::Id,
};
use crate::service::VoteService;

pub fn routes() -> Vec<Route> {
    routes![
        create_election,
        delete_election,
        close_election,
        open_election,
        audit_election,
    ]
}

#[post("/admin/elections", data = "<spec>", format = "json")]
async fn create_election(
    _token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    service: &State<VoteService>,
) -> Result<Json<ElectionDescription>> {
    Ok(Json(service.create_election(spec.into_inner()).await?))
}

#[delete("/admin/elections/<election_id>")]
async fn delete_election(
    _token: AuthToken<Admin>,
    election_id: Id,
    service: &State<VoteService>,
) -> Result<()> {
    service.delete_election(election_id).await
}

#[post("/admin/elections/<election_id>/close")]
async fn close_election(
    _token: AuthToken<Admin>,
    election_id: Id,
    service: &State<VoteService>,
) -> Result<Json<ElectionDescription>> {
    let election = service
        .set_state(election_id, ElectionState::Closed)
        .await?;
    Ok(Json(election))
}

#[post("/admin/elections/<election_id>/open")]
async fn open_election(
    _token: AuthToken<Admin>,
    election_id: Id,
    service: &State<VoteService>,
) -> Result<Json<ElectionDescription>> {
    let election = service.set_state(election_id, ElectionState::Open).await?;
    Ok(Json(election))
}

/// Check the embedded tallies against the vote records.
#[get("/admin/elections/<election_id>/audit")]
async fn audit_election(
    _token: AuthToken<Admin>,
    election_id: Id,
    service: &State<VoteService>,
) -> Result<Json<TallyAudit>> {
    Ok(Json(service.audit_tally(election_id).await?))
}
