use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::api::{
    auth::{AnyUser, AuthToken},
    election::ElectionDescription,
};
use crate::service::VoteService;

pub fn routes() -> Vec<Route> {
    routes![list_elections, list_vote_elections]
}

#[get("/elections")]
async fn list_elections(
    _token: AuthToken<AnyUser>,
    service: &State<VoteService>,
) -> Result<Json<Vec<ElectionDescription>>> {
    Ok(Json(service.list_elections().await?))
}

/// The same listing, where the voting client looks for it.
#[get("/vote/elections")]
async fn list_vote_elections(
    _token: AuthToken<AnyUser>,
    service: &State<VoteService>,
) -> Result<Json<Vec<ElectionDescription>>> {
    Ok(Json(service.list_elections().await?))
}
