use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::api::{
    auth::{AnyUser, AuthToken, Voter},
    election::ElectionResults,
    vote::{VoteReceipt, VoteRequest},
};
use crate::service::VoteService;

pub fn routes() -> Vec<Route> {
    routes![cast_vote, results]
}

#[post("/vote/cast", data = "<vote>")]
async fn cast_vote(
    token: AuthToken<Voter>,
    vote: Json<VoteRequest>,
    service: &State<VoteService>,
) -> Result<Json<VoteReceipt>> {
    let receipt = service
        .cast_vote(token.id(), &vote.election_id, &vote.candidate_name)
        .await?;
    Ok(Json(receipt))
}

/// Full tallies of every election. Always an array.
#[get("/vote/results")]
async fn results(
    _token: AuthToken<AnyUser>,
    service: &State<VoteService>,
) -> Result<Json<Vec<ElectionResults>>> {
    Ok(Json(service.results().await?))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::Status,
        local::asynchronous::{Client, LocalResponse},
        serde::json::{json as json_value, Value},
    };

    use super::*;
    use crate::api::testing::{admin, election, json, voter};
    use crate::error::{ErrorBody, ErrorKind};
    use crate::memory_client;

    async fn cast<'c>(
        client: &'c Client,
        voter_id: &str,
        election_id: &str,
        candidate: &str,
    ) -> LocalResponse<'c> {
        client
            .post("/api/vote/cast")
            .header(voter(voter_id))
            .json(&VoteRequest::example(election_id, candidate))
            .dispatch()
            .await
    }

    async fn rejection(response: LocalResponse<'_>, status: Status) -> ErrorKind {
        json::<ErrorBody>(response, status).await.error
    }

    /// `(A, B)` votes of the only election.
    async fn tallies(client: &Client) -> (u64, u64) {
        let response = client.get("/api/vote/results").header(voter("v0")).dispatch().await;
        let results: Vec<ElectionResults> = json(response, Status::Ok).await;
        let votes = |name: &str| {
            results[0]
                .election
                .candidates
                .iter()
                .find(|c| c.name == name)
                .unwrap()
                .votes
        };
        (votes("A"), votes("B"))
    }

    #[rocket::async_test]
    async fn second_vote_is_rejected_as_duplicate() {
        let client = memory_client().await;
        let e1 = election(&client).await;

        let receipt: VoteReceipt = json(cast(&client, "v1", &e1, "A").await, Status::Ok).await;
        assert_eq!(receipt.updated_vote_count, 1);
        assert_eq!(tallies(&client).await, (1, 0));

        let kind = rejection(cast(&client, "v1", &e1, "B").await, Status::BadRequest).await;
        assert_eq!(kind, ErrorKind::DuplicateVote);
        assert_eq!(tallies(&client).await, (1, 0));

        let receipt: VoteReceipt = json(cast(&client, "v2", &e1, "B").await, Status::Ok).await;
        assert_eq!(receipt.updated_vote_count, 1);
        assert_eq!(tallies(&client).await, (1, 1));
    }

    #[rocket::async_test]
    async fn unknown_candidate_is_invalid() {
        let client = memory_client().await;
        let e1 = election(&client).await;

        let kind = rejection(cast(&client, "v3", &e1, "Z").await, Status::BadRequest).await;
        assert_eq!(kind, ErrorKind::InvalidCandidate);
        assert_eq!(tallies(&client).await, (0, 0));
    }

    #[rocket::async_test]
    async fn unknown_election_is_not_found() {
        let client = memory_client().await;
        election(&client).await;

        let kind = rejection(cast(&client, "v4", "unknown-id", "A").await, Status::NotFound).await;
        assert_eq!(kind, ErrorKind::NotFound);
        assert_eq!(tallies(&client).await, (0, 0));
    }

    #[rocket::async_test]
    async fn concurrent_casts_accept_exactly_once() {
        let client = memory_client().await;
        let e1 = election(&client).await;

        let (first, second) = rocket::tokio::join!(
            cast(&client, "v1", &e1, "A"),
            cast(&client, "v1", &e1, "B"),
        );
        let mut statuses = [first.status(), second.status()];
        statuses.sort_by_key(|s| s.code);
        assert_eq!(statuses, [Status::Ok, Status::BadRequest]);

        let (a, b) = tallies(&client).await;
        assert_eq!(a + b, 1);
    }

    #[rocket::async_test]
    async fn admins_cannot_vote() {
        let client = memory_client().await;
        let e1 = election(&client).await;

        let response = client
            .post("/api/vote/cast")
            .header(admin())
            .json(&VoteRequest::example(&e1, "A"))
            .dispatch()
            .await;
        let kind = rejection(response, Status::Unauthorized).await;
        assert_eq!(kind, ErrorKind::Unauthorized);
        assert_eq!(tallies(&client).await, (0, 0));
    }

    #[rocket::async_test]
    async fn closed_election_is_conflict() {
        let client = memory_client().await;
        let e1 = election(&client).await;
        let uri = format!("/api/admin/elections/{e1}/close");
        let close = client
            .post(uri.as_str())
            .header(admin())
            .dispatch()
            .await;
        assert_eq!(close.status(), Status::Ok);

        let kind = rejection(cast(&client, "v1", &e1, "A").await, Status::Conflict).await;
        assert_eq!(kind, ErrorKind::ElectionClosed);
    }

    #[rocket::async_test]
    async fn results_are_always_an_array() {
        let client = memory_client().await;
        let response = client.get("/api/vote/results").header(admin()).dispatch().await;
        let body: Value = json(response, Status::Ok).await;
        assert_eq!(body, json_value!([]));

        let e1 = election(&client).await;
        cast(&client, "v1", &e1, "A").await;
        let response = client.get("/api/vote/results").header(voter("v1")).dispatch().await;
        let body: Value = json(response, Status::Ok).await;
        assert_eq!(body[0]["id"], e1.as_str());
        assert_eq!(body[0]["totalVotes"], 1);
        assert_eq!(body[0]["candidates"][0], json_value!({"name": "A", "votes": 1}));
    }
}
