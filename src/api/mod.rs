use rocket::{http::Status, response::status, serde::json::Json, Catcher, Request, Route};

use crate::error::{ErrorBody, ErrorKind};
use crate::model::api::auth::AuthFailure;

mod admin;
mod elections;
mod vote;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(elections::routes());
    routes.extend(vote::routes());
    routes.extend(admin::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![unauthorized, default_catcher]
}

/// A request guard refused the bearer token.
#[catch(401)]
fn unauthorized(req: &Request) -> status::Custom<Json<ErrorBody>> {
    let message = req
        .local_cache(AuthFailure::default)
        .0
        .clone()
        .unwrap_or_else(|| "Authentication required".to_string());
    ErrorBody::new(ErrorKind::Unauthorized, message).into_response()
}

/// Every other status that reached no handler, e.g. an unknown route or a malformed body.
#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> status::Custom<Json<ErrorBody>> {
    let body = ErrorBody::new(
        ErrorKind::from_status(status),
        status.reason().unwrap_or("Unknown error"),
    );
    status::Custom(status, Json(body))
}


#[cfg(test)]
mod tests {
    use rocket::http::{Header, Status};

    use super::testing::{json, voter};
    use super::*;
    use crate::memory_client;

    #[rocket::async_test]
    async fn missing_token_is_401_json() {
        let client = memory_client().await;
        let response = client.get("/api/elections").dispatch().await;
        let body: ErrorBody = json(response, Status::Unauthorized).await;
        assert_eq!(body.error, ErrorKind::Unauthorized);
        assert!(body.message.contains("missing"));
    }

    #[rocket::async_test]
    async fn garbage_token_is_401_json() {
        let client = memory_client().await;
        let response = client
            .get("/api/vote/results")
            .header(Header::new("Authorization", "Bearer not.a.jwt"))
            .dispatch()
            .await;
        let body: ErrorBody = json(response, Status::Unauthorized).await;
        assert_eq!(body.error, ErrorKind::Unauthorized);
    }

    #[rocket::async_test]
    async fn unknown_routes_are_404_json() {
        let client = memory_client().await;
        let response = client.get("/api/nowhere").header(voter("v1")).dispatch().await;
        let body: ErrorBody = json(response, Status::NotFound).await;
        assert_eq!(body.error, ErrorKind::NotFound);
    }
}
