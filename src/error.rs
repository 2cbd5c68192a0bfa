use std::fmt::Display;

use jsonwebtoken::errors::Error as JwtError;
use log::{debug, error, warn};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, status, Responder},
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::mongodb::is_transient_error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid candidate: {0}")]
    InvalidCandidate(String),
    #[error("Duplicate vote: {0}")]
    DuplicateVote(String),
    #[error("Election closed: {0}")]
    ElectionClosed(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(what: impl Display) -> Self {
        Self::NotFound(format!("{what} does not exist"))
    }

    pub fn election_not_found(election_id: impl Display) -> Self {
        Self::not_found(format!("Election '{election_id}'"))
    }

    pub fn invalid_candidate(election_id: impl Display, candidate: &str) -> Self {
        Self::InvalidCandidate(format!(
            "'{candidate}' is not a candidate in election '{election_id}'"
        ))
    }

    pub fn duplicate_vote(voter_id: &str, election_id: impl Display) -> Self {
        Self::DuplicateVote(format!(
            "Voter '{voter_id}' has already voted in election '{election_id}'"
        ))
    }

    pub fn election_closed(election_id: impl Display) -> Self {
        Self::ElectionClosed(format!(
            "Election '{election_id}' is not accepting votes"
        ))
    }

    /// The caller-facing classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Db(err) if is_transient_error(err) => ErrorKind::TransientStoreFailure,
            Self::Db(_) | Self::Internal(_) => ErrorKind::Internal,
            Self::Jwt(_) | Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidCandidate(_) => ErrorKind::InvalidCandidate,
            Self::DuplicateVote(_) => ErrorKind::DuplicateVote,
            Self::ElectionClosed(_) => ErrorKind::ElectionClosed,
            Self::BadRequest(_) => ErrorKind::BadRequest,
        }
    }

    /// Can the caller expect a different outcome by repeating the same request?
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientStoreFailure
    }
}

/// Every distinct failure a client may need to render.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    InvalidCandidate,
    DuplicateVote,
    ElectionClosed,
    BadRequest,
    TransientStoreFailure,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> Status {
        match self {
            Self::Unauthorized => Status::Unauthorized,
            Self::NotFound => Status::NotFound,
            Self::InvalidCandidate | Self::DuplicateVote | Self::BadRequest => Status::BadRequest,
            Self::ElectionClosed => Status::Conflict,
            Self::TransientStoreFailure => Status::ServiceUnavailable,
            Self::Internal => Status::InternalServerError,
        }
    }

    /// Best-effort classification of a bare HTTP status, for catchers.
    pub fn from_status(status: Status) -> Self {
        match status.code {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound,
            503 => Self::TransientStoreFailure,
            400..=499 => Self::BadRequest,
            _ => Self::Internal,
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }

    /// Pair the body with its status code, ready to respond.
    pub fn into_response(self) -> status::Custom<Json<Self>> {
        status::Custom(self.error.status(), Json(self))
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let kind = self.kind();
        let message = match kind {
            ErrorKind::Internal => {
                error!("{self}");
                "Internal server error".to_string()
            }
            ErrorKind::TransientStoreFailure => {
                warn!("{self}");
                "Vote store temporarily unavailable, please retry".to_string()
            }
            _ => {
                debug!("{self}");
                self.to_string()
            }
        };
        ErrorBody::new(kind, message).into_response().respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_rejections_map_to_distinct_statuses() {
        let cases = [
            (Error::not_found("Election 1"), ErrorKind::NotFound, 404),
            (
                Error::InvalidCandidate("Z".to_string()),
                ErrorKind::InvalidCandidate,
                400,
            ),
            (
                Error::DuplicateVote("v1".to_string()),
                ErrorKind::DuplicateVote,
                400,
            ),
            (
                Error::ElectionClosed("e1".to_string()),
                ErrorKind::ElectionClosed,
                409,
            ),
            (
                Error::Unauthorized("no token".to_string()),
                ErrorKind::Unauthorized,
                401,
            ),
        ];
        for (err, kind, code) in cases {
            assert_eq!(err.kind(), kind);
            assert_eq!(err.kind().status().code, code);
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn only_transient_store_failures_are_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err = Error::from(DbError::from(io));
        assert_eq!(err.kind(), ErrorKind::TransientStoreFailure);
        assert_eq!(err.kind().status(), Status::ServiceUnavailable);
        assert!(err.is_retryable());

        assert!(!Error::Internal("broken".to_string()).is_retryable());
    }

    #[test]
    fn catcher_statuses_classify() {
        assert_eq!(
            ErrorKind::from_status(Status::UnprocessableEntity),
            ErrorKind::BadRequest
        );
        assert_eq!(ErrorKind::from_status(Status::NotFound), ErrorKind::NotFound);
        assert_eq!(
            ErrorKind::from_status(Status::InternalServerError),
            ErrorKind::Internal
        );
    }
}
