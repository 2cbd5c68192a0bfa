use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Durable proof that a voter voted in an election.
///
/// At most one exists per `(voter_id, election_id)`; records are never
/// modified once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    /// Identity of the voter, as asserted by their bearer token.
    pub voter_id: String,
    /// Election voted in.
    pub election_id: Id,
    /// Candidate voted for.
    pub candidate_name: String,
    /// When the vote was accepted.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

impl VoteCore {
    /// A vote cast right now.
    pub fn new(
        voter_id: impl Into<String>,
        election_id: Id,
        candidate_name: impl Into<String>,
    ) -> Self {
        Self {
            voter_id: voter_id.into(),
            election_id,
            candidate_name: candidate_name.into(),
            cast_at: Utc::now(),
        }
    }
}

/// A vote record without an ID.
pub type NewVote = VoteCore;

/// A vote record from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}
