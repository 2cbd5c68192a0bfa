use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{Candidate, ElectionState},
    mongodb::{serde_optional_datetime, Id},
};

/// Core election data, as stored in the database.
///
/// Candidate tallies are embedded here and only ever change through the
/// vote store's atomic increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Election title.
    pub title: String,
    /// Election state.
    #[serde(default)]
    pub state: ElectionState,
    /// Optional deadline after which votes are refused.
    #[serde(
        default,
        with = "serde_optional_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub closes_at: Option<DateTime<Utc>>,
    /// Candidates in ballot order.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl ElectionCore {
    /// Look up a candidate by exact name.
    pub fn candidate(&self, name: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.name == name)
    }

    pub fn candidate_mut(&mut self, name: &str) -> Option<&mut Candidate> {
        self.candidates.iter_mut().find(|c| c.name == name)
    }

    /// Is the election accepting votes at the given instant?
    pub fn accepts_votes(&self, now: DateTime<Utc>) -> bool {
        self.state == ElectionState::Open && self.closes_at.map_or(true, |deadline| now < deadline)
    }

    /// Sum of all candidate tallies.
    pub fn total_votes(&self) -> u64 {
        self.candidates.iter().map(|c| c.votes).sum()
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}


#[cfg(test)]
mod tests {
    use chrono::Duration;
    use mongodb::bson::{doc, from_document, to_document};

    use super::*;

    #[test]
    fn deadline_closes_voting() {
        let now = Utc::now();
        let mut election = NewElection::example();
        assert!(election.accepts_votes(now));

        election.closes_at = Some(now - Duration::minutes(1));
        assert!(!election.accepts_votes(now));

        election.closes_at = Some(now + Duration::minutes(1));
        assert!(election.accepts_votes(now));

        election.state = ElectionState::Closed;
        assert!(!election.accepts_votes(now));
    }

    #[test]
    fn candidate_lookup_is_exact() {
        let election = NewElection::example();
        assert!(election.candidate("A").is_some());
        assert!(election.candidate("a").is_none());
        assert!(election.candidate("Z").is_none());
    }

    #[test]
    fn bson_round_trip_keeps_deadline() {
        let mut election = Election {
            id: Id::new(),
            election: NewElection::example(),
        };
        // BSON datetimes only carry millisecond precision.
        let deadline = mongodb::bson::DateTime::now().to_chrono();
        election.closes_at = Some(deadline);

        let document = to_document(&election).unwrap();
        assert!(document.get_datetime("closes_at").is_ok());
        let read: Election = from_document(document).unwrap();
        assert_eq!(read, election);
    }

    #[test]
    fn sparse_documents_fill_defaults() {
        let id = Id::new();
        let document = doc! {
            "_id": id,
            "title": "Legacy",
            "candidates": [{ "name": "A" }, { "name": "B", "votes": 3 }],
        };
        let election: Election = from_document(document).unwrap();
        assert_eq!(election.state, ElectionState::Open);
        assert_eq!(election.closes_at, None);
        assert_eq!(election.candidate("A").unwrap().votes, 0);
        assert_eq!(election.total_votes(), 3);
    }
}
