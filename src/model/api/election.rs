use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::election::{Candidate, ElectionState},
    db::election::{Election, NewElection},
};

/// An administrator's request to create an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionSpec {
    /// Election title.
    pub title: String,
    /// Candidate names, in ballot order.
    pub candidates: Vec<String>,
    /// Optional voting deadline.
    #[serde(default)]
    pub closes_at: Option<DateTime<Utc>>,
}

impl ElectionSpec {
    /// Validate this spec and turn it into a fresh, open election with zeroed tallies.
    ///
    /// Names are trimmed; the title and every candidate name must be non-empty,
    /// and candidate names must be unique within the election.
    pub fn into_election(self) -> Result<NewElection> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(Error::BadRequest("Election title is empty".to_string()));
        }
        if self.candidates.is_empty() {
            return Err(Error::BadRequest(format!(
                "Election '{title}' has no candidates"
            )));
        }

        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(self.candidates.len());
        for name in &self.candidates {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::BadRequest("Candidate name is empty".to_string()));
            }
            if !seen.insert(name) {
                return Err(Error::BadRequest(format!(
                    "Candidate '{name}' appears more than once"
                )));
            }
            candidates.push(Candidate::new(name));
        }

        Ok(NewElection {
            title: title.to_string(),
            state: ElectionState::Open,
            closes_at: self.closes_at,
            candidates,
        })
    }
}

/// An API-friendly election description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionDescription {
    /// Election unique ID, as a hex string.
    pub id: String,
    pub title: String,
    pub state: ElectionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closes_at: Option<DateTime<Utc>>,
    /// Candidates with their current tallies.
    pub candidates: Vec<Candidate>,
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        Self {
            id: election.id.to_string(),
            title: election.election.title,
            state: election.election.state,
            closes_at: election.election.closes_at,
            candidates: election.election.candidates,
        }
    }
}

/// An election's full tally, as shown on the results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResults {
    #[serde(flatten)]
    pub election: ElectionDescription,
    /// Sum of all candidates' votes.
    pub total_votes: u64,
}

impl From<Election> for ElectionResults {
    fn from(election: Election) -> Self {
        let total_votes = election.total_votes();
        Self {
            election: election.into(),
            total_votes,
        }
    }
}

#[cfg(test)]
mod examples {
    use super::*;

    impl ElectionSpec {
        pub fn example() -> Self {
            Self {
                title: "e1".to_string(),
                candidates: vec!["A".to_string(), "B".to_string()],
                closes_at: None,
            }
        }
    }
}
