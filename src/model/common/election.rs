use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionState {
    /// Accepting votes.
    #[default]
    Open,
    /// No longer accepting votes; tallies are final unless reopened.
    Closed,
}

impl From<ElectionState> for Bson {
    fn from(state: ElectionState) -> Self {
        let name = match state {
            ElectionState::Open => "Open",
            ElectionState::Closed => "Closed",
        };
        Bson::String(name.to_string())
    }
}

/// A candidate standing in an election, with their running tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Candidate name, unique within the election.
    pub name: String,
    /// Number of accepted votes.
    #[serde(default)]
    pub votes: u64,
}

impl Candidate {
    /// A candidate with no votes yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            votes: 0,
        }
    }
}
