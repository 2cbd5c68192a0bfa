use serde::{Deserialize, Serialize};

/// A voter's choice, as posted by the voting client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub election_id: String,
    pub candidate_name: String,
}

/// Acknowledgement of an accepted vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub message: String,
    /// The chosen candidate's tally including this vote.
    pub updated_vote_count: u64,
}

#[cfg(test)]
mod examples {
    use super::*;

    impl VoteRequest {
        pub fn example(election_id: impl ToString, candidate_name: &str) -> Self {
            Self {
                election_id: election_id.to_string(),
                candidate_name: candidate_name.to_string(),
            }
        }
    }
}
