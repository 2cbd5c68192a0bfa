use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::db::election::Election;

/// Stored tally of one candidate next to the tally derived from vote records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAudit {
    pub name: String,
    /// Counter embedded in the election.
    pub recorded: u64,
    /// Number of vote records naming this candidate.
    pub derived: u64,
}

/// Result of checking an election's counters against its vote records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyAudit {
    pub election_id: String,
    pub candidates: Vec<CandidateAudit>,
    /// Vote records referencing the election, including any naming unknown candidates.
    pub vote_records: u64,
    /// True iff every counter matches and no record names an unknown candidate.
    pub consistent: bool,
}

impl TallyAudit {
    /// Compare an election's counters with per-candidate vote record counts.
    pub fn compare(election: &Election, mut derived: HashMap<String, u64>) -> Self {
        let vote_records = derived.values().sum();
        let candidates: Vec<_> = election
            .candidates
            .iter()
            .map(|c| CandidateAudit {
                name: c.name.clone(),
                recorded: c.votes,
                derived: derived.remove(&c.name).unwrap_or(0),
            })
            .collect();
        // Anything left over names a candidate the election doesn't have.
        let consistent = derived.is_empty() && candidates.iter().all(|c| c.recorded == c.derived);

        Self {
            election_id: election.id.to_string(),
            candidates,
            vote_records,
            consistent,
        }
    }
}
