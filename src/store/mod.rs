//! The election store: where elections, their tallies and vote records live.

use std::collections::HashMap;

use crate::error::Result;
use crate::model::{
    common::election::ElectionState,
    db::{
        election::{Election, NewElection},
        vote::NewVote,
    },
    mongodb::Id,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Persistence for elections and vote records.
///
/// Implementations must make [`VoteStore::record_vote`] atomic: the vote
/// record and the tally increment are applied together or not at all, and at
/// most one record ever exists per `(voter_id, election_id)`.
#[rocket::async_trait]
pub trait VoteStore: Send + Sync {
    /// Every readable election, in creation order. Unreadable entries are skipped.
    async fn elections(&self) -> Result<Vec<Election>>;

    async fn election(&self, id: Id) -> Result<Option<Election>>;

    async fn insert_election(&self, election: NewElection) -> Result<Election>;

    /// Delete an election together with its vote records.
    /// Returns false if there was no such election.
    async fn delete_election(&self, id: Id) -> Result<bool>;

    /// Returns false if there was no such election.
    async fn set_state(&self, id: Id, state: ElectionState) -> Result<bool>;

    /// Atomically store the vote record and increment the chosen candidate's
    /// tally, returning the new tally.
    ///
    /// Fails with `DuplicateVote` if the voter already has a record for the
    /// election, and with `NotFound`, `ElectionClosed` or `InvalidCandidate`
    /// if the election cannot take the vote at the moment it is applied.
    async fn record_vote(&self, vote: NewVote) -> Result<u64>;

    /// Count vote records per candidate name for one election.
    async fn derived_tally(&self, id: Id) -> Result<HashMap<String, u64>>;
}
