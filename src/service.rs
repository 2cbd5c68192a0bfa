use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        election::{ElectionDescription, ElectionResults, ElectionSpec},
        tally::TallyAudit,
        vote::VoteReceipt,
    },
    common::election::ElectionState,
    db::{election::Election, vote::NewVote},
    mongodb::Id,
};
use crate::store::VoteStore;

/// Election listing, vote casting and tallying over some [`VoteStore`].
///
/// This is managed state; routes reach it through `&State<VoteService>`.
#[derive(Clone)]
pub struct VoteService {
    store: Arc<dyn VoteStore>,
}

impl VoteService {
    pub fn new(store: impl VoteStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// All elections with their current tallies.
    pub async fn list_elections(&self) -> Result<Vec<ElectionDescription>> {
        let elections = self.store.elections().await?;
        Ok(elections.into_iter().map(Into::into).collect())
    }

    /// All elections with full tallies and totals. Always a list, possibly empty.
    pub async fn results(&self) -> Result<Vec<ElectionResults>> {
        let elections = self.store.elections().await?;
        Ok(elections.into_iter().map(Into::into).collect())
    }

    /// Cast `voter_id`'s single vote in an election.
    ///
    /// Failures are reported in a fixed order: unknown election, unknown
    /// candidate, election not accepting votes, and finally a vote already on
    /// record. The last is decided atomically by the store together with the
    /// tally increment.
    pub async fn cast_vote(
        &self,
        voter_id: &str,
        election_id: &str,
        candidate_name: &str,
    ) -> Result<VoteReceipt> {
        let result = self.try_cast_vote(voter_id, election_id, candidate_name).await;
        match &result {
            Ok(receipt) => info!(
                "Accepted vote by '{voter_id}' in election {election_id} (tally now {})",
                receipt.updated_vote_count
            ),
            Err(e) => warn!("Rejected vote by '{voter_id}' in election {election_id}: {e}"),
        }
        result
    }

    async fn try_cast_vote(
        &self,
        voter_id: &str,
        election_id: &str,
        candidate_name: &str,
    ) -> Result<VoteReceipt> {
        // An ID that can't be parsed can't name an election either.
        let id: Id = election_id
            .parse()
            .map_err(|_| Error::election_not_found(election_id))?;
        let election = self.election(id).await?;
        if election.candidate(candidate_name).is_none() {
            return Err(Error::invalid_candidate(id, candidate_name));
        }
        if !election.accepts_votes(Utc::now()) {
            return Err(Error::election_closed(id));
        }

        let updated_vote_count = self
            .store
            .record_vote(NewVote::new(voter_id, id, candidate_name))
            .await?;
        Ok(VoteReceipt {
            message: format!("Vote for '{candidate_name}' recorded"),
            updated_vote_count,
        })
    }

    async fn election(&self, id: Id) -> Result<Election> {
        self.store
            .election(id)
            .await?
            .ok_or_else(|| Error::election_not_found(id))
    }

    /// Create a new, open election with zeroed tallies.
    pub async fn create_election(&self, spec: ElectionSpec) -> Result<ElectionDescription> {
        let election = self.store.insert_election(spec.into_election()?).await?;
        info!("Created election {} '{}'", election.id, election.title);
        Ok(election.into())
    }

    /// Delete an election along with every vote cast in it.
    pub async fn delete_election(&self, id: Id) -> Result<()> {
        if !self.store.delete_election(id).await? {
            return Err(Error::election_not_found(id));
        }
        info!("Deleted election {id}");
        Ok(())
    }

    /// Open or close an election for voting.
    pub async fn set_state(&self, id: Id, state: ElectionState) -> Result<ElectionDescription> {
        if !self.store.set_state(id, state).await? {
            return Err(Error::election_not_found(id));
        }
        info!("Election {id} is now {state:?}");
        Ok(self.election(id).await?.into())
    }

    /// Compare an election's embedded counters with its vote records.
    pub async fn audit_tally(&self, id: Id) -> Result<TallyAudit> {
        let election = self.election(id).await?;
        let derived = self.store.derived_tally(id).await?;
        let audit = TallyAudit::compare(&election, derived);
        if !audit.consistent {
            warn!("Tally of election {id} disagrees with its vote records");
        }
        Ok(audit)
    }
}
