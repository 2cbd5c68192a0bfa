use std::collections::HashMap;

use chrono::Utc;
use rocket::tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::{
    common::election::ElectionState,
    db::{
        election::{Election, NewElection},
        vote::{NewVote, Vote},
    },
    mongodb::Id,
};

use super::VoteStore;

/// A process-local store. One lock guards elections and vote records
/// together, so every operation is trivially atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    elections: Vec<Election>,
    votes: HashMap<(String, Id), Vote>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn election_mut(&mut self, id: Id) -> Option<&mut Election> {
        self.elections.iter_mut().find(|e| e.id == id)
    }
}

#[rocket::async_trait]
impl VoteStore for MemoryStore {
    async fn elections(&self) -> Result<Vec<Election>> {
        Ok(self.inner.lock().await.elections.clone())
    }

    async fn election(&self, id: Id) -> Result<Option<Election>> {
        let inner = self.inner.lock().await;
        Ok(inner.elections.iter().find(|e| e.id == id).cloned())
    }

    async fn insert_election(&self, election: NewElection) -> Result<Election> {
        let election = Election {
            id: Id::new(),
            election,
        };
        self.inner.lock().await.elections.push(election.clone());
        Ok(election)
    }

    async fn delete_election(&self, id: Id) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let before = inner.elections.len();
        inner.elections.retain(|e| e.id != id);
        if inner.elections.len() == before {
            return Ok(false);
        }
        inner.votes.retain(|(_, election_id), _| *election_id != id);
        Ok(true)
    }

    async fn set_state(&self, id: Id, state: ElectionState) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(match inner.election_mut(id) {
            Some(election) => {
                election.state = state;
                true
            }
            None => false,
        })
    }

    async fn record_vote(&self, vote: NewVote) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let Inner { elections, votes } = &mut *inner;
        let key = (vote.voter_id.clone(), vote.election_id);

        let election = elections
            .iter_mut()
            .find(|e| e.id == vote.election_id)
            .ok_or_else(|| Error::election_not_found(vote.election_id))?;
        let accepting = election.accepts_votes(Utc::now());
        let candidate = election
            .candidate_mut(&vote.candidate_name)
            .ok_or_else(|| Error::invalid_candidate(vote.election_id, &vote.candidate_name))?;
        if !accepting {
            return Err(Error::election_closed(vote.election_id));
        }
        // Checked last but before any mutation, under the same lock.
        if votes.contains_key(&key) {
            return Err(Error::duplicate_vote(&vote.voter_id, vote.election_id));
        }

        candidate.votes += 1;
        let updated = candidate.votes;
        votes.insert(key, Vote { id: Id::new(), vote });
        Ok(updated)
    }

    async fn derived_tally(&self, id: Id) -> Result<HashMap<String, u64>> {
        let inner = self.inner.lock().await;
        let mut tally = HashMap::new();
        for vote in inner.votes.values().filter(|v| v.election_id == id) {
            *tally.entry(vote.candidate_name.clone()).or_insert(0) += 1;
        }
        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rocket::tokio;

    use super::*;

    async fn store_with_election() -> (MemoryStore, Id) {
        let store = MemoryStore::new();
        let election = store.insert_election(NewElection::example()).await.unwrap();
        (store, election.id)
    }

    #[rocket::async_test]
    async fn vote_increments_exactly_one_candidate() {
        let (store, id) = store_with_election().await;
        assert_eq!(store.record_vote(NewVote::new("v1", id, "A")).await.unwrap(), 1);
        assert_eq!(store.record_vote(NewVote::new("v2", id, "A")).await.unwrap(), 2);

        let election = store.election(id).await.unwrap().unwrap();
        assert_eq!(election.candidate("A").unwrap().votes, 2);
        assert_eq!(election.candidate("B").unwrap().votes, 0);
    }

    #[rocket::async_test]
    async fn second_vote_changes_nothing() {
        let (store, id) = store_with_election().await;
        store.record_vote(NewVote::new("v1", id, "A")).await.unwrap();

        let err = store.record_vote(NewVote::new("v1", id, "B")).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateVote(_)));

        let election = store.election(id).await.unwrap().unwrap();
        assert_eq!(election.total_votes(), 1);
        assert_eq!(store.derived_tally(id).await.unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn rejections_follow_check_order() {
        let (store, id) = store_with_election().await;
        store.record_vote(NewVote::new("v1", id, "A")).await.unwrap();
        store.set_state(id, ElectionState::Closed).await.unwrap();

        // Unknown candidate is reported before the closed state or the duplicate.
        let err = store.record_vote(NewVote::new("v1", id, "Z")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCandidate(_)));
        // Closed is reported before the duplicate.
        let err = store.record_vote(NewVote::new("v1", id, "B")).await.unwrap_err();
        assert!(matches!(err, Error::ElectionClosed(_)));

        let err = store.record_vote(NewVote::new("v1", Id::new(), "A")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn concurrent_votes_by_one_voter_accept_exactly_once() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (store, id) = store_with_election().await;
            let store = Arc::new(store);

            let attempts = (0..32)
                .map(|i| {
                    let store = store.clone();
                    let candidate = if i % 2 == 0 { "A" } else { "B" };
                    tokio::spawn(async move {
                        store.record_vote(NewVote::new("v1", id, candidate)).await
                    })
                })
                .collect::<Vec<_>>();

            let mut accepted = 0;
            for attempt in attempts {
                match attempt.await.unwrap() {
                    Ok(_) => accepted += 1,
                    Err(err) => assert!(matches!(err, Error::DuplicateVote(_))),
                }
            }
            assert_eq!(accepted, 1);

            let election = store.election(id).await.unwrap().unwrap();
            assert_eq!(election.total_votes(), 1);
            let derived: u64 = store.derived_tally(id).await.unwrap().values().sum();
            assert_eq!(derived, 1);
        });
    }

    #[rocket::async_test]
    async fn deadline_is_rechecked_when_recording() {
        let store = MemoryStore::new();
        let election = NewElection {
            closes_at: Some(Utc::now() - chrono::Duration::seconds(1)),
            ..NewElection::example()
        };
        let id = store.insert_election(election).await.unwrap().id;

        let err = store.record_vote(NewVote::new("v1", id, "A")).await.unwrap_err();
        assert!(matches!(err, Error::ElectionClosed(_)));
        assert!(store.derived_tally(id).await.unwrap().is_empty());
        assert_eq!(store.election(id).await.unwrap().unwrap().total_votes(), 0);
    }

    #[rocket::async_test]
    async fn deleting_an_election_drops_its_records() {
        let (store, id) = store_with_election().await;
        let other = store.insert_election(NewElection::example()).await.unwrap().id;
        store.record_vote(NewVote::new("v1", id, "A")).await.unwrap();
        store.record_vote(NewVote::new("v1", other, "B")).await.unwrap();

        assert!(store.delete_election(id).await.unwrap());
        assert!(!store.delete_election(id).await.unwrap());
        assert!(store.election(id).await.unwrap().is_none());
        assert!(store.derived_tally(id).await.unwrap().is_empty());
        assert_eq!(store.derived_tally(other).await.unwrap()["B"], 1);
        assert_eq!(store.elections().await.unwrap().len(), 1);
    }
}
