use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, warn};
use mongodb::{
    bson::{doc, from_document, Bson, DateTime as BsonDateTime, Document},
    error::{TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{FindOneAndUpdateOptions, ReturnDocument},
    Client, ClientSession, Database,
};
use rand::Rng;
use rocket::{futures::TryStreamExt, tokio::time::sleep};

use crate::error::{Error, Result};
use crate::model::{
    common::election::ElectionState,
    db::{
        election::{Election, NewElection},
        vote::{NewVote, Vote},
    },
    mongodb::{is_duplicate_key_error, Coll, Id},
};

use super::VoteStore;

/// How long a transaction keeps being retried while the server reports it may
/// succeed on retry. Matches the driver's own `with_transaction` limit.
const TRANSACTION_TIME_BUDGET: Duration = Duration::from_secs(120);

/// Upper bounds of the randomised pause between transaction attempts.
const BACKOFF_BASE_MS: u64 = 5;
const BACKOFF_CAP_MS: u64 = 500;

/// Elections and vote records in MongoDB.
///
/// Vote recording relies on multi-document transactions, so the server must
/// be a replica set or sharded cluster.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// `db` must belong to `client` and have had its indexes ensured.
    pub fn new(client: Client, db: Database) -> Self {
        Self { client, db }
    }

    fn election_coll(&self) -> Coll<Election> {
        Coll::from_db(&self.db)
    }

    fn vote_coll(&self) -> Coll<Vote> {
        Coll::from_db(&self.db)
    }

    /// Insert the record, then bump the tally. Both writes share `session`'s transaction.
    async fn apply_vote(&self, vote: &NewVote, session: &mut ClientSession) -> Result<u64> {
        if let Err(err) = Coll::<NewVote>::from_db(&self.db)
            .insert_one_with_session(vote, None, &mut *session)
            .await
        {
            return Err(if is_duplicate_key_error(&err) {
                Error::duplicate_vote(&vote.voter_id, vote.election_id)
            } else {
                err.into()
            });
        }

        let now = BsonDateTime::from_chrono(Utc::now());
        let filter = doc! {
            "_id": vote.election_id,
            "state": ElectionState::Open,
            "candidates.name": vote.candidate_name.as_str(),
            "$or": [
                { "closes_at": { "$exists": false } },
                { "closes_at": null },
                { "closes_at": { "$gt": now } },
            ],
        };
        let update = doc! {
            "$inc": { "candidates.$.votes": 1_i64 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .election_coll()
            .find_one_and_update_with_session(filter, update, options, &mut *session)
            .await?;

        match updated {
            Some(election) => election
                .candidate(&vote.candidate_name)
                .map(|candidate| candidate.votes)
                .ok_or_else(|| {
                    Error::Internal(format!(
                        "Candidate '{}' vanished from election {} mid-vote",
                        vote.candidate_name, vote.election_id
                    ))
                }),
            None => Err(self.explain_rejection(vote, session).await?),
        }
    }

    /// Work out why the tally update matched nothing.
    async fn explain_rejection(
        &self,
        vote: &NewVote,
        session: &mut ClientSession,
    ) -> Result<Error> {
        let election = self
            .election_coll()
            .find_one_with_session(vote.election_id.as_doc(), None, session)
            .await?;
        Ok(match election {
            None => Error::election_not_found(vote.election_id),
            Some(election) if election.candidate(&vote.candidate_name).is_none() => {
                Error::invalid_candidate(vote.election_id, &vote.candidate_name)
            }
            Some(_) => Error::election_closed(vote.election_id),
        })
    }

    async fn delete_in_session(&self, id: Id, session: &mut ClientSession) -> Result<bool> {
        let result = self
            .election_coll()
            .delete_one_with_session(id.as_doc(), None, &mut *session)
            .await?;
        if result.deleted_count == 0 {
            return Ok(false);
        }
        let deleted = self
            .vote_coll()
            .delete_many_with_session(doc! { "election_id": id }, None, session)
            .await?;
        debug!(
            "Deleted election {id} and {} vote records",
            deleted.deleted_count
        );
        Ok(true)
    }
}

/// Decode an election, logging and skipping documents that don't fit the model.
fn readable_election(document: Document) -> Option<Election> {
    let id = document.get("_id").cloned().unwrap_or(Bson::Null);
    match from_document(document) {
        Ok(election) => Some(election),
        Err(e) => {
            warn!("Skipping unreadable election document {id}: {e}");
            None
        }
    }
}

/// Read the `count` of an aggregation group, whichever integer width the server chose.
fn group_count(group: &Document) -> Option<u64> {
    match group.get("count")? {
        Bson::Int32(n) => u64::try_from(*n).ok(),
        Bson::Int64(n) => u64::try_from(*n).ok(),
        _ => None,
    }
}

/// A random pause before transaction attempt `attempt + 1`, growing
/// exponentially up to [`BACKOFF_CAP_MS`].
fn backoff(attempt: u32) -> Duration {
    let ceiling = BACKOFF_BASE_MS
        .saturating_mul(1 << attempt.min(16))
        .min(BACKOFF_CAP_MS);
    Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
}

/// Commit, retrying while the outcome is unknown and `started` is within budget.
async fn commit(session: &mut ClientSession, started: Instant) -> Result<()> {
    loop {
        match session.commit_transaction().await {
            Err(e)
                if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                    && started.elapsed() < TRANSACTION_TIME_BUDGET =>
            {
                warn!("Commit outcome unknown, retrying: {e}");
            }
            result => return result.map_err(Error::from),
        }
    }
}

async fn abort(session: &mut ClientSession) {
    if let Err(e) = session.abort_transaction().await {
        debug!("Ignoring failed transaction abort: {e}");
    }
}

#[rocket::async_trait]
impl VoteStore for MongoStore {
    async fn elections(&self) -> Result<Vec<Election>> {
        let mut cursor = self.election_coll().raw().find(None, None).await?;
        let mut elections = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            elections.extend(readable_election(document));
        }
        Ok(elections)
    }

    async fn election(&self, id: Id) -> Result<Option<Election>> {
        let document = self.election_coll().raw().find_one(id.as_doc(), None).await?;
        Ok(document.and_then(readable_election))
    }

    async fn insert_election(&self, election: NewElection) -> Result<Election> {
        let id = Coll::<NewElection>::from_db(&self.db)
            .insert_one(&election, None)
            .await?
            .inserted_id
            .as_object_id()
            .ok_or_else(|| Error::Internal("Inserted election has no ObjectId".to_string()))?;
        Ok(Election {
            id: id.into(),
            election,
        })
    }

    async fn delete_election(&self, id: Id) -> Result<bool> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        match self.delete_in_session(id, &mut session).await {
            Ok(true) => {
                commit(&mut session, Instant::now()).await?;
                Ok(true)
            }
            other => {
                abort(&mut session).await;
                other
            }
        }
    }

    async fn set_state(&self, id: Id, state: ElectionState) -> Result<bool> {
        let update = doc! {
            "$set": { "state": state }
        };
        let result = self.election_coll().update_one(id.as_doc(), update, None).await?;
        Ok(result.matched_count == 1)
    }

    async fn record_vote(&self, vote: NewVote) -> Result<u64> {
        let mut session = self.client.start_session(None).await?;
        let started = Instant::now();
        let mut attempt = 0;
        loop {
            session.start_transaction(None).await?;
            let outcome = match self.apply_vote(&vote, &mut session).await {
                Ok(updated) => commit(&mut session, started).await.map(|()| updated),
                Err(e) => {
                    abort(&mut session).await;
                    Err(e)
                }
            };
            match outcome {
                // A write conflict on the election's tally, from any concurrent
                // vote in it. A retry after a same-voter conflict sees the
                // committed record and reports the duplicate.
                Err(Error::Db(ref e))
                    if e.contains_label(TRANSIENT_TRANSACTION_ERROR)
                        && started.elapsed() < TRANSACTION_TIME_BUDGET =>
                {
                    attempt += 1;
                    let pause = backoff(attempt);
                    debug!(
                        "Retrying vote by '{}' in election {} in {pause:?} (attempt {attempt}): {e}",
                        vote.voter_id, vote.election_id
                    );
                    sleep(pause).await;
                }
                outcome => return outcome,
            }
        }
    }

    async fn derived_tally(&self, id: Id) -> Result<HashMap<String, u64>> {
        let pipeline = [
            doc! { "$match": { "election_id": id } },
            doc! { "$group": { "_id": "$candidate_name", "count": { "$sum": 1 } } },
        ];
        let mut cursor = self.vote_coll().aggregate(pipeline, None).await?;
        let mut tally = HashMap::new();
        while let Some(group) = cursor.try_next().await? {
            let name = group
                .get_str("_id")
                .map_err(|e| Error::Internal(format!("Malformed tally group: {e}")))?
                .to_string();
            let count = group_count(&group)
                .ok_or_else(|| Error::Internal(format!("Malformed tally count for '{name}'")))?;
            tally.insert(name, count);
        }
        Ok(tally)
    }
}
