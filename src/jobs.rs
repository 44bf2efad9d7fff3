//! Marking app-chain blocks as already settled in the orchestrator's job
//! store.
//!
//! The prover cannot process the blocks produced while the devnet is being
//! bootstrapped. Recording a completed `StateTransition` job for each of
//! them lets the orchestrator resume after the range instead of stalling.

use mongodb::{
    bson::{doc, oid::ObjectId, DateTime, Document, Uuid},
    Client, Collection,
};
use tracing::{debug, info};

const JOBS_COLLECTION: &str = "jobs";
const JOB_TYPE: &str = "StateTransition";
const JOB_STATUS: &str = "Completed";
const JOB_VERSION: i32 = 3;
/// Stands in for the settlement transaction that never happened.
pub const PLACEHOLDER_SETTLEMENT_TX: &str =
    "0x0adca7145e618564bc5ec901b80d331e11e3207ac21e68c4cedb698ff5ce6cb0";

/// A completed state-transition job covering one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransitionJob {
    pub block_number: u64,
    pub settlement_tx: String,
}

impl StateTransitionJob {
    pub fn settled(block_number: u64) -> Self {
        Self {
            block_number,
            settlement_tx: PLACEHOLDER_SETTLEMENT_TX.to_string(),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait JobStore {
    /// Removes every job and returns how many were removed.
    async fn clear(&self) -> eyre::Result<u64>;

    /// Inserts `job` unless a state-transition job for its block already
    /// exists. Returns whether it was inserted.
    async fn ensure_settled(&self, job: &StateTransitionJob) -> eyre::Result<bool>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettleSummary {
    pub removed: u64,
    pub inserted: u64,
    pub already_settled: u64,
}

/// Ensures blocks `0..=last_block` are recorded as settled. Running it twice
/// inserts nothing the second time, unless `reset` wipes the store first.
pub async fn mark_range_settled<J: JobStore>(
    store: &J,
    last_block: u64,
    reset: bool,
) -> eyre::Result<SettleSummary> {
    let mut summary = SettleSummary::default();
    if reset {
        summary.removed = store.clear().await?;
        info!(removed = summary.removed, "cleared job store");
    }

    for block in 0..=last_block {
        if store.ensure_settled(&StateTransitionJob::settled(block)).await? {
            summary.inserted += 1;
        } else {
            debug!(block, "already settled");
            summary.already_settled += 1;
        }
    }

    info!(
        last_block,
        inserted = summary.inserted,
        already_settled = summary.already_settled,
        "block range marked as settled"
    );
    Ok(summary)
}

/// The orchestrator's MongoDB job collection.
pub struct MongoJobStore {
    jobs: Collection<Document>,
}

impl MongoJobStore {
    pub async fn connect(uri: &str, database: &str) -> eyre::Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let jobs = client.database(database).collection(JOBS_COLLECTION);
        Ok(Self { jobs })
    }
}

impl JobStore for MongoJobStore {
    async fn clear(&self) -> eyre::Result<u64> {
        let result = self.jobs.delete_many(doc! {}).await?;
        Ok(result.deleted_count)
    }

    async fn ensure_settled(&self, job: &StateTransitionJob) -> eyre::Result<bool> {
        let block = job.block_number.to_string();
        let now = DateTime::now();

        let filter = doc! {
            "job_type": JOB_TYPE,
            "internal_id": block.as_str(),
        };
        let update = doc! {
            "$setOnInsert": {
                "_id": ObjectId::new(),
                "id": Uuid::new(),
                "external_id": block.as_str(),
                "created_at": now,
                "updated_at": now,
                "status": JOB_STATUS,
                "version": JOB_VERSION,
                "metadata": {
                    "attempt_tx_hashes_0": job.settlement_tx.as_str(),
                    "process_attempt_no": "1",
                    "blocks_number_to_settle": block.as_str(),
                },
            }
        };

        let result = self.jobs.update_one(filter, update).upsert(true).await?;
        Ok(result.upserted_id.is_some())
    }
}
