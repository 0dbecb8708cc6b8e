use std::sync::Arc;

use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use tokio::sync::Mutex;
use tracing::debug;

use crate::services::store::{Deadline, DocumentStore, Patch, StoreError};

/// Highest score first; equal scores keep creation order through `_id`.
pub fn score_order() -> Document {
    doc! { "score": -1, "_id": 1 }
}

/// Rewrites the denormalized `rank` field of every leaderboard entry.
///
/// Passes run one at a time. A pass re-reads the collection after acquiring
/// the lock, so the last pass to finish reflects every committed write. There
/// is no atomicity inside a pass: if an update fails, entries already reached
/// keep their new rank and the rest keep their stale one.
pub struct RankRecalculator {
    store: Arc<dyn DocumentStore>,
    collection: String,
    pass: Mutex<()>,
}

impl RankRecalculator {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            pass: Mutex::new(()),
        }
    }

    /// Returns the number of entries ranked.
    pub async fn recalculate(&self, deadline: Deadline) -> Result<usize, StoreError> {
        let _pass = deadline.guard(async { Ok(self.pass.lock().await) }).await?;

        let mut entries = self
            .store
            .find_all(&self.collection, doc! {}, Some(score_order()), deadline)
            .await?;

        let mut rank: i64 = 0;
        while let Some(entry) = deadline.guard(entries.try_next()).await? {
            rank += 1;
            let id = entry
                .get("_id")
                .cloned()
                .ok_or_else(|| StoreError::Decode("leaderboard entry without _id".into()))?;

            self.store
                .update_one(
                    &self.collection,
                    doc! { "_id": id },
                    Patch::Set(doc! { "rank": rank }),
                    deadline,
                )
                .await?;
        }

        debug!(entries = rank, collection = %self.collection, "ranks recalculated");
        Ok(rank as usize)
    }
}
