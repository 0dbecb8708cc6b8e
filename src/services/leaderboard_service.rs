use std::{sync::Arc, time::Duration};

use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::leaderboard::LeaderboardEntry,
    services::{
        rank_service::RankRecalculator,
        store::{Deadline, DocumentStore, Patch, StoreError, UpdateOutcome},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    Incremented,
}

pub struct LeaderboardService {
    store: Arc<dyn DocumentStore>,
    collection: String,
    ranks: RankRecalculator,
    timeout: Duration,
}

impl LeaderboardService {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>, timeout: Duration) -> Self {
        let collection = collection.into();
        Self {
            ranks: RankRecalculator::new(store.clone(), collection.clone()),
            store,
            collection,
            timeout,
        }
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.timeout)
    }

    /// Creates an entry on first sight of `name`, otherwise bumps its score
    /// and cost by one on the store side. Ranks are recalculated either way.
    pub async fn insert_or_increment(&self, name: &str) -> Result<InsertOutcome, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("Name cannot be empty".into()));
        }
        let deadline = self.deadline();

        let existing = self
            .store
            .find_first(&self.collection, doc! { "name": name }, Some(doc! { "_id": 1 }), deadline)
            .await?;

        let outcome = match existing {
            None => {
                let entry = mongodb::bson::to_document(&LeaderboardEntry::new(name))
                    .map_err(StoreError::from)?;
                self.store.insert_one(&self.collection, entry, deadline).await?;
                InsertOutcome::Created
            }
            Some(entry) => {
                let id = entry
                    .get("_id")
                    .cloned()
                    .ok_or_else(|| StoreError::Decode("leaderboard entry without _id".into()))?;
                let result = self
                    .store
                    .update_one(
                        &self.collection,
                        doc! { "_id": id },
                        Patch::Increment(doc! { "score": 1, "cost": 1 }),
                        deadline,
                    )
                    .await?;
                if result.matched == 0 {
                    warn!("Entry for {name} disappeared before it could be incremented");
                }
                InsertOutcome::Incremented
            }
        };

        self.ranks.recalculate(deadline).await?;

        info!(?outcome, "Leaderboard entry {name} processed");
        Ok(outcome)
    }

    /// All entries, best rank first. Documents that do not have the entry shape
    /// are skipped with a warning.
    pub async fn get_leaderboard(&self) -> Result<Vec<LeaderboardEntry>, AppError> {
        let deadline = self.deadline();

        let cursor = self
            .store
            .find_all(&self.collection, doc! {}, Some(doc! { "rank": 1, "_id": 1 }), deadline)
            .await?;
        let documents: Vec<Document> = deadline.guard(cursor.try_collect()).await?;

        let leaderboard = documents
            .into_iter()
            .filter_map(|d| {
                let id = d.get("_id").cloned();
                match mongodb::bson::from_document::<LeaderboardEntry>(d) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(?id, "Skipping malformed leaderboard document: {e}");
                        None
                    }
                }
            })
            .collect();

        Ok(leaderboard)
    }

    /// Replaces the fields in `update` on the first entry matching `filter`.
    /// Ranks are left as they are.
    pub async fn update_entry(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<UpdateOutcome, AppError> {
        if filter.is_empty() || update.is_empty() {
            return Err(AppError::Validation(
                "Filter and update fields cannot be empty".into(),
            ));
        }

        let outcome = self
            .store
            .update_one(&self.collection, filter, Patch::Set(update), self.deadline())
            .await?;

        if outcome.matched == 0 {
            return Err(AppError::NotFound);
        }

        info!(
            "Matched {} document(s) and modified {} document(s)",
            outcome.matched, outcome.modified
        );
        Ok(outcome)
    }
}
