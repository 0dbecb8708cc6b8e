use std::{future::Future, time::Duration};

use async_trait::async_trait;
use futures::{stream::BoxStream, TryStreamExt};
use mongodb::bson::{Bson, Document};
use thiserror::Error;
use tokio::time::Instant;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store operation timed out")]
    Timeout,

    #[error("database error: {0}")]
    Backend(String),

    #[error("malformed document: {0}")]
    Decode(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<mongodb::bson::de::Error> for StoreError {
    fn from(e: mongodb::bson::de::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for StoreError {
    fn from(e: mongodb::bson::ser::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

/// Point in time after which a store call gives up with [`StoreError::Timeout`].
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    #[cfg(test)]
    pub fn has_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    /// Runs `fut`, failing with `Timeout` if it has not finished by the deadline.
    pub async fn guard<F, T>(self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout_at(self.0, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}

/// How `update_one` changes the matched document.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Replace the named fields (`$set`).
    Set(Document),
    /// Add to the named numeric fields on the store side (`$inc`).
    Increment(Document),
}

impl Patch {
    pub fn into_update_document(self) -> Document {
        match self {
            Patch::Set(fields) => mongodb::bson::doc! { "$set": fields },
            Patch::Increment(fields) => mongodb::bson::doc! { "$inc": fields },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

pub type DocumentStream = BoxStream<'static, Result<Document, StoreError>>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persists one document, returning its `_id`.
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        deadline: Deadline,
    ) -> Result<Bson, StoreError>;

    /// Streams every document matching `filter`, ordered by `sort` when given.
    async fn find_all(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        deadline: Deadline,
    ) -> Result<DocumentStream, StoreError>;

    /// Applies `patch` to at most one document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        patch: Patch,
        deadline: Deadline,
    ) -> Result<UpdateOutcome, StoreError>;

    async fn delete_one(
        &self,
        collection: &str,
        filter: Document,
        deadline: Deadline,
    ) -> Result<u64, StoreError>;

    async fn find_first(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        deadline: Deadline,
    ) -> Result<Option<Document>, StoreError> {
        let mut cursor = self.find_all(collection, filter, sort, deadline).await?;
        deadline.guard(cursor.try_next()).await
    }
}
