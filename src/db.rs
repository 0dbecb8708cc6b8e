use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    bson::{doc, Bson, Document},
    Client, Collection, Database,
};
use tracing::info;

use crate::services::store::{
    Deadline, DocumentStore, DocumentStream, Patch, StoreError, UpdateOutcome,
};

/// [`DocumentStore`] backed by a MongoDB database. The driver's client is
/// pooled and safe to share across concurrent requests.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }
}

pub async fn init_db(uri: &str, database: &str, deadline: Deadline) -> Result<MongoStore, StoreError> {
    let client = deadline
        .guard(async { Client::with_uri_str(uri).await.map_err(StoreError::from) })
        .await?;
    let db = client.database(database);

    deadline
        .guard(async {
            db.run_command(doc! { "ping": 1 })
                .await
                .map_err(StoreError::from)
        })
        .await?;

    info!("Successfully connected to MongoDB database {database}");
    Ok(MongoStore { db })
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        deadline: Deadline,
    ) -> Result<Bson, StoreError> {
        let collection = self.collection(collection);
        let result = deadline
            .guard(async { collection.insert_one(document).await.map_err(StoreError::from) })
            .await?;
        Ok(result.inserted_id)
    }

    async fn find_all(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        deadline: Deadline,
    ) -> Result<DocumentStream, StoreError> {
        let collection = self.collection(collection);
        let cursor = deadline
            .guard(async {
                let mut find = collection.find(filter);
                if let Some(sort) = sort {
                    find = find.sort(sort);
                }
                find.await.map_err(StoreError::from)
            })
            .await?;

        Ok(cursor.map_err(StoreError::from).boxed())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        patch: Patch,
        deadline: Deadline,
    ) -> Result<UpdateOutcome, StoreError> {
        let collection = self.collection(collection);
        let result = deadline
            .guard(async {
                collection
                    .update_one(filter, patch.into_update_document())
                    .await
                    .map_err(StoreError::from)
            })
            .await?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: Document,
        deadline: Deadline,
    ) -> Result<u64, StoreError> {
        let collection = self.collection(collection);
        let result = deadline
            .guard(async { collection.delete_one(filter).await.map_err(StoreError::from) })
            .await?;
        Ok(result.deleted_count)
    }
}
