//! MongoDB adapter backed by the official driver

use crate::db::connection::connect_mongo;
use crate::db::{BackendError, BackendResult, DocumentBackend, IndexSummary};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Database, IndexModel};
use tracing::debug;

pub struct MongoBackend {
    client: Client,
    database: Option<String>,
}

impl MongoBackend {
    pub fn new(client: Client, database: Option<String>) -> Self {
        Self { client, database }
    }

    /// Connect using a `mongodb://` URI. The database is taken from the URI path.
    pub async fn connect(uri: &str) -> BackendResult<Self> {
        let (client, database) = connect_mongo(uri).await?;
        Ok(Self::new(client, database))
    }

    fn db(&self) -> BackendResult<Database> {
        self.database_name()
            .map(|name| self.client.database(name))
            .ok_or_else(|| BackendError::new("connection string does not name a database"))
    }
}

#[async_trait]
impl DocumentBackend for MongoBackend {
    fn database_name(&self) -> Option<&str> {
        self.database.as_deref().filter(|name| !name.is_empty())
    }

    async fn list_collections(&self) -> BackendResult<Vec<String>> {
        Ok(self.db()?.list_collection_names().await?)
    }

    async fn sample_documents(&self, collection: &str, limit: usize) -> BackendResult<Vec<Document>> {
        let cursor = self
            .db()?
            .collection::<Document>(collection)
            .find(doc! {})
            .limit(limit as i64)
            .await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs)
    }

    async fn list_indexes(&self, collection: &str) -> BackendResult<Vec<IndexSummary>> {
        let cursor = self.db()?.collection::<Document>(collection).list_indexes().await?;
        let models: Vec<IndexModel> = cursor.try_collect().await?;
        Ok(models
            .into_iter()
            .map(|model| IndexSummary {
                name: model.options.and_then(|o| o.name),
                keys: model.keys,
            })
            .collect())
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> BackendResult<Vec<Document>> {
        debug!(collection, stages = pipeline.len(), "running aggregation");
        let cursor = self.db()?.collection::<Document>(collection).aggregate(pipeline).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs)
    }
}
