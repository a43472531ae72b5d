//! Backend boundaries for the relational and document stores
//!
//! The query pipeline only talks to these traits. `postgres` and `mongo`
//! provide the concrete adapters used by the CLI.

pub mod connection;
pub mod mongo;
pub mod postgres;

pub use connection::{connect_mongo, init_pool};
pub use mongo::MongoBackend;
pub use postgres::PostgresBackend;

use crate::schema::ColumnDescriptor;
use async_trait::async_trait;
use mongodb::bson::Document;
use thiserror::Error;

/// One relational result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Failure reported by a backend adapter. Carries the driver's message verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        BackendError(err.to_string())
    }
}

impl From<mongodb::error::Error> for BackendError {
    fn from(err: mongodb::error::Error) -> Self {
        BackendError(err.to_string())
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Foreign-key edge from a column of the inspected table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub referred_table: String,
    pub referred_column: String,
}

/// Index definition as reported by the document store.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSummary {
    pub name: Option<String>,
    pub keys: Document,
}

#[async_trait]
pub trait RelationalBackend: Send + Sync {
    async fn list_tables(&self) -> BackendResult<Vec<String>>;

    /// Columns in ordinal order.
    async fn list_columns(&self, table: &str) -> BackendResult<Vec<ColumnDescriptor>>;

    async fn list_foreign_keys(&self, table: &str) -> BackendResult<Vec<ForeignKey>>;

    /// Run arbitrary SQL text and materialize every returned row.
    async fn execute(&self, sql: &str) -> BackendResult<Vec<Row>>;
}

#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Database addressed by the connection, if the connection names one.
    fn database_name(&self) -> Option<&str>;

    async fn list_collections(&self) -> BackendResult<Vec<String>>;

    async fn sample_documents(&self, collection: &str, limit: usize) -> BackendResult<Vec<Document>>;

    async fn list_indexes(&self, collection: &str) -> BackendResult<Vec<IndexSummary>>;

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> BackendResult<Vec<Document>>;
}
