#![allow(dead_code)]

use async_trait::async_trait;
use mongodb::bson::Document;
use serde_json::Value;
use spyne_nlq::db::{
    BackendError, BackendResult, DocumentBackend, ForeignKey, IndexSummary, RelationalBackend, Row,
};
use spyne_nlq::error::{NlqError, Result};
use spyne_nlq::llm::{LanguageModel, ResponseFormat};
use spyne_nlq::schema::ColumnDescriptor;
use std::collections::VecDeque;
use std::sync::Mutex;

/// LLM that replays canned completions and records every prompt.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<(String, ResponseFormat)>>,
}

impl ScriptedLlm {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<(String, ResponseFormat)> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(&self, prompt: &str, format: ResponseFormat) -> Result<String> {
        self.prompts.lock().unwrap().push((prompt.to_string(), format));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| NlqError::Llm("no scripted reply left".to_string()))
    }
}

pub fn column(name: &str, data_type: &str) -> ColumnDescriptor {
    ColumnDescriptor {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable: true,
    }
}

pub struct FakeTable {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// In-memory relational store returning fixed rows for any SQL.
#[derive(Default)]
pub struct FakeRelational {
    pub tables: Vec<FakeTable>,
    pub rows: Vec<Row>,
    pub failure: Option<String>,
    pub executed: Mutex<Vec<String>>,
}

impl FakeRelational {
    pub fn with_table(mut self, name: &str, columns: Vec<ColumnDescriptor>) -> Self {
        self.tables.push(FakeTable {
            name: name.to_string(),
            columns,
            foreign_keys: Vec::new(),
        });
        self
    }

    pub fn with_foreign_key(mut self, table: &str, column: &str, referred: &str, referred_column: &str) -> Self {
        if let Some(t) = self.tables.iter_mut().find(|t| t.name == table) {
            t.foreign_keys.push(ForeignKey {
                column: column.to_string(),
                referred_table: referred.to_string(),
                referred_column: referred_column.to_string(),
            });
        }
        self
    }

    pub fn with_rows(mut self, rows: Vec<Value>) -> Self {
        self.rows = rows
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn table(&self, name: &str) -> BackendResult<&FakeTable> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| BackendError::new(format!("relation \"{}\" does not exist", name)))
    }
}

#[async_trait]
impl RelationalBackend for FakeRelational {
    async fn list_tables(&self) -> BackendResult<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn list_columns(&self, table: &str) -> BackendResult<Vec<ColumnDescriptor>> {
        Ok(self.table(table)?.columns.clone())
    }

    async fn list_foreign_keys(&self, table: &str) -> BackendResult<Vec<ForeignKey>> {
        Ok(self.table(table)?.foreign_keys.clone())
    }

    async fn execute(&self, sql: &str) -> BackendResult<Vec<Row>> {
        self.executed.lock().unwrap().push(sql.to_string());
        match &self.failure {
            Some(message) => Err(BackendError::new(message.clone())),
            None => Ok(self.rows.clone()),
        }
    }
}

pub struct FakeCollection {
    pub name: String,
    pub documents: Vec<Document>,
    pub indexes: Vec<IndexSummary>,
}

/// In-memory document store. `aggregate` returns a fixed answer and records
/// the collection and pipeline it was called with.
pub struct FakeDocumentStore {
    pub database: Option<String>,
    pub collections: Vec<FakeCollection>,
    pub answer: Vec<Document>,
    pub aggregations: Mutex<Vec<(String, Vec<Document>)>>,
}

impl FakeDocumentStore {
    pub fn new(database: &str) -> Self {
        Self {
            database: Some(database.to_string()),
            collections: Vec::new(),
            answer: Vec::new(),
            aggregations: Mutex::new(Vec::new()),
        }
    }

    pub fn without_database() -> Self {
        Self {
            database: None,
            ..Self::new("unused")
        }
    }

    pub fn with_collection(mut self, name: &str, documents: Vec<Document>) -> Self {
        self.collections.push(FakeCollection {
            name: name.to_string(),
            documents,
            indexes: Vec::new(),
        });
        self
    }

    pub fn with_index(mut self, collection: &str, name: &str, keys: Document) -> Self {
        if let Some(c) = self.collections.iter_mut().find(|c| c.name == collection) {
            c.indexes.push(IndexSummary {
                name: Some(name.to_string()),
                keys,
            });
        }
        self
    }

    pub fn answering(mut self, answer: Vec<Document>) -> Self {
        self.answer = answer;
        self
    }

    pub fn aggregations(&self) -> Vec<(String, Vec<Document>)> {
        self.aggregations.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentBackend for FakeDocumentStore {
    fn database_name(&self) -> Option<&str> {
        self.database.as_deref()
    }

    async fn list_collections(&self) -> BackendResult<Vec<String>> {
        Ok(self.collections.iter().map(|c| c.name.clone()).collect())
    }

    async fn sample_documents(&self, collection: &str, limit: usize) -> BackendResult<Vec<Document>> {
        let coll = self
            .collections
            .iter()
            .find(|c| c.name == collection)
            .ok_or_else(|| BackendError::new(format!("ns not found: {}", collection)))?;
        Ok(coll.documents.iter().take(limit).cloned().collect())
    }

    async fn list_indexes(&self, collection: &str) -> BackendResult<Vec<IndexSummary>> {
        let coll = self
            .collections
            .iter()
            .find(|c| c.name == collection)
            .ok_or_else(|| BackendError::new(format!("ns not found: {}", collection)))?;
        let mut indexes = vec![IndexSummary {
            name: Some("_id_".to_string()),
            keys: mongodb::bson::doc! { "_id": 1 },
        }];
        indexes.extend(coll.indexes.iter().cloned());
        Ok(indexes)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> BackendResult<Vec<Document>> {
        self.aggregations
            .lock()
            .unwrap()
            .push((collection.to_string(), pipeline));
        Ok(self.answer.clone())
    }
}
