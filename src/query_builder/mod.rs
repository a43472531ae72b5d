//! Natural language → query pipeline
//!
//! One builder per backend kind plus the [`QueryBuilder`] facade that picks
//! between them. Every stage takes the caller's [`RequestContext`] so a single
//! builder can serve concurrent requests.
//!
//! [`RequestContext`]: crate::context::RequestContext

pub mod document;
pub mod facade;
pub mod relational;

pub use document::{parse_pipeline, strip_code_fences, DocumentQueryBuilder};
pub use facade::QueryBuilder;
pub use relational::RelationalQueryBuilder;

use crate::db::Row;
use crate::schema::{SchemaMap, UnitDescriptor};
use mongodb::bson::Document;
use serde::Serialize;

/// A query ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryArtifact {
    Sql(String),
    Pipeline(Vec<Document>),
}

/// Materialized results of one execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultSet {
    Rows(Vec<Row>),
    Documents(Vec<Document>),
}

impl ResultSet {
    pub fn len(&self) -> usize {
        match self {
            ResultSet::Rows(rows) => rows.len(),
            ResultSet::Documents(docs) => docs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything produced by one end-to-end request.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Query text as produced by the LLM.
    pub query: String,
    /// Unit the query ran against, when one was selected.
    pub target: Option<String>,
    pub results: ResultSet,
    pub summary: String,
}

/// Prompt rendering of a schema map.
///
/// Tables render as `Table <name>:` followed by `  - col: type` and
/// `  rel: ...` lines; collections as `Collection <name>:` with field and
/// `  idx: ...` lines.
pub fn render_schema(schema: &SchemaMap) -> String {
    let mut lines = Vec::new();
    for (name, unit) in schema {
        match unit {
            UnitDescriptor::Table(table) => {
                lines.push(format!("Table {}:", name));
                for col in &table.columns {
                    lines.push(format!("  - {}: {}", col.name, col.data_type));
                }
                for rel in &table.relationships {
                    lines.push(format!("  rel: {}", rel));
                }
            }
            UnitDescriptor::Collection(coll) => {
                lines.push(format!("Collection {}:", name));
                for field in &coll.fields {
                    lines.push(format!("  - {}: {}", field.name, field.type_name));
                }
                for idx in &coll.indexes {
                    lines.push(format!("  idx: {}", idx));
                }
            }
        }
    }
    lines.join("\n")
}
