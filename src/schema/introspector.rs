//! Schema Introspector
//!
//! Loads the table or collection layout of the active backend and narrows it
//! to the unit a request is about, either from an explicit override or by
//! asking the LLM to pick one.

use crate::backend::BackendKind;
use crate::context::{QueryOptions, RequestContext};
use crate::db::{DocumentBackend, RelationalBackend};
use crate::error::{NlqError, Result};
use crate::llm::{LanguageModel, ResponseFormat};
use crate::schema::{
    CollectionDescriptor, FieldDescriptor, SchemaMap, TableDescriptor, UnitDescriptor,
};
use mongodb::bson::{Bson, Document};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Documents sampled per collection for field type inference.
pub const SAMPLE_LIMIT: usize = 100;

/// The backend a session introspects.
#[derive(Clone)]
pub enum SchemaSource {
    Relational(Arc<dyn RelationalBackend>),
    Document(Arc<dyn DocumentBackend>),
}

impl SchemaSource {
    pub fn kind(&self) -> BackendKind {
        match self {
            SchemaSource::Relational(_) => BackendKind::Relational,
            SchemaSource::Document(_) => BackendKind::Document,
        }
    }
}

pub struct SchemaIntrospector {
    source: SchemaSource,
    llm: Option<Arc<dyn LanguageModel>>,
    schema_cache: Option<SchemaMap>,
}

impl SchemaIntrospector {
    pub fn new(source: SchemaSource, llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self {
            source,
            llm,
            schema_cache: None,
        }
    }

    /// Attach a caller-owned schema snapshot, returned verbatim for requests
    /// that carry no natural-language query. An empty snapshot counts as no
    /// cache.
    pub fn with_schema_cache(mut self, cache: SchemaMap) -> Self {
        self.schema_cache = Some(cache).filter(|c| !c.is_empty());
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.source.kind()
    }

    pub fn source(&self) -> &SchemaSource {
        &self.source
    }

    /// Enumerate every unit of the backend.
    pub async fn load_schema(&self) -> Result<SchemaMap> {
        match &self.source {
            SchemaSource::Relational(backend) => load_relational_schema(backend.as_ref()).await,
            SchemaSource::Document(backend) => load_document_schema(backend.as_ref()).await,
        }
    }

    /// Schema for one request.
    ///
    /// Resolution order: cache (only without a query), then the full map
    /// narrowed by the explicit override, then by LLM selection, else the
    /// full map. Narrowing records the target in `ctx`.
    pub async fn get_schema_info(
        &self,
        ctx: &mut RequestContext,
        query: Option<&str>,
        options: &QueryOptions,
    ) -> Result<SchemaMap> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());

        if let (Some(cache), None) = (&self.schema_cache, query) {
            debug!(units = cache.len(), "using cached schema");
            return Ok(cache.clone());
        }

        let full = self.load_schema().await?;
        debug!(request_id = %ctx.request_id(), units = full.len(), "loaded schema");

        if let Some(target) = options.target.as_deref() {
            if let Some(descriptor) = full.get(target) {
                info!(request_id = %ctx.request_id(), unit = %target, "using explicit target");
                ctx.select_target(target);
                return Ok(narrow(target, descriptor));
            }
            warn!(unit = %target, "explicit target not found in schema, ignoring override");
        }

        if let (Some(query), Some(_)) = (query, &self.llm) {
            let best = self.select_best(&full, query).await?;
            info!(request_id = %ctx.request_id(), unit = %best, "LLM selected target");
            let descriptor = &full[&best];
            let narrowed = narrow(&best, descriptor);
            ctx.select_target(best);
            return Ok(narrowed);
        }

        Ok(full)
    }

    /// Ask the LLM which single unit best serves `query`.
    ///
    /// The answer is treated as an untrusted candidate and must be a key of
    /// `schema`, otherwise `NlqError::Selection` is returned.
    pub async fn select_best(&self, schema: &SchemaMap, query: &str) -> Result<String> {
        let llm = self.llm.as_ref().ok_or_else(|| {
            NlqError::Configuration("LLM-based target selection requires an LLM".to_string())
        })?;

        let options = serde_json::to_string(schema)?;
        let prompt = selection_prompt(self.kind().unit_noun(), &options, query);
        let raw = llm.complete(&prompt, ResponseFormat::Text).await?;
        let candidate = clean_candidate(&raw);

        if schema.contains_key(candidate) {
            Ok(candidate.to_string())
        } else {
            let available: Vec<&str> = schema.keys().map(String::as_str).collect();
            Err(NlqError::Selection(format!(
                "LLM selected '{}' which is not a known {} (available: {})",
                candidate,
                self.kind().unit_noun(),
                available.join(", ")
            )))
        }
    }
}

fn narrow(name: &str, descriptor: &UnitDescriptor) -> SchemaMap {
    let mut narrowed = SchemaMap::new();
    narrowed.insert(name.to_string(), descriptor.clone());
    narrowed
}

fn selection_prompt(unit_noun: &str, options: &str, query: &str) -> String {
    format!(
        r#"You are a database expert. Given these options:

{options}

User goal: {query}

Which single option is best? Return exactly the name of the {unit_noun}, with no quotes, no parentheses and no explanation."#
    )
}

fn clean_candidate(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim()
}

async fn load_relational_schema(backend: &dyn RelationalBackend) -> Result<SchemaMap> {
    let introspection = |e: crate::db::BackendError| {
        NlqError::Database(format!("Failed to introspect relational schema: {}", e))
    };

    let mut schema = SchemaMap::new();
    for table in backend.list_tables().await.map_err(introspection)? {
        let columns = backend.list_columns(&table).await.map_err(introspection)?;
        let relationships = backend
            .list_foreign_keys(&table)
            .await
            .map_err(introspection)?
            .into_iter()
            .map(|fk| {
                format!(
                    "{}.{} -> {}.{}",
                    table, fk.column, fk.referred_table, fk.referred_column
                )
            })
            .collect();

        schema.insert(
            table,
            UnitDescriptor::Table(TableDescriptor {
                columns,
                relationships,
            }),
        );
    }
    Ok(schema)
}

async fn load_document_schema(backend: &dyn DocumentBackend) -> Result<SchemaMap> {
    if backend.database_name().is_none() {
        return Err(NlqError::Configuration(
            "Missing MongoDB database name".to_string(),
        ));
    }

    let introspection = |e: crate::db::BackendError| {
        NlqError::Database(format!("Failed to introspect document schema: {}", e))
    };

    let mut schema = SchemaMap::new();
    for collection in backend.list_collections().await.map_err(introspection)? {
        let samples = backend
            .sample_documents(&collection, SAMPLE_LIMIT)
            .await
            .map_err(introspection)?;
        if samples.is_empty() {
            debug!(collection = %collection, "skipping empty collection");
            continue;
        }

        let indexes = backend
            .list_indexes(&collection)
            .await
            .map_err(introspection)?
            .into_iter()
            .filter(|idx| idx.name.as_deref() != Some("_id_"))
            .map(|idx| index_signature(&idx.keys))
            .collect();

        schema.insert(
            collection,
            UnitDescriptor::Collection(CollectionDescriptor {
                fields: infer_fields(&samples),
                indexes,
            }),
        );
    }
    Ok(schema)
}

/// Field list from sampled documents, in first-seen order.
///
/// Each field keeps the type of the first value seen for it; later samples
/// with a different type do not change it.
pub fn infer_fields(samples: &[Document]) -> Vec<FieldDescriptor> {
    let mut seen = HashSet::new();
    let mut fields = Vec::new();
    for doc in samples {
        for (key, value) in doc {
            if seen.insert(key.clone()) {
                fields.push(FieldDescriptor {
                    name: key.clone(),
                    type_name: bson_type_name(value).to_string(),
                });
            }
        }
    }
    fields
}

/// MongoDB `$type` alias for a value.
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::JavaScriptCodeWithScope(_) => "javascriptWithScope",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Symbol(_) => "symbol",
        Bson::Decimal128(_) => "decimal",
        Bson::Undefined => "undefined",
        Bson::MaxKey => "maxKey",
        Bson::MinKey => "minKey",
        Bson::DbPointer(_) => "dbPointer",
    }
}

pub fn index_signature(keys: &Document) -> String {
    keys.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;
    use mongodb::bson::{doc, DateTime};

    #[test]
    fn test_infer_fields_first_seen_type_wins() {
        let samples = vec![
            doc! { "_id": ObjectId::new(), "status": "paid" },
            doc! { "_id": ObjectId::new(), "status": 3, "total": 12.5, "at": DateTime::now() },
        ];
        let fields = infer_fields(&samples);
        let pairs: Vec<(&str, &str)> = fields
            .iter()
            .map(|f| (f.name.as_str(), f.type_name.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("_id", "objectId"),
                ("status", "string"),
                ("total", "double"),
                ("at", "date"),
            ]
        );
    }

    #[test]
    fn test_infer_fields_empty() {
        assert!(infer_fields(&[]).is_empty());
    }

    #[test]
    fn test_clean_candidate() {
        assert_eq!(clean_candidate("  orders\n"), "orders");
        assert_eq!(clean_candidate("\"orders\""), "orders");
        assert_eq!(clean_candidate("`orders`"), "orders");
    }

    #[test]
    fn test_index_signature() {
        assert_eq!(index_signature(&doc! { "email": 1 }), r#"{ "email": 1 }"#);
    }
}
