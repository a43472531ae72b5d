//! Aggregation pipeline generation and execution against a document backend

use crate::context::{QueryOptions, RequestContext};
use crate::db::DocumentBackend;
use crate::error::{NlqError, Result};
use crate::interpret::{render_result_set, EncoderRegistry};
use crate::llm::{LanguageModel, ResponseFormat};
use crate::query_builder::{render_schema, ResultSet};
use crate::schema::{SchemaIntrospector, SchemaMap, SchemaSource};
use mongodb::bson::Document;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

lazy_static::lazy_static! {
    static ref OPENING_FENCE: Regex = Regex::new(r"^\s*```[A-Za-z0-9_-]*[ \t]*\n?").expect("valid regex");
    static ref CLOSING_FENCE: Regex = Regex::new(r"\n?[ \t]*```\s*$").expect("valid regex");
}

pub struct DocumentQueryBuilder {
    introspector: SchemaIntrospector,
    backend: Arc<dyn DocumentBackend>,
    llm: Arc<dyn LanguageModel>,
    encoders: EncoderRegistry,
}

impl DocumentQueryBuilder {
    pub fn new(backend: Arc<dyn DocumentBackend>, llm: Arc<dyn LanguageModel>) -> Self {
        let introspector = SchemaIntrospector::new(
            SchemaSource::Document(Arc::clone(&backend)),
            Some(Arc::clone(&llm)),
        );
        Self {
            introspector,
            backend,
            llm,
            encoders: EncoderRegistry::default(),
        }
    }

    pub fn with_schema_cache(mut self, cache: SchemaMap) -> Self {
        self.introspector = self.introspector.with_schema_cache(cache);
        self
    }

    /// Replace the rules used to render non-JSON values during interpretation.
    pub fn with_encoders(mut self, encoders: EncoderRegistry) -> Self {
        self.encoders = encoders;
        self
    }

    pub fn introspector(&self) -> &SchemaIntrospector {
        &self.introspector
    }

    /// Produce pipeline JSON text for `nl`, with any markdown fences removed.
    ///
    /// On success `ctx` records the collection the pipeline is meant for.
    pub async fn generate_query(
        &self,
        ctx: &mut RequestContext,
        nl: &str,
        options: &QueryOptions,
    ) -> Result<String> {
        let schema = self.introspector.get_schema_info(ctx, Some(nl), options).await?;
        let prompt = pipeline_prompt(&self.format_schema(&schema), nl);
        let raw = self.llm.complete(&prompt, ResponseFormat::Json).await?;
        let pipeline = strip_code_fences(&raw);
        info!(request_id = %ctx.request_id(), collection = ?ctx.target(), "generated pipeline");
        debug!(pipeline = %pipeline);
        Ok(pipeline)
    }

    /// Parse `text` and run it against the collection selected in `ctx`.
    pub async fn execute_query(&self, ctx: &RequestContext, text: &str) -> Result<ResultSet> {
        let pipeline = parse_pipeline(text)?;
        self.execute_pipeline(ctx, pipeline).await
    }

    pub async fn execute_pipeline(
        &self,
        ctx: &RequestContext,
        pipeline: Vec<Document>,
    ) -> Result<ResultSet> {
        let collection = ctx.target().ok_or_else(|| {
            NlqError::Selection(
                "No target collection selected; set target_collection or generate the query first"
                    .to_string(),
            )
        })?;

        info!(
            request_id = %ctx.request_id(),
            collection,
            stages = pipeline.len(),
            "executing pipeline"
        );
        let docs = self
            .backend
            .aggregate(collection, pipeline)
            .await
            .map_err(|e| NlqError::QueryExecution(format!("aggregation on {}: {}", collection, e)))?;
        debug!(documents = docs.len(), "pipeline executed");
        Ok(ResultSet::Documents(docs))
    }

    pub async fn interpret_results(&self, results: &ResultSet, nl: &str) -> Result<String> {
        let rendered = render_result_set(results, &self.encoders)?;
        let prompt = format!(
            "Analyse the following results for the query: '{}'\n\n{}\n\nProvide a concise and accurate summary.",
            nl, rendered
        );
        let summary = self.llm.complete(&prompt, ResponseFormat::Text).await?;
        Ok(summary.trim().to_string())
    }

    pub fn format_schema(&self, schema: &SchemaMap) -> String {
        render_schema(schema)
    }
}

fn pipeline_prompt(schema: &str, nl: &str) -> String {
    format!(
        r#"You are a MongoDB expert familiar with aggregation pipelines.
Given this collection schema:
{schema}
Convert the natural-language request:
{nl}
into a MongoDB aggregation pipeline.
Return only the stages, formatted exactly like this example:
{{"pipeline": [
  {{"$match": {{"status": {{"$exists": true}}}}}},
  {{"$group": {{"_id": null, "count": {{"$sum": 1}}}}}}
]}}
Do not wrap the stages in any object other than "pipeline".
Do not add other keys, commentary, explanations or markdown code fences."#
    )
}

/// Remove a leading and a trailing markdown code fence, if present.
pub fn strip_code_fences(text: &str) -> String {
    let opened = OPENING_FENCE.replace(text, "");
    let closed = CLOSING_FENCE.replace(&opened, "");
    closed.trim().to_string()
}

/// Turn LLM output into pipeline stages.
///
/// Accepts a JSON array of stage objects, a single stage object, or either of
/// those under a `pipeline` key. Stage objects may use extended JSON such as
/// `{"$oid": "..."}`; any `$`-prefixed type wrapper (`$date`, `$binary`, ...)
/// is decoded here, and a malformed one is reported as
/// `NlqError::MalformedQuery` before the pipeline reaches the server.
/// Anything else is `NlqError::MalformedQuery` too.
pub fn parse_pipeline(text: &str) -> Result<Vec<Document>> {
    let payload: Value = serde_json::from_str(text)
        .map_err(|e| NlqError::MalformedQuery(format!("Invalid JSON: {}", e)))?;

    let pipeline = match payload {
        Value::Object(mut map) => match map.remove("pipeline") {
            Some(inner) => inner,
            None => Value::Object(map),
        },
        other => other,
    };

    let stages = match pipeline {
        Value::Object(stage) => vec![Value::Object(stage)],
        Value::Array(stages) => stages,
        _ => return Err(invalid_pipeline(text)),
    };

    stages
        .into_iter()
        .map(|stage| match stage {
            Value::Object(map) => Document::try_from(map).map_err(|e| {
                NlqError::MalformedQuery(format!("Invalid pipeline stage: {}", e))
            }),
            _ => Err(invalid_pipeline(text)),
        })
        .collect()
}

fn invalid_pipeline(text: &str) -> NlqError {
    NlqError::MalformedQuery(format!(
        "Invalid pipeline format: {:?}. Expected a JSON array of objects or an object with a 'pipeline' key.",
        text
    ))
}
