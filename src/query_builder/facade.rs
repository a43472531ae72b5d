//! Backend-agnostic entry point

use crate::backend::BackendKind;
use crate::config::ConnectionDescriptor;
use crate::context::{QueryOptions, RequestContext};
use crate::db::{MongoBackend, PostgresBackend};
use crate::error::{NlqError, Result};
use crate::interpret::EncoderRegistry;
use crate::llm::LanguageModel;
use crate::query_builder::document::{parse_pipeline, DocumentQueryBuilder};
use crate::query_builder::relational::RelationalQueryBuilder;
use crate::query_builder::{QueryArtifact, QueryOutcome, ResultSet};
use crate::schema::{SchemaIntrospector, SchemaMap, SchemaSource};
use std::sync::Arc;
use tracing::info;

enum ActiveBuilder {
    Relational(RelationalQueryBuilder),
    Document(DocumentQueryBuilder),
}

/// Single operation set over whichever backend the session was built for.
///
/// Holds no per-request state; pass a fresh [`RequestContext`] per request.
pub struct QueryBuilder {
    builder: ActiveBuilder,
}

impl QueryBuilder {
    pub fn new(source: SchemaSource, llm: Arc<dyn LanguageModel>) -> Self {
        let builder = match source {
            SchemaSource::Relational(backend) => {
                ActiveBuilder::Relational(RelationalQueryBuilder::new(backend, llm))
            }
            SchemaSource::Document(backend) => {
                ActiveBuilder::Document(DocumentQueryBuilder::new(backend, llm))
            }
        };
        Self { builder }
    }

    /// Open the concrete adapter named by `descriptor`.
    ///
    /// `pg_schema` is the schema searched during relational introspection.
    pub async fn connect(
        descriptor: &ConnectionDescriptor,
        llm: Arc<dyn LanguageModel>,
        pg_schema: &str,
    ) -> Result<Self> {
        info!(backend = %descriptor.kind(), url = %descriptor.redacted(), "connecting");
        let source = match descriptor.kind() {
            BackendKind::Relational => {
                let backend = PostgresBackend::connect(descriptor.as_str(), pg_schema)
                    .await
                    .map_err(|e| NlqError::Database(format!("Failed to connect to PostgreSQL: {}", e)))?;
                SchemaSource::Relational(Arc::new(backend))
            }
            BackendKind::Document => {
                let backend = MongoBackend::connect(descriptor.as_str())
                    .await
                    .map_err(|e| NlqError::Database(format!("Failed to connect to MongoDB: {}", e)))?;
                SchemaSource::Document(Arc::new(backend))
            }
        };
        Ok(Self::new(source, llm))
    }

    /// Like [`QueryBuilder::connect`] with the backend given by name.
    ///
    /// Unknown names fail with `NlqError::UnsupportedBackend` before any
    /// connection is attempted.
    pub async fn from_db_type(
        db_type: &str,
        connection_string: &str,
        llm: Arc<dyn LanguageModel>,
        pg_schema: &str,
    ) -> Result<Self> {
        let kind: BackendKind = db_type.parse()?;
        let descriptor = ConnectionDescriptor::new(kind, connection_string);
        Self::connect(&descriptor, llm, pg_schema).await
    }

    pub fn with_schema_cache(self, cache: SchemaMap) -> Self {
        let builder = match self.builder {
            ActiveBuilder::Relational(b) => ActiveBuilder::Relational(b.with_schema_cache(cache)),
            ActiveBuilder::Document(b) => ActiveBuilder::Document(b.with_schema_cache(cache)),
        };
        Self { builder }
    }

    /// Encoding rules for document results. Relational sessions ignore them.
    pub fn with_encoders(self, encoders: EncoderRegistry) -> Self {
        let builder = match self.builder {
            ActiveBuilder::Document(b) => ActiveBuilder::Document(b.with_encoders(encoders)),
            relational => relational,
        };
        Self { builder }
    }

    pub fn kind(&self) -> BackendKind {
        match &self.builder {
            ActiveBuilder::Relational(_) => BackendKind::Relational,
            ActiveBuilder::Document(_) => BackendKind::Document,
        }
    }

    fn introspector(&self) -> &SchemaIntrospector {
        match &self.builder {
            ActiveBuilder::Relational(b) => b.introspector(),
            ActiveBuilder::Document(b) => b.introspector(),
        }
    }

    pub async fn generate_query(
        &self,
        ctx: &mut RequestContext,
        nl: &str,
        options: &QueryOptions,
    ) -> Result<String> {
        match &self.builder {
            ActiveBuilder::Relational(b) => b.generate_query(ctx, nl, options).await,
            ActiveBuilder::Document(b) => b.generate_query(ctx, nl, options).await,
        }
    }

    /// Validate query text for the active backend.
    ///
    /// SQL passes through untouched; pipeline text goes through
    /// [`parse_pipeline`].
    pub fn prepare(&self, text: &str) -> Result<QueryArtifact> {
        match &self.builder {
            ActiveBuilder::Relational(_) => Ok(QueryArtifact::Sql(text.to_string())),
            ActiveBuilder::Document(_) => Ok(QueryArtifact::Pipeline(parse_pipeline(text)?)),
        }
    }

    pub async fn execute_query(&self, ctx: &RequestContext, text: &str) -> Result<ResultSet> {
        let artifact = self.prepare(text)?;
        self.execute_artifact(ctx, artifact).await
    }

    pub async fn execute_artifact(
        &self,
        ctx: &RequestContext,
        artifact: QueryArtifact,
    ) -> Result<ResultSet> {
        match (&self.builder, artifact) {
            (ActiveBuilder::Relational(b), QueryArtifact::Sql(sql)) => b.execute_query(&sql).await,
            (ActiveBuilder::Document(b), QueryArtifact::Pipeline(stages)) => {
                b.execute_pipeline(ctx, stages).await
            }
            (_, QueryArtifact::Sql(_)) => Err(NlqError::MalformedQuery(
                "SQL cannot be executed against a document backend".to_string(),
            )),
            (_, QueryArtifact::Pipeline(_)) => Err(NlqError::MalformedQuery(
                "An aggregation pipeline cannot be executed against a relational backend"
                    .to_string(),
            )),
        }
    }

    pub async fn interpret_results(&self, results: &ResultSet, nl: &str) -> Result<String> {
        match &self.builder {
            ActiveBuilder::Relational(b) => b.interpret_results(results, nl).await,
            ActiveBuilder::Document(b) => b.interpret_results(results, nl).await,
        }
    }

    /// Schema for an optional natural-language goal, without generating a query.
    pub async fn get_schema(&self, nl: Option<&str>) -> Result<SchemaMap> {
        let mut ctx = RequestContext::new();
        self.introspector()
            .get_schema_info(&mut ctx, nl, &QueryOptions::default())
            .await
    }

    pub fn format_schema(&self, schema: &SchemaMap) -> String {
        match &self.builder {
            ActiveBuilder::Relational(b) => b.format_schema(schema),
            ActiveBuilder::Document(b) => b.format_schema(schema),
        }
    }

    /// Generate, execute and interpret in one go.
    ///
    /// Stages run strictly in order; a failed execution is returned before any
    /// summary is requested.
    pub async fn process(&self, nl: &str, options: &QueryOptions) -> Result<QueryOutcome> {
        let mut ctx = RequestContext::new();
        info!(request_id = %ctx.request_id(), backend = %self.kind(), "processing request");

        let query = self.generate_query(&mut ctx, nl, options).await?;
        let results = self.execute_query(&ctx, &query).await?;
        info!(request_id = %ctx.request_id(), results = results.len(), "interpreting results");
        let summary = self.interpret_results(&results, nl).await?;

        Ok(QueryOutcome {
            query,
            target: ctx.target().map(str::to_string),
            results,
            summary,
        })
    }
}
