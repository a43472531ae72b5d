//! SQL generation and execution against a relational backend

use crate::context::{QueryOptions, RequestContext};
use crate::db::RelationalBackend;
use crate::error::{NlqError, Result};
use crate::interpret::{render_result_set, EncoderRegistry};
use crate::llm::{LanguageModel, ResponseFormat};
use crate::query_builder::{render_schema, ResultSet};
use crate::schema::{SchemaIntrospector, SchemaMap, SchemaSource};
use std::sync::Arc;
use tracing::{debug, info};

pub struct RelationalQueryBuilder {
    introspector: SchemaIntrospector,
    backend: Arc<dyn RelationalBackend>,
    llm: Arc<dyn LanguageModel>,
    encoders: EncoderRegistry,
}

impl RelationalQueryBuilder {
    pub fn new(backend: Arc<dyn RelationalBackend>, llm: Arc<dyn LanguageModel>) -> Self {
        let introspector = SchemaIntrospector::new(
            SchemaSource::Relational(Arc::clone(&backend)),
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

    pub fn introspector(&self) -> &SchemaIntrospector {
        &self.introspector
    }

    /// Produce SQL for `nl`. The LLM output is returned as-is.
    pub async fn generate_query(
        &self,
        ctx: &mut RequestContext,
        nl: &str,
        options: &QueryOptions,
    ) -> Result<String> {
        let schema = self.introspector.get_schema_info(ctx, Some(nl), options).await?;
        let prompt = sql_prompt(&self.format_schema(&schema), nl);
        let sql = self.llm.complete(&prompt, ResponseFormat::Text).await?;
        info!(request_id = %ctx.request_id(), "generated SQL");
        debug!(sql = %sql);
        Ok(sql)
    }

    pub async fn execute_query(&self, sql: &str) -> Result<ResultSet> {
        let rows = self
            .backend
            .execute(sql)
            .await
            .map_err(|e| NlqError::QueryExecution(e.to_string()))?;
        debug!(rows = rows.len(), "query executed");
        Ok(ResultSet::Rows(rows))
    }

    pub async fn interpret_results(&self, results: &ResultSet, nl: &str) -> Result<String> {
        let rendered = render_result_set(results, &self.encoders)?;
        let prompt = format!(
            "Analyse '{}' results:\n{}\nProvide a concise summary.",
            nl, rendered
        );
        let summary = self.llm.complete(&prompt, ResponseFormat::Text).await?;
        Ok(summary.trim().to_string())
    }

    pub fn format_schema(&self, schema: &SchemaMap) -> String {
        render_schema(schema)
    }
}

fn sql_prompt(schema: &str, nl: &str) -> String {
    format!(
        r#"You are a PostgreSQL expert.

Given the table schema:
{schema}

Convert the following natural language request into a valid and optimized RAW SQL query:

'{nl}'

Format the query so that:
- Table names are always wrapped in double quotes (e.g., "user")
- Column names should not be quoted unless absolutely necessary
- Do not include comments, explanations, or extra text
- Only return the SQL statement, ready to execute as-is"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_prompt_rules() {
        let prompt = sql_prompt("Table orders:\n  - id: INTEGER", "count orders");
        assert!(prompt.starts_with("You are a PostgreSQL expert."));
        assert!(prompt.contains("Table orders:"));
        assert!(prompt.contains("'count orders'"));
        assert!(prompt.contains("wrapped in double quotes"));
        assert!(prompt.contains("Only return the SQL statement"));
    }
}
