//! PostgreSQL adapter backed by a sqlx pool

use crate::db::connection::init_pool;
use crate::db::{BackendError, BackendResult, ForeignKey, RelationalBackend, Row};
use crate::schema::ColumnDescriptor;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row as _, TypeInfo};
use tracing::debug;

pub struct PostgresBackend {
    pool: PgPool,
    schema: String,
}

impl PostgresBackend {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    pub async fn connect(database_url: &str, schema: impl Into<String>) -> BackendResult<Self> {
        let pool = init_pool(database_url).await?;
        Ok(Self::new(pool, schema))
    }
}

#[async_trait]
impl RelationalBackend for PostgresBackend {
    async fn list_tables(&self) -> BackendResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("table_name").map_err(BackendError::from))
            .collect()
    }

    async fn list_columns(&self, table: &str) -> BackendResult<Vec<ColumnDescriptor>> {
        let rows = sqlx::query(
            r#"
            SELECT column_name::text AS column_name,
                   upper(data_type::text) AS data_type,
                   (is_nullable::text = 'YES') AS nullable
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> BackendResult<ColumnDescriptor> {
                Ok(ColumnDescriptor {
                    name: row.try_get::<String, _>("column_name")?,
                    data_type: row.try_get::<String, _>("data_type")?,
                    nullable: row.try_get::<Option<bool>, _>("nullable")?.unwrap_or(true),
                })
            })
            .collect()
    }

    async fn list_foreign_keys(&self, table: &str) -> BackendResult<Vec<ForeignKey>> {
        // First column pair of each constraint
        let rows = sqlx::query(
            r#"
            SELECT a.attname::text AS column_name,
                   rt.relname::text AS referred_table,
                   ra.attname::text AS referred_column
            FROM pg_constraint c
            JOIN pg_class t ON t.oid = c.conrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_class rt ON rt.oid = c.confrelid
            JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = c.conkey[1]
            JOIN pg_attribute ra ON ra.attrelid = c.confrelid AND ra.attnum = c.confkey[1]
            WHERE c.contype = 'f' AND n.nspname = $1 AND t.relname = $2
            ORDER BY c.conname
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> BackendResult<ForeignKey> {
                Ok(ForeignKey {
                    column: row.try_get::<String, _>("column_name")?,
                    referred_table: row.try_get::<String, _>("referred_table")?,
                    referred_column: row.try_get::<String, _>("referred_column")?,
                })
            })
            .collect()
    }

    async fn execute(&self, sql: &str) -> BackendResult<Vec<Row>> {
        // Simple-query protocol: every value arrives in text format.
        let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
        debug!(rows = rows.len(), "postgres query returned");
        rows.iter().map(row_to_json).collect()
    }
}

fn row_to_json(row: &PgRow) -> BackendResult<Row> {
    let mut map = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let raw: Option<String> = row.try_get_unchecked(idx)?;
        let value = match raw {
            Some(text) => text_to_json(column.type_info().name(), text),
            None => Value::Null,
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

/// Convert a text-format Postgres value into the closest JSON value.
pub(crate) fn text_to_json(type_name: &str, text: String) -> Value {
    match type_name {
        "INT2" | "INT4" | "INT8" | "OID" => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(text)),
        "FLOAT4" | "FLOAT8" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::String(text)),
        // Kept as exact decimal text
        "NUMERIC" => Value::String(text),
        "BOOL" if text == "t" || text == "true" => Value::Bool(true),
        "BOOL" if text == "f" || text == "false" => Value::Bool(false),
        "JSON" | "JSONB" => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        _ => Value::String(text),
    }
}
