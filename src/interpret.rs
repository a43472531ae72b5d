//! Result Interpretation helper
//!
//! Renders result sets into the JSON text embedded in summary prompts.
//! Document results may hold BSON values with no JSON equivalent; those go
//! through an [`EncoderRegistry`] that maps an element type to a string rule.

use crate::db::Row;
use crate::error::{NlqError, Result};
use crate::query_builder::ResultSet;
use chrono::{SecondsFormat, TimeZone, Utc};
use mongodb::bson::spec::ElementType;
use mongodb::bson::{Bson, Document};
use serde_json::{Map, Value};
use std::sync::Arc;

pub type EncodeRule = Arc<dyn Fn(&Bson) -> String + Send + Sync>;

/// Element type → string conversion rules for non-JSON-native values.
///
/// Values without a rule are encoded structurally when JSON has an equivalent
/// and as their display form otherwise.
#[derive(Clone)]
pub struct EncoderRegistry {
    rules: Vec<(ElementType, EncodeRule)>,
}

impl EncoderRegistry {
    /// Registry with no rules at all.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add or replace the rule for `element_type`.
    pub fn register<F>(&mut self, element_type: ElementType, rule: F)
    where
        F: Fn(&Bson) -> String + Send + Sync + 'static,
    {
        let rule: EncodeRule = Arc::new(rule);
        match self.rules.iter_mut().find(|(t, _)| *t == element_type) {
            Some(slot) => slot.1 = rule,
            None => self.rules.push((element_type, rule)),
        }
    }

    pub fn with_rule<F>(mut self, element_type: ElementType, rule: F) -> Self
    where
        F: Fn(&Bson) -> String + Send + Sync + 'static,
    {
        self.register(element_type, rule);
        self
    }

    fn rule_for(&self, element_type: ElementType) -> Option<&EncodeRule> {
        self.rules
            .iter()
            .find(|(t, _)| *t == element_type)
            .map(|(_, rule)| rule)
    }

    pub fn encode_value(&self, value: &Bson) -> Result<Value> {
        if let Some(rule) = self.rule_for(value.element_type()) {
            return Ok(Value::String(rule(value)));
        }

        Ok(match value {
            Bson::Null | Bson::Undefined => Value::Null,
            Bson::Boolean(b) => Value::Bool(*b),
            Bson::Int32(i) => Value::from(*i),
            Bson::Int64(i) => Value::from(*i),
            Bson::Double(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| {
                    NlqError::Serialization(format!("{} cannot be represented in JSON", f))
                })?,
            Bson::String(s) => Value::String(s.clone()),
            Bson::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.encode_value(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Bson::Document(doc) => self.encode_document(doc)?,
            other => Value::String(other.to_string()),
        })
    }

    pub fn encode_document(&self, doc: &Document) -> Result<Value> {
        let mut map = Map::new();
        for (key, value) in doc {
            map.insert(key.clone(), self.encode_value(value)?);
        }
        Ok(Value::Object(map))
    }
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        Self::empty()
            .with_rule(ElementType::ObjectId, |v| match v {
                Bson::ObjectId(oid) => oid.to_hex(),
                other => other.to_string(),
            })
            .with_rule(ElementType::DateTime, |v| match v {
                Bson::DateTime(dt) => Utc
                    .timestamp_millis_opt(dt.timestamp_millis())
                    .single()
                    .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
                    .unwrap_or_else(|| dt.to_string()),
                other => other.to_string(),
            })
            .with_rule(ElementType::Timestamp, |v| match v {
                Bson::Timestamp(ts) => Utc
                    .timestamp_opt(i64::from(ts.time), 0)
                    .single()
                    .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_else(|| v.to_string()),
                other => other.to_string(),
            })
    }
}

pub fn render_rows(rows: &[Row]) -> Result<String> {
    serde_json::to_string_pretty(rows)
        .map_err(|e| NlqError::Serialization(format!("Failed to serialize rows: {}", e)))
}

pub fn render_documents(docs: &[Document], registry: &EncoderRegistry) -> Result<String> {
    let encoded = docs
        .iter()
        .map(|doc| registry.encode_document(doc))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| match e {
            NlqError::Serialization(msg) => {
                NlqError::Serialization(format!("Failed to serialize documents: {}", msg))
            }
            other => other,
        })?;
    serde_json::to_string_pretty(&encoded)
        .map_err(|e| NlqError::Serialization(format!("Failed to serialize documents: {}", e)))
}

/// Text form of any result set, ready for a summary prompt.
pub fn render_result_set(results: &ResultSet, registry: &EncoderRegistry) -> Result<String> {
    match results {
        ResultSet::Rows(rows) => render_rows(rows),
        ResultSet::Documents(docs) => render_documents(docs, registry),
    }
}
