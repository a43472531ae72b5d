//! Schema model shared by both backends
//!
//! A `SchemaMap` maps a unit name (table or collection) to its descriptor.
//! The JSON shape produced by serde is the one shown to the LLM during target
//! selection and the one accepted for schema cache files.

pub mod introspector;

pub use introspector::{SchemaIntrospector, SchemaSource, SAMPLE_LIMIT};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub type SchemaMap = BTreeMap<String, UnitDescriptor>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub columns: Vec<ColumnDescriptor>,
    /// `<table>.<column> -> <referenced_table>.<referenced_column>`
    #[serde(default)]
    pub relationships: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub fields: Vec<FieldDescriptor>,
    /// Key signatures of secondary indexes
    #[serde(default)]
    pub indexes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitDescriptor {
    Table(TableDescriptor),
    Collection(CollectionDescriptor),
}

impl UnitDescriptor {
    pub fn as_table(&self) -> Option<&TableDescriptor> {
        match self {
            UnitDescriptor::Table(t) => Some(t),
            UnitDescriptor::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionDescriptor> {
        match self {
            UnitDescriptor::Collection(c) => Some(c),
            UnitDescriptor::Table(_) => None,
        }
    }
}

/// Read a schema cache previously written with [`save_schema_cache`].
pub fn load_schema_cache(path: &Path) -> Result<SchemaMap> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn save_schema_cache(path: &Path, schema: &SchemaMap) -> Result<()> {
    let text = serde_json::to_string_pretty(schema)?;
    std::fs::write(path, text)?;
    Ok(())
}
