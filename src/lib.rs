pub mod backend;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod interpret;
pub mod llm;
pub mod query_builder;
pub mod schema;

pub use backend::BackendKind;
pub use config::{ConnectionDescriptor, LlmSettings, Settings};
pub use context::{QueryOptions, RequestContext};
pub use error::{NlqError, Result};
pub use interpret::EncoderRegistry;
pub use llm::{LanguageModel, LlmClient, LlmProvider, ResponseFormat};
pub use query_builder::{
    parse_pipeline, DocumentQueryBuilder, QueryArtifact, QueryBuilder, QueryOutcome,
    RelationalQueryBuilder, ResultSet,
};
pub use schema::{SchemaIntrospector, SchemaMap, SchemaSource, UnitDescriptor};
