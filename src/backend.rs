//! Backend kinds supported by a query session

use crate::error::{NlqError, Result};
use std::fmt;
use std::str::FromStr;

/// Which data-store family a session targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// PostgreSQL (tables, SQL text)
    Relational,
    /// MongoDB (collections, aggregation pipelines)
    Document,
}

impl BackendKind {
    /// Word used for the addressable unit of this backend in prompts and logs.
    pub fn unit_noun(&self) -> &'static str {
        match self {
            BackendKind::Relational => "table",
            BackendKind::Document => "collection",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Relational => write!(f, "postgres"),
            BackendKind::Document => write!(f, "mongodb"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = NlqError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "relational" | "sql" => Ok(BackendKind::Relational),
            "mongodb" | "mongo" | "document" => Ok(BackendKind::Document),
            other => Err(NlqError::UnsupportedBackend(format!(
                "'{}' (expected 'postgres' or 'mongodb')",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_names() {
        assert_eq!("postgres".parse::<BackendKind>().unwrap(), BackendKind::Relational);
        assert_eq!("PostgreSQL".parse::<BackendKind>().unwrap(), BackendKind::Relational);
        assert_eq!(" mongodb ".parse::<BackendKind>().unwrap(), BackendKind::Document);
        assert_eq!("document".parse::<BackendKind>().unwrap(), BackendKind::Document);
    }

    #[test]
    fn test_parse_unknown_name() {
        let err = "cassandra".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, NlqError::UnsupportedBackend(_)));
    }

    #[test]
    fn test_display_round_trips() {
        for kind in [BackendKind::Relational, BackendKind::Document] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }
}
