//! Per-request state threaded through introspection, generation and execution

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-supplied knobs for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Explicit unit to query; takes precedence over LLM selection.
    #[serde(default, alias = "target_table", alias = "target_collection")]
    pub target: Option<String>,
}

impl QueryOptions {
    pub fn target_table(name: impl Into<String>) -> Self {
        Self {
            target: Some(name.into()),
        }
    }

    pub fn target_collection(name: impl Into<String>) -> Self {
        Self::target_table(name)
    }
}

/// State for one logical request. Holds the selected target unit so that a
/// shared `QueryBuilder` never stores per-request data.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    target: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            target: None,
        }
    }

    /// Context with the target already fixed, e.g. when executing a stored
    /// pipeline against a known collection.
    pub fn with_target(target: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            target: Some(target.into()),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub(crate) fn select_target(&mut self, target: impl Into<String>) {
        self.target = Some(target.into());
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
