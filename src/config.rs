//! Connection resolution and runtime settings
//!
//! Settings are read through a lookup function so the same code serves the
//! process environment (after `.env` loading) and in-memory maps in tests.

use crate::backend::BackendKind;
use crate::error::{NlqError, Result};
use crate::llm::LlmProvider;
use std::collections::HashMap;
use std::fmt;
use url::Url;

pub const POSTGRES_HOST: &str = "POSTGRES_HOST";
pub const POSTGRES_PORT: &str = "POSTGRES_PORT";
pub const POSTGRES_DATABASE: &str = "POSTGRES_DATABASE";
pub const POSTGRES_USERNAME: &str = "POSTGRES_USERNAME";
pub const POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
pub const POSTGRES_SSLMODE: &str = "POSTGRES_SSLMODE";
pub const POSTGRES_SCHEMA: &str = "POSTGRES_SCHEMA";
pub const MONGODB_CONNECTION_STRING: &str = "MONGODB_CONNECTION_STRING";

pub const LLM_PROVIDER: &str = "LLM_PROVIDER";
pub const LLM_MODEL: &str = "LLM_MODEL";
pub const LLM_BASE_URL: &str = "LLM_BASE_URL";
pub const LLM_TEMPERATURE: &str = "LLM_TEMPERATURE";
pub const LLM_NUM_CTX: &str = "LLM_NUM_CTX";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

pub const DEFAULT_LLM_MODEL: &str = "mistral:7b";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_PG_SCHEMA: &str = "public";

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A ready-to-use connection string for one backend.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    kind: BackendKind,
    url: String,
}

impl ConnectionDescriptor {
    pub fn new(kind: BackendKind, url: impl Into<String>) -> Self {
        Self { kind, url: url.into() }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Connection string with the credential section masked, safe for logs.
    pub fn redacted(&self) -> String {
        match (self.url.find("://"), self.url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}://***@{}", &self.url[..scheme_end], &self.url[at + 1..])
            }
            _ => self.url.clone(),
        }
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("kind", &self.kind)
            .field("url", &self.redacted())
            .finish()
    }
}

/// LLM endpoint settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub num_ctx: u32,
}

/// Source of configuration values.
pub struct Settings {
    lookup: Lookup,
}

impl Settings {
    /// Settings backed by the process environment. Loads `.env` first if present.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self {
            lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }

    pub fn from_map(values: HashMap<String, String>) -> Self {
        Self {
            lookup: Box::new(move |key| values.get(key).cloned()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key).ok_or_else(|| {
            NlqError::Configuration(format!("{} is not set in environment variables", key))
        })
    }

    fn optional_non_empty(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    /// Resolve the connection descriptor for `kind`.
    pub fn resolve(&self, kind: BackendKind) -> Result<ConnectionDescriptor> {
        let url = match kind {
            BackendKind::Relational => {
                let ssl_mode = self.optional_non_empty(POSTGRES_SSLMODE);
                self.postgres_connection_string(ssl_mode.as_deref())?
            }
            BackendKind::Document => self.mongodb_connection_string()?,
        };
        Ok(ConnectionDescriptor::new(kind, url))
    }

    /// Build a PostgreSQL URL from the individual settings.
    ///
    /// Username and password are percent-encoded through `Url`, so characters
    /// such as `@`, `:` or a space reach the driver unchanged.
    pub fn postgres_connection_string(&self, ssl_mode: Option<&str>) -> Result<String> {
        let missing = |e: NlqError| match e {
            NlqError::Configuration(msg) => NlqError::Configuration(format!(
                "Missing required PostgreSQL configuration: {}",
                msg
            )),
            other => other,
        };

        let host = self.require(POSTGRES_HOST).map_err(missing)?;
        let port_raw = self.require(POSTGRES_PORT).map_err(missing)?;
        let database = self.require(POSTGRES_DATABASE).map_err(missing)?;
        let username = self.require(POSTGRES_USERNAME).map_err(missing)?;
        let password = self.require(POSTGRES_PASSWORD).map_err(missing)?;

        let port: u16 = port_raw.trim().parse().map_err(|_| {
            NlqError::Configuration(format!(
                "{} must be a port number, got '{}'",
                POSTGRES_PORT, port_raw
            ))
        })?;

        let mut conn = Url::parse(&format!("postgresql://{}:{}/{}", host.trim(), port, database))
            .map_err(|e| NlqError::Configuration(format!("Invalid PostgreSQL host or database: {}", e)))?;
        conn.set_username(&username)
            .and_then(|_| conn.set_password(Some(&password)))
            .map_err(|_| {
                NlqError::Configuration("PostgreSQL URL cannot carry credentials".to_string())
            })?;

        if let Some(mode) = ssl_mode {
            conn.query_pairs_mut().append_pair("sslmode", mode);
        }

        Ok(conn.into())
    }

    pub fn mongodb_connection_string(&self) -> Result<String> {
        self.require(MONGODB_CONNECTION_STRING)
    }

    /// Database schema searched during relational introspection.
    pub fn postgres_schema(&self) -> String {
        self.optional_non_empty(POSTGRES_SCHEMA)
            .unwrap_or_else(|| DEFAULT_PG_SCHEMA.to_string())
    }

    pub fn llm_settings(&self) -> Result<LlmSettings> {
        let provider: LlmProvider = match self.optional_non_empty(LLM_PROVIDER) {
            Some(name) => name.parse()?,
            None => LlmProvider::Ollama,
        };

        let model = self
            .optional_non_empty(LLM_MODEL)
            .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());

        let base_url = self.optional_non_empty(LLM_BASE_URL).unwrap_or_else(|| {
            match provider {
                LlmProvider::Ollama => DEFAULT_OLLAMA_URL,
                LlmProvider::OpenAi => DEFAULT_OPENAI_URL,
            }
            .to_string()
        });

        let api_key = match provider {
            LlmProvider::OpenAi => Some(self.require(OPENAI_API_KEY)?),
            LlmProvider::Ollama => self.optional_non_empty(OPENAI_API_KEY),
        };

        let temperature = match self.optional_non_empty(LLM_TEMPERATURE) {
            Some(raw) => raw.parse::<f32>().map_err(|_| {
                NlqError::Configuration(format!("{} must be a number, got '{}'", LLM_TEMPERATURE, raw))
            })?,
            None => 0.1,
        };

        let num_ctx = match self.optional_non_empty(LLM_NUM_CTX) {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                NlqError::Configuration(format!("{} must be an integer, got '{}'", LLM_NUM_CTX, raw))
            })?,
            None => 4096,
        };

        Ok(LlmSettings {
            provider,
            model,
            base_url,
            api_key,
            temperature,
            num_ctx,
        })
    }
}
