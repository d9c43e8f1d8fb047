//! Process-wide settings, read once at startup.
//!
//! Values come from the environment (after `.env` is loaded in `main`). The
//! resulting [`EngineConfig`] is immutable and passed explicitly to the
//! engine, so tests build one by hand instead of touching the environment.

use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_MODEL: &str = "text-embedding-3-large";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_SCAN_BUDGET: usize = 50_000;

#[derive(Clone, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Remote `text-embedding-*` models.
    OpenAi {
        api_key: String,
        base_url: String,
    },
    /// fastembed model running in-process.
    Local,
}

// The key never reaches logs or panic messages.
impl fmt::Debug for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingBackend::OpenAi { base_url, .. } =>
                f
                    .debug_struct("OpenAi")
                    .field("api_key", &"<redacted>")
                    .field("base_url", base_url)
                    .finish(),
            EmbeddingBackend::Local => f.write_str("Local"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub namespace: String,
    pub database: String,
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            namespace: "records".to_string(),
            database: "embeddings".to_string(),
            table: "complaints".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub model: String,
    pub dimension: usize,
    pub backend: EmbeddingBackend,
    pub store: StoreConfig,
    pub scan_budget: usize,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let model = get("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let backend = if is_openai_model(&model) {
            EmbeddingBackend::OpenAi {
                api_key: get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?,
                base_url: get("OPENAI_BASE_URL").unwrap_or_else(||
                    DEFAULT_OPENAI_BASE_URL.to_string()
                ),
            }
        } else {
            EmbeddingBackend::Local
        };

        let dimension = match get("EMBEDDING_DIM") {
            Some(raw) => positive("EMBEDDING_DIM", &raw)?,
            None =>
                known_dimension(&model).ok_or_else(||
                    ConfigError::UnsupportedModel(model.clone())
                )?,
        };

        let defaults = StoreConfig::default();
        let store = StoreConfig {
            path: get("STORE_PATH").map(PathBuf::from).unwrap_or(defaults.path),
            namespace: get("STORE_NAMESPACE").unwrap_or(defaults.namespace),
            database: get("STORE_DATABASE").unwrap_or(defaults.database),
            table: get("STORE_TABLE").unwrap_or(defaults.table),
        };

        let scan_budget = match get("SCAN_BUDGET") {
            Some(raw) => positive("SCAN_BUDGET", &raw)?,
            None => DEFAULT_SCAN_BUDGET,
        };

        Ok(Self {
            model,
            dimension,
            backend,
            store,
            scan_budget,
        })
    }
}

pub fn is_openai_model(model: &str) -> bool {
    model.starts_with("text-embedding-")
}

/// Output width of the models this crate knows how to drive.
pub fn known_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-large" => Some(3072),
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "all-minilm-l6-v2" | "bge-small-en-v1.5" => Some(384),
        "bge-base-en-v1.5" | "nomic-embed-text-v1.5" => Some(768),
        _ => None,
    }
}

fn positive(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| ConfigError::InvalidValue { key, value: raw.to_string() })
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("record-embeddings")
        .join("db")
}
