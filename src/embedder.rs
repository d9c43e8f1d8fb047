//! Embedding generators: a remote OpenAI-compatible API and local fastembed
//! models.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{ EmbeddingModel, InitOptions, TextEmbedding };
use reqwest::Client;
use serde::{ Deserialize, Serialize };
use tracing::debug;

use crate::config::{ EmbeddingBackend, EngineConfig };
use crate::error::{ ConfigError, EmbeddingError };
use crate::models::EmbeddingVector;

#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError>;

    fn model(&self) -> &str;
}

/// Picks the generator for the configured backend.
pub fn from_config(config: &EngineConfig) -> anyhow::Result<Arc<dyn EmbeddingGenerator>> {
    let generator: Arc<dyn EmbeddingGenerator> = match &config.backend {
        EmbeddingBackend::OpenAi { api_key, base_url } =>
            Arc::new(
                OpenAiEmbedder::new(
                    api_key.clone(),
                    base_url.clone(),
                    config.model.clone(),
                    config.dimension
                )
            ),
        EmbeddingBackend::Local => Arc::new(LocalEmbedder::new(&config.model)?),
    };
    Ok(generator)
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: String, model: String, dimensions: usize) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimensions,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingGenerator for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
            // Only the v3 models accept a requested width.
            dimensions: self.model.starts_with("text-embedding-3").then_some(self.dimensions),
        };

        let response = self.client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send().await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmbeddingError::Request(format!("{}: {}", status, body)));
        }

        let parsed: EmbeddingResponse = response
            .json().await
            .map_err(|e| EmbeddingError::Request(format!("Failed to parse response: {}", e)))?;

        let embedding = parsed.data.into_iter().next().ok_or(EmbeddingError::Empty)?.embedding;
        debug!(model = %self.model, length = embedding.len(), "Received embedding");
        Ok(EmbeddingVector::new(embedding))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// In-process model through fastembed. Inference is CPU bound and runs on
/// the blocking pool.
pub struct LocalEmbedder {
    model_name: String,
    model: Arc<TextEmbedding>,
}

impl LocalEmbedder {
    pub fn new(model_name: &str) -> anyhow::Result<Self> {
        let model = match model_name {
            "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            "nomic-embed-text-v1.5" => EmbeddingModel::NomicEmbedTextV15,
            other => {
                return Err(ConfigError::UnsupportedModel(other.to_string()).into());
            }
        };

        let embedding = TextEmbedding::try_new(
            InitOptions::new(model).with_show_download_progress(true)
        )?;

        Ok(Self {
            model_name: model_name.to_string(),
            model: Arc::new(embedding),
        })
    }
}

#[async_trait]
impl EmbeddingGenerator for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let input = text.to_string();

        let embeddings = tokio::task
            ::spawn_blocking(move || model.embed(vec![input], None))
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        embeddings.into_iter().next().map(EmbeddingVector::new).ok_or(EmbeddingError::Empty)
    }

    fn model(&self) -> &str {
        &self.model_name
    }
}
