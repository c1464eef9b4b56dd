use async_trait::async_trait;
use englishy_common::{AppConfig, EmbeddingProviderKind, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

/// Common trait for embedding backends: text batch in, vector batch out
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts in one round-trip, one vector per input in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Backend name for logs
    fn name(&self) -> &str;

    /// Embedding model name
    fn model(&self) -> &str;
}

/// Build the provider selected by the configuration
pub fn provider_from_config(config: &AppConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let provider: Arc<dyn EmbeddingProvider> = match config.embedding_provider {
        EmbeddingProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            &config.openai_base_url,
            &config.embedding_model,
            config.openai_api_key.clone(),
            timeout,
        )?),
        EmbeddingProviderKind::Ollama => Arc::new(OllamaProvider::new(
            &config.ollama_base_url,
            &config.embedding_model,
            timeout,
        )?),
    };
    Ok(provider)
}
