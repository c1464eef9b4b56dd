use async_trait::async_trait;
use englishy_common::{EncodingErrorKind, EnglishyError, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::http::{build_client, send_json};
use crate::provider::EmbeddingProvider;
use crate::types::{OllamaEmbedRequest, OllamaEmbedResponse};

/// Ollama embedding client
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaProvider {
    /// Create new Ollama client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        let client = build_client(timeout)?;

        info!("Ollama embedding client initialized: {} ({})", base_url, model);
        Ok(Self {
            base_url,
            model,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        debug!("Generating embeddings - Model: {}, Batch: {}", self.model, texts.len());

        let request = OllamaEmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let response: OllamaEmbedResponse =
            send_json("Ollama", self.client.post(&url).json(&request)).await?;

        if response.embeddings.len() != texts.len() {
            return Err(EnglishyError::encoding(
                EncodingErrorKind::InvalidResponse,
                format!(
                    "Ollama returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    texts.len()
                ),
            ));
        }

        Ok(response.embeddings)
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape() {
        let body = r#"{"model": "nomic-embed-text", "embeddings": [[0.1, 0.2], [0.3, 0.4]]}"#;
        let response: OllamaEmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[1], vec![0.3, 0.4]);
    }
}
