use async_trait::async_trait;
use englishy_common::{EncodingErrorKind, EnglishyError, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use crate::http::{build_client, send_json};
use crate::provider::EmbeddingProvider;
use crate::types::{OpenAiEmbeddingRequest, OpenAiEmbeddingResponse};

/// OpenAI-compatible embedding client
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    base_url: String,
    model: String,
    api_key: String,
    client: Client,
}

impl OpenAiProvider {
    /// Create new OpenAI client; fails with an auth error when no key is available
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            EnglishyError::encoding(
                EncodingErrorKind::Auth,
                "OpenAI API key is required (set OPENAI_API_KEY)",
            )
        })?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let model = model.into();
        let client = build_client(timeout)?;

        info!("OpenAI embedding client initialized: {} ({})", base_url, model);
        Ok(Self {
            base_url,
            model,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        debug!("Sending embedding request to OpenAI - Model: {}, Batch: {}", self.model, texts.len());

        let request = OpenAiEmbeddingRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
            encoding_format: "float".to_string(),
        };

        let response: OpenAiEmbeddingResponse = send_json(
            "OpenAI",
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request),
        )
        .await?;

        vectors_in_input_order(response, texts.len())
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Reorder response data by `index` and check that every input got exactly one vector
fn vectors_in_input_order(response: OpenAiEmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in response.data {
        let slot = slots.get_mut(item.index).ok_or_else(|| {
            EnglishyError::encoding(
                EncodingErrorKind::InvalidResponse,
                format!("OpenAI returned index {} for a batch of {}", item.index, expected),
            )
        })?;
        if slot.replace(item.embedding).is_some() {
            return Err(EnglishyError::encoding(
                EncodingErrorKind::InvalidResponse,
                format!("OpenAI returned index {} twice", item.index),
            ));
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| {
                EnglishyError::encoding(
                    EncodingErrorKind::InvalidResponse,
                    format!("OpenAI returned no embedding for input {}", i),
                )
            })
        })
        .collect()
}
