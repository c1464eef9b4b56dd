use serde::{Deserialize, Serialize};

/// OpenAI `/embeddings` request
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiEmbeddingRequest {
    /// Model name (e.g., "text-embedding-3-small")
    pub model: String,

    /// Batch of input texts
    pub input: Vec<String>,

    /// Always "float"
    pub encoding_format: String,
}

/// One embedding inside an OpenAI response
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiEmbeddingData {
    /// Position of the input this embedding belongs to
    pub index: usize,

    pub embedding: Vec<f32>,
}

/// OpenAI `/embeddings` response
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiEmbeddingResponse {
    pub data: Vec<OpenAiEmbeddingData>,

    #[serde(default)]
    pub model: String,
}

/// Ollama `/api/embed` request
#[derive(Debug, Clone, Serialize)]
pub struct OllamaEmbedRequest {
    /// Model name (e.g., "nomic-embed-text")
    pub model: String,

    /// Batch of input texts
    pub input: Vec<String>,
}

/// Ollama `/api/embed` response
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaEmbedResponse {
    #[serde(default)]
    pub model: String,

    /// One embedding per input, in input order
    pub embeddings: Vec<Vec<f32>>,
}
