//! Englishy embedding
//!
//! Embedding providers (OpenAI, Ollama) behind a common trait, and the
//! batching, retrying [`Encoder`] the pipeline talks to.

mod encoder;
mod http;
mod ollama;
mod openai;
mod provider;
mod retry;
mod types;

pub use encoder::Encoder;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::{provider_from_config, EmbeddingProvider};
pub use retry::RetryPolicy;
pub use tokio_util::sync::CancellationToken;
pub use types::{
    OllamaEmbedRequest, OllamaEmbedResponse, OpenAiEmbeddingData, OpenAiEmbeddingRequest,
    OpenAiEmbeddingResponse,
};
