use englishy_common::{AppConfig, EncodingErrorKind, EnglishyError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::provider::{provider_from_config, EmbeddingProvider};
use crate::retry::RetryPolicy;

/// Text used to discover the vector length of a provider
const DIMENSION_PROBE: &str = "test";

/// Default texts per provider call
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Batching, retrying front-end over an [`EmbeddingProvider`]
///
/// One provider call is made per batch. Retryable failures (rate limits,
/// network, 5xx) are retried with exponential backoff; anything else fails
/// the whole call. No input is ever silently dropped: every successful call
/// returns exactly one vector per input text.
pub struct Encoder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    retry: RetryPolicy,
    show_progress: bool,
    dimension: OnceCell<usize>,
}

impl Encoder {
    /// Create new encoder with default batching and retry policy
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            show_progress: false,
            dimension: OnceCell::new(),
        }
    }

    /// Build encoder and provider from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let provider = provider_from_config(config)?;
        Ok(Self::new(provider)
            .with_batch_size(config.embedding_batch_size)
            .with_retry_policy(RetryPolicy::with_attempts(config.max_retries)))
    }

    /// Set texts per provider call
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Show a progress bar on stderr while encoding batches
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Embedding model name
    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Texts per provider call
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Encode texts, one vector per text, in input order
    pub async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.encode_batch_with_cancel(texts, &CancellationToken::new())
            .await
    }

    /// Encode texts, aborting with a `Cancelled` encoding error when `cancel` fires
    pub async fn encode_batch_with_cancel(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_count = texts.len().div_ceil(self.batch_size);
        info!(
            "Encoding {} texts in {} batches using {}/{}",
            texts.len(),
            batch_count,
            self.provider.name(),
            self.provider.model()
        );

        let progress = self.progress_bar(texts.len() as u64);
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!("Encoding batch {}/{} ({} texts)", i + 1, batch_count, batch.len());

            let batch_vectors = match self.embed_with_retry(batch, cancel).await {
                Ok(v) => v,
                Err(e) => {
                    progress.abandon();
                    return Err(e);
                }
            };
            self.check_batch(batch.len(), &batch_vectors)?;

            vectors.extend(batch_vectors);
            progress.inc(batch.len() as u64);
        }

        progress.finish_and_clear();
        info!("Encoded {} texts", vectors.len());
        Ok(vectors)
    }

    /// Encode one text
    pub async fn encode_single(&self, text: &str) -> Result<Vec<f32>> {
        self.encode_single_with_cancel(text, &CancellationToken::new())
            .await
    }

    /// Encode one text, giving up with `Encoding(Cancelled)` once `cancel` fires
    pub async fn encode_single_with_cancel(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        let mut vectors = self.embed_with_retry(&[text.to_string()], cancel).await?;
        self.check_batch(1, &vectors)?;
        vectors.pop().ok_or_else(|| {
            EnglishyError::encoding(EncodingErrorKind::InvalidResponse, "Empty embedding response")
        })
    }

    /// Vector length produced by the provider, probed once and cached
    pub async fn dimension(&self) -> Result<usize> {
        self.dimension
            .get_or_try_init(|| async {
                debug!("Probing embedding dimension for {}", self.provider.model());
                let vector = self.encode_single(DIMENSION_PROBE).await?;
                Ok::<usize, EnglishyError>(vector.len())
            })
            .await
            .copied()
    }

    /// One provider round-trip with retry for transient failures
    async fn embed_with_retry(
        &self,
        batch: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 1;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                result = self.provider.embed(batch) => result,
            };

            match result {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Embedding request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(cancelled()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reject short, long or ragged batches
    fn check_batch(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
        if vectors.len() != expected {
            return Err(EnglishyError::encoding(
                EncodingErrorKind::InvalidResponse,
                format!(
                    "{} returned {} vectors for {} texts",
                    self.provider.name(),
                    vectors.len(),
                    expected
                ),
            ));
        }

        for vector in vectors {
            if vector.is_empty() {
                return Err(EnglishyError::encoding(
                    EncodingErrorKind::InvalidResponse,
                    format!("{} returned an empty embedding", self.provider.name()),
                ));
            }

            let dim = *self.dimension.get().unwrap_or(&vector.len());
            if vector.len() != dim {
                return Err(EnglishyError::encoding(
                    EncodingErrorKind::InvalidResponse,
                    format!(
                        "{} returned a {}-dimensional embedding, expected {}",
                        self.provider.name(),
                        vector.len(),
                        dim
                    ),
                ));
            }
            let _ = self.dimension.set(dim);
        }

        Ok(())
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} texts ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

fn cancelled() -> EnglishyError {
    EnglishyError::encoding(EncodingErrorKind::Cancelled, "Encoding cancelled")
}
