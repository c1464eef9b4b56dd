use chrono::{DateTime, Utc};
use englishy_common::logger::INDEX_NOT_READY_TARGET;
use englishy_common::{EnglishyError, Result};
use englishy_embed::{CancellationToken, Encoder};
use englishy_ingest::Chunk;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::flat::FlatIpIndex;
use crate::persist::{read_index, write_index};
use crate::similarity::normalized;
use crate::types::{IndexInfo, IndexStatus, SearchResult, SearchResults};

/// Chunks and their vectors; row `i` of `flat` belongs to `chunks[i]`
struct IndexData {
    flat: FlatIpIndex,
    chunks: Vec<Chunk>,
    built_at: Option<DateTime<Utc>>,
}

/// Similarity index over chunks
///
/// Built once from a full chunk/vector batch or loaded from disk, then
/// read-only. Searching takes `&self`, so an `Arc<VectorIndex>` can serve
/// concurrent queries; rebuilding or loading needs `&mut self`.
pub struct VectorIndex {
    data: Option<IndexData>,
    status: IndexStatus,
    path: Option<PathBuf>,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex {
    /// Create new empty index without storage
    pub fn new() -> Self {
        Self {
            data: None,
            status: IndexStatus::Empty,
            path: None,
        }
    }

    /// Create new empty index that persists to `path` after every build
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new()
        }
    }

    /// Create index bound to `path` and load it if both files exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut index = Self::with_path(path.clone());
        index.load(&path)?;
        Ok(index)
    }

    pub fn status(&self) -> IndexStatus {
        self.status
    }

    /// Whether searches can return results
    pub fn is_ready(&self) -> bool {
        self.data.is_some()
    }

    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.chunks.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector length, once built or loaded
    pub fn dimension(&self) -> Option<usize> {
        self.data.as_ref().map(|d| d.flat.dimension())
    }

    /// Indexed chunks in row order
    pub fn chunks(&self) -> &[Chunk] {
        self.data
            .as_ref()
            .map(|d| d.chunks.as_slice())
            .unwrap_or_default()
    }

    /// Replace the index contents with `chunks` and their `vectors`
    ///
    /// Both sequences must have the same length and all vectors the same
    /// dimension. Vectors are normalized so inner product equals cosine
    /// similarity. Non-finite components are rejected. An empty batch is a
    /// no-op. When a storage path is set the new index is written first, and
    /// any error, including a failed write, keeps the previous contents.
    pub fn build(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(EnglishyError::dimension_mismatch(
                chunks.len(),
                vectors.len(),
                "build: vectors per chunk",
            ));
        }

        if chunks.is_empty() {
            warn!("No chunks to index; index left unchanged");
            return Ok(());
        }

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(EnglishyError::invalid_input("Cannot index zero-length vectors"));
        }

        info!("Building index: {} chunks, dimension {}", chunks.len(), dimension);
        let flat = FlatIpIndex::from_embeddings(&vectors, dimension)?;
        let built_at = Some(Utc::now());

        if let Some(path) = &self.path {
            write_index(path, &flat, &chunks, built_at)?;
            info!("Index saved to {} ({} chunks)", path.display(), chunks.len());
        }

        self.data = Some(IndexData {
            flat,
            chunks,
            built_at,
        });
        self.status = IndexStatus::Built;

        info!("Index built with {} chunks", self.len());
        Ok(())
    }

    /// Top-`k` chunks most similar to `query`
    ///
    /// An index that was never built or loaded answers with an empty result
    /// set and a warning on the `englishy::index_not_ready` target. A query
    /// of the wrong length is a `DimensionMismatch` error, one with NaN or
    /// infinite components is `InvalidInput`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<SearchResults> {
        let Some(data) = &self.data else {
            warn!(
                target: INDEX_NOT_READY_TARGET,
                "Search on an index that was never built or loaded; returning no results"
            );
            return Ok(SearchResults::new());
        };

        if query.len() != data.flat.dimension() {
            return Err(EnglishyError::dimension_mismatch(
                data.flat.dimension(),
                query.len(),
                "search: query vector",
            ));
        }

        if query.iter().any(|x| !x.is_finite()) {
            return Err(EnglishyError::invalid_input(
                "Query vector contains non-finite values",
            ));
        }

        if k == 0 {
            return Ok(SearchResults::new());
        }

        let query = normalized(query);
        let mut results = SearchResults::new();
        for (score, row) in data.flat.search(&query, k) {
            match data.chunks.get(row) {
                Some(chunk) => results.add(SearchResult::from_chunk(chunk, score)),
                None => warn!("Search hit row {} outside {} chunks", row, data.chunks.len()),
            }
        }

        debug!("Search returned {} results (k={})", results.len(), k);
        Ok(results)
    }

    /// Encode `text` and search with its embedding
    pub async fn search_by_text(&self, text: &str, encoder: &Encoder, k: usize) -> Result<SearchResults> {
        self.search_by_text_with_cancel(text, encoder, k, &CancellationToken::new())
            .await
    }

    /// Same as [`Self::search_by_text`]; cancelling `cancel` aborts the
    /// query encoding with an `Encoding(Cancelled)` error
    pub async fn search_by_text_with_cancel(
        &self,
        text: &str,
        encoder: &Encoder,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<SearchResults> {
        if !self.is_ready() {
            return self.search(&[], k);
        }

        let query = encoder.encode_single_with_cancel(text, cancel).await?;
        self.search(&query, k)
    }

    /// Write the index to `path.idx` and `path.chunks`
    pub fn persist(&self, path: &Path) -> Result<()> {
        let data = self.data.as_ref().ok_or_else(|| {
            EnglishyError::index_not_ready("Nothing to persist: index was never built or loaded")
        })?;

        write_index(path, &data.flat, &data.chunks, data.built_at)?;
        info!("Index saved to {} ({} chunks)", path.display(), data.chunks.len());
        Ok(())
    }

    /// Replace the index contents with the files at `path`
    ///
    /// Missing files leave the index unchanged with a warning on the
    /// `englishy::index_file_missing` target. Files that disagree with each
    /// other are an `IndexCorrupt` error.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let Some(stored) = read_index(path)? else {
            return Ok(());
        };

        self.data = Some(IndexData {
            flat: stored.flat,
            chunks: stored.chunks,
            built_at: stored.built_at,
        });
        self.status = IndexStatus::Loaded;
        self.path = Some(path.to_path_buf());

        info!(
            "Index loaded from {}: {} chunks, dimension {}",
            path.display(),
            self.len(),
            self.dimension().unwrap_or_default()
        );
        Ok(())
    }

    /// Status, size and shape of the index
    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            status: self.status,
            total_chunks: self.len(),
            dimension: self.dimension(),
            index_type: FlatIpIndex::INDEX_TYPE.to_string(),
            path: self.path.clone(),
            built_at: self.data.as_ref().and_then(|d| d.built_at),
        }
    }
}
