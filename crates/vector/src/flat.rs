use englishy_common::{EnglishyError, Result};
use ndarray::{Array2, ArrayView1};

use crate::similarity::l2_normalize;

/// Flat inner-product index over unit-length rows
///
/// Row `i` is the embedding of the `i`-th chunk. Search is a full scan, so
/// results are exact.
#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    vectors: Array2<f32>,
}

impl FlatIpIndex {
    /// Index type reported by diagnostics
    pub const INDEX_TYPE: &'static str = "FlatIP";

    /// Build from raw embeddings, normalizing every row
    ///
    /// All rows must have length `dimension` and hold only finite values.
    pub fn from_embeddings(embeddings: &[Vec<f32>], dimension: usize) -> Result<Self> {
        let mut data = Vec::with_capacity(embeddings.len() * dimension);
        for (row, embedding) in embeddings.iter().enumerate() {
            if embedding.len() != dimension {
                return Err(EnglishyError::dimension_mismatch(
                    dimension,
                    embedding.len(),
                    format!("embedding row {}", row),
                ));
            }
            if embedding.iter().any(|x| !x.is_finite()) {
                return Err(EnglishyError::invalid_input(format!(
                    "Embedding row {} contains non-finite values",
                    row
                )));
            }
            let start = data.len();
            data.extend_from_slice(embedding);
            l2_normalize(&mut data[start..]);
        }
        Self::from_normalized(embeddings.len(), dimension, data)
    }

    /// Wrap row-major values that are already normalized
    pub fn from_normalized(rows: usize, dimension: usize, data: Vec<f32>) -> Result<Self> {
        let vectors = Array2::from_shape_vec((rows, dimension), data).map_err(|e| {
            EnglishyError::index_corrupt(format!(
                "Cannot shape {} x {} vector matrix: {}",
                rows, dimension, e
            ))
        })?;
        Ok(Self { vectors })
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector length
    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    /// Row-major values, for persistence
    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.vectors.iter().copied()
    }

    /// Top-`k` rows by inner product with `query` as `(score, row)` pairs
    ///
    /// `query` must already be normalized and match [`Self::dimension`].
    /// Scores are non-increasing; equal scores keep ascending row order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(f32, usize)> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        let scores = self.vectors.dot(&ArrayView1::from(query));
        let mut hits: Vec<(f32, usize)> = scores
            .iter()
            .enumerate()
            .map(|(row, &score)| (score, row))
            .collect();

        hits.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        hits.truncate(k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::normalized;

    fn index() -> FlatIpIndex {
        FlatIpIndex::from_embeddings(
            &[vec![1.0, 0.0], vec![0.0, 2.0], vec![1.0, 1.0], vec![3.0, 0.0]],
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_rows_are_normalized() {
        let index = index();
        assert_eq!(index.len(), 4);
        assert_eq!(index.dimension(), 2);
        let values: Vec<f32> = index.values().collect();
        assert!((values[3] - 1.0).abs() < 1e-6);
        assert!((values[4] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_search_orders_scores_and_breaks_ties_by_row() {
        let hits = index().search(&normalized(&[1.0, 0.0]), 3);
        let rows: Vec<usize> = hits.iter().map(|h| h.1).collect();
        assert_eq!(rows, vec![0, 3, 2]);
        assert!((hits[0].0 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_bounds() {
        let index = index();
        assert!(index.search(&[1.0, 0.0], 0).is_empty());
        assert_eq!(index.search(&[1.0, 0.0], 10).len(), 4);
    }

    #[test]
    fn test_rejects_ragged_rows() {
        let err = FlatIpIndex::from_embeddings(&[vec![1.0, 0.0], vec![1.0]], 2).unwrap_err();
        assert!(matches!(
            err,
            EnglishyError::DimensionMismatch { expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn test_rejects_non_finite_rows() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let err = FlatIpIndex::from_embeddings(&[vec![1.0, 0.0], vec![bad, 1.0]], 2)
                .unwrap_err();
            assert!(matches!(err, EnglishyError::InvalidInput(_)));
        }
    }
}
