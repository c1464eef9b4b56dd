//! Englishy vector index
//!
//! Flat inner-product index over normalized chunk embeddings, persisted as
//! two companion files.

mod flat;
mod index;
mod persist;
mod similarity;
mod types;

pub use flat::FlatIpIndex;
pub use index::VectorIndex;
pub use persist::{companion_path, CHUNKS_EXTENSION, INDEX_EXTENSION};
pub use similarity::{cosine_similarity, l2_normalize};
pub use types::{IndexInfo, IndexStatus, SearchResult, SearchResults};
