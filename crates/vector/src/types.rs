use chrono::{DateTime, Utc};
use englishy_ingest::{Chunk, ChunkKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Index lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    /// Never built or loaded
    #[serde(rename = "not_built")]
    Empty,
    /// Built in this process
    Built,
    /// Loaded from disk
    Loaded,
}

/// Read-only index diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub status: IndexStatus,

    /// Number of indexed chunks
    pub total_chunks: usize,

    /// Vector length, once built or loaded
    pub dimension: Option<usize>,

    /// Similarity structure type
    pub index_type: String,

    /// Storage base path, if any
    pub path: Option<PathBuf>,

    /// When the indexed data was built
    pub built_at: Option<DateTime<Utc>>,
}

/// Search result: a copy of the matched chunk plus its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Chunk ID
    pub id: String,

    /// Record the chunk was cut from
    pub parent_record_id: String,

    pub kind: ChunkKind,

    #[serde(default)]
    pub fields: Map<String, Value>,

    pub text: String,

    /// Cosine similarity with the query (-1.0 to 1.0)
    pub score: f32,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl SearchResult {
    /// Create result from an indexed chunk
    pub fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        Self {
            id: chunk.id.clone(),
            parent_record_id: chunk.parent_record_id.clone(),
            kind: chunk.kind,
            fields: chunk.fields.clone(),
            text: chunk.text.clone(),
            score,
            metadata: chunk.metadata.clone(),
        }
    }
}

/// Ordered collection of search results
///
/// No deduplication is performed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchResults {
    results: Vec<SearchResult>,
}

impl SearchResults {
    /// Create empty result set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result
    pub fn add(&mut self, result: SearchResult) {
        self.results.push(result);
    }

    /// Results by descending score, truncated to `limit` when given
    ///
    /// Equal scores keep insertion order.
    pub fn top(&self, limit: Option<usize>) -> Vec<SearchResult> {
        let mut sorted = self.results.clone();
        sorted.sort_by(|a, b| b.score.total_cmp(&a.score));
        if let Some(limit) = limit {
            sorted.truncate(limit);
        }
        sorted
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, SearchResult> {
        self.results.iter()
    }
}

impl FromIterator<SearchResult> for SearchResults {
    fn from_iter<I: IntoIterator<Item = SearchResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SearchResults {
    type Item = &'a SearchResult;
    type IntoIter = std::slice::Iter<'a, SearchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

impl IntoIterator for SearchResults {
    type Item = SearchResult;
    type IntoIter = std::vec::IntoIter<SearchResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, score: f32) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            parent_record_id: "q_1".to_string(),
            kind: ChunkKind::AnswerText,
            fields: Map::new(),
            text: id.to_string(),
            score,
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_top_sorts_and_limits() {
        let mut results = SearchResults::new();
        results.add(result("low", 0.1));
        results.add(result("high", 0.9));
        results.add(result("mid", 0.5));

        let ids: Vec<String> = results.top(None).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);

        let top = results.top(Some(2));
        assert_eq!(top.len(), 2);
        assert_eq!(top[1].id, "mid");

        // reading does not reorder
        assert_eq!(results.iter().next().map(|r| r.id.as_str()), Some("low"));
    }

    #[test]
    fn test_duplicates_are_kept() {
        let results: SearchResults = vec![result("a", 0.5), result("a", 0.5)].into_iter().collect();
        assert_eq!(results.top(None).len(), 2);
    }

    #[test]
    fn test_status_names() {
        assert_eq!(serde_json::to_string(&IndexStatus::Empty).unwrap(), "\"not_built\"");
        assert_eq!(serde_json::to_string(&IndexStatus::Loaded).unwrap(), "\"loaded\"");
    }
}
