use englishy_common::{EnglishyError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{debug, info};

use crate::record::{GenericRecord, MaterialRecord, QuestionMetadata, QuestionRecord, Record, TextRecord};
use crate::window::split_with_overlap;

/// Sentence boundaries: ASCII and full-width terminators, plus line breaks
const SENTENCE_PATTERN: &str = r"[.!?]+|[。！？]+|\n+";

/// Chunk type, used for field-level retrieval and merge compatibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    QuestionText,
    AnswerText,
    GrammarExplanation,
    LearningNote,
    Combined,
    Sentence,
    TextChunk,
}

impl ChunkKind {
    /// Stable snake_case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuestionText => "question_text",
            Self::AnswerText => "answer_text",
            Self::GrammarExplanation => "grammar_explanation",
            Self::LearningNote => "learning_note",
            Self::Combined => "combined",
            Self::Sentence => "sentence",
            Self::TextChunk => "text_chunk",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One indexable unit of text derived from a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,

    /// Record this chunk was cut from
    pub parent_record_id: String,

    pub kind: ChunkKind,

    /// Non-empty chunk text
    pub text: String,

    /// Chunk-specific structure (field name, offsets, merge marker)
    #[serde(default)]
    pub fields: Map<String, Value>,

    /// Metadata inherited from the parent record
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Chunk {
    fn new(id: String, parent: &str, kind: ChunkKind, text: String) -> Self {
        Self {
            id,
            parent_record_id: parent.to_string(),
            kind,
            text,
            fields: Map::new(),
            metadata: Map::new(),
        }
    }

    fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether this chunk is the product of `merge_small_chunks`
    pub fn is_merged(&self) -> bool {
        self.fields.get("merged") == Some(&Value::Bool(true))
    }
}

/// Chunking parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Window size in characters for text records
    pub chunk_size: usize,

    /// Characters shared by consecutive windows
    pub overlap: usize,

    /// How far back from a window end to look for sentence punctuation
    pub boundary_lookback: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 50,
            boundary_lookback: 100,
        }
    }
}

impl ChunkerConfig {
    /// Create config with the default lookback
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            ..Self::default()
        }
    }

    /// Validate window parameters
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EnglishyError::invalid_input("chunk_size must be greater than 0"));
        }
        if self.overlap >= self.chunk_size {
            return Err(EnglishyError::invalid_input(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Record chunker
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
    sentence_pattern: Regex,
}

impl Chunker {
    /// Create new chunker
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        let sentence_pattern = Regex::new(SENTENCE_PATTERN)
            .map_err(|e| EnglishyError::config(format!("Invalid sentence pattern: {}", e)))?;
        Ok(Self {
            config,
            sentence_pattern,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk a sequence of records, preserving record order
    pub fn chunk(&self, records: &[Record]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = records.iter().flat_map(|r| self.chunk_record(r)).collect();
        info!("Created {} chunks from {} records", chunks.len(), records.len());
        chunks
    }

    /// Chunk a single record
    pub fn chunk_record(&self, record: &Record) -> Vec<Chunk> {
        match record {
            Record::Question(q) => self.chunk_question(q),
            Record::Material(m) => self.chunk_material(m),
            Record::Text(t) => self.chunk_text(t),
            Record::Generic(g) => self.chunk_generic(g),
        }
    }

    /// One chunk per non-empty field, or a single combined chunk
    fn chunk_question(&self, record: &QuestionRecord) -> Vec<Chunk> {
        let metadata = question_metadata(&record.metadata);
        let parts = [
            (&record.question, ChunkKind::QuestionText, "question"),
            (&record.answer, ChunkKind::AnswerText, "answer"),
            (&record.grammar, ChunkKind::GrammarExplanation, "grammar"),
            (&record.note, ChunkKind::LearningNote, "note"),
        ];

        let mut chunks: Vec<Chunk> = parts
            .into_iter()
            .filter(|(text, _, _)| !text.trim().is_empty())
            .map(|(text, kind, part)| {
                Chunk::new(
                    format!("{}_{}", record.id, part),
                    &record.id,
                    kind,
                    text.trim().to_string(),
                )
                .with_field("part", json!(part))
                .with_metadata(metadata.clone())
            })
            .collect();

        if chunks.is_empty() {
            let combined = record.search_text.trim();
            if !combined.is_empty() {
                chunks.push(
                    Chunk::new(
                        format!("{}_combined", record.id),
                        &record.id,
                        ChunkKind::Combined,
                        combined.to_string(),
                    )
                    .with_field("parts", json!(["question", "answer", "grammar", "note"]))
                    .with_metadata(metadata),
                );
            }
        }

        chunks
    }

    fn chunk_material(&self, record: &MaterialRecord) -> Vec<Chunk> {
        let metadata = match &record.content {
            Value::Object(map) => map.clone(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        self.sentence_chunks(&record.id, &record.search_text, metadata)
    }

    fn chunk_generic(&self, record: &GenericRecord) -> Vec<Chunk> {
        let metadata = record
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.sentence_chunks(&record.id, &record.search_text, metadata)
    }

    fn sentence_chunks(&self, record_id: &str, text: &str, metadata: Map<String, Value>) -> Vec<Chunk> {
        self.split_sentences(text)
            .into_iter()
            .enumerate()
            .map(|(i, sentence)| {
                Chunk::new(
                    format!("{}_sentence_{}", record_id, i + 1),
                    record_id,
                    ChunkKind::Sentence,
                    sentence,
                )
                .with_field("sentence_index", json!(i + 1))
                .with_metadata(metadata.clone())
            })
            .collect()
    }

    /// Whole text when it fits, otherwise overlapping windows
    fn chunk_text(&self, record: &TextRecord) -> Vec<Chunk> {
        let text = record.text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        if text.chars().count() <= self.config.chunk_size {
            return vec![Chunk::new(
                format!("{}_full", record.id),
                &record.id,
                ChunkKind::TextChunk,
                text.to_string(),
            )
            .with_field("lines", json!(record.lines))];
        }

        let chars: Vec<char> = text.chars().collect();
        let spans = split_with_overlap(
            text,
            self.config.chunk_size,
            self.config.overlap,
            self.config.boundary_lookback,
        );
        debug!("Split record {} into {} windows", record.id, spans.len());

        let mut chunks = Vec::with_capacity(spans.len());
        for span in spans {
            let window: String = chars[span.start..span.end].iter().collect();
            let window = window.trim();
            if window.is_empty() {
                continue;
            }

            let index = chunks.len() + 1;
            let mut metadata = Map::new();
            metadata.insert("chunk_index".to_string(), json!(index));

            chunks.push(
                Chunk::new(
                    format!("{}_chunk_{}", record.id, index),
                    &record.id,
                    ChunkKind::TextChunk,
                    window.to_string(),
                )
                .with_field("start", json!(span.start))
                .with_field("end", json!(span.end))
                .with_metadata(metadata),
            );
        }

        chunks
    }

    /// Split text into trimmed, non-empty sentences
    pub fn split_sentences(&self, text: &str) -> Vec<String> {
        self.sentence_pattern
            .split(text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn question_metadata(metadata: &QuestionMetadata) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in [
        ("prefecture", &metadata.prefecture),
        ("year", &metadata.year),
        ("question_no", &metadata.question_no),
        ("condition", &metadata.condition),
        ("subject", &metadata.subject),
        ("verb", &metadata.verb),
        ("not_using", &metadata.not_using),
    ] {
        map.insert(key.to_string(), Value::String(value.clone()));
    }
    map
}

/// Merge undersized chunks into their following neighbour
///
/// Two adjacent chunks merge when they share a kind and the earlier one is
/// shorter than `min_size` characters. Merged text is the space-joined
/// concatenation of the inputs; nothing is dropped.
pub fn merge_small_chunks(chunks: Vec<Chunk>, min_size: usize) -> Vec<Chunk> {
    let before = chunks.len();
    let mut iter = chunks.into_iter();
    let Some(mut current) = iter.next() else {
        return Vec::new();
    };

    let mut merged = Vec::with_capacity(before);
    for next in iter {
        if current.kind == next.kind && current.text.chars().count() < min_size {
            current = merge_pair(current, next);
        } else {
            merged.push(std::mem::replace(&mut current, next));
        }
    }
    merged.push(current);

    if merged.len() < before {
        info!("Merged small chunks: {} -> {}", before, merged.len());
    }
    merged
}

fn merge_pair(mut first: Chunk, second: Chunk) -> Chunk {
    let mut sources = match first.metadata.remove("merged_from") {
        Some(Value::Array(ids)) => ids,
        _ => vec![Value::String(first.parent_record_id.clone())],
    };
    if !sources.contains(&Value::String(second.parent_record_id.clone())) {
        sources.push(Value::String(second.parent_record_id));
    }

    if !first.is_merged() {
        first.id = format!("{}_merged", first.id);
    }
    first.text = format!("{} {}", first.text, second.text);
    first.fields.insert("merged".to_string(), Value::Bool(true));
    first.metadata.insert("merged_from".to_string(), Value::Array(sources));
    first
}
