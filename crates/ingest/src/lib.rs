//! Englishy ingestion
//!
//! Parses English-learning source files into records and splits records
//! into searchable chunks.

mod chunker;
mod parser;
mod record;
mod window;

pub use chunker::{merge_small_chunks, Chunk, ChunkKind, Chunker, ChunkerConfig};
pub use parser::{parse_csv_str, parse_json_str, parse_text_str, RecordParser};
pub use record::{
    GenericRecord, MaterialRecord, QuestionMetadata, QuestionRecord, Record, RecordKind, TextRecord,
};
pub use window::{split_with_overlap, TextSpan};
