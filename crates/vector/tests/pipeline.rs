use async_trait::async_trait;
use englishy_common::{EncodingErrorKind, Result};
use englishy_embed::{CancellationToken, EmbeddingProvider, Encoder, RetryPolicy};
use englishy_ingest::{merge_small_chunks, ChunkKind, Chunker, ChunkerConfig, RecordParser};
use englishy_vector::{IndexStatus, VectorIndex};
use std::sync::Arc;
use tempfile::TempDir;

const DIM: usize = 64;

/// Bag-of-words hashing provider; identical texts get identical vectors
struct HashingProvider;

fn bucket(word: &str) -> usize {
    // FNV-1a
    let hash = word
        .bytes()
        .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
    (hash % DIM as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; DIM];
                for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
                    vector[bucket(&word.to_lowercase())] += 1.0;
                }
                vector[DIM - 1] += 0.01;
                vector
            })
            .collect())
    }

    fn name(&self) -> &str {
        "hashing"
    }

    fn model(&self) -> &str {
        "hashing-64"
    }
}

fn encoder() -> Encoder {
    Encoder::new(Arc::new(HashingProvider))
        .with_batch_size(4)
        .with_retry_policy(RetryPolicy::immediate(1))
}

fn write_sources(dir: &TempDir) {
    std::fs::write(
        dir.path().join("questions.csv"),
        "TALK:A,TALK:B,Answer,GRAMMER,NOTE,prefecture,year,questionNo\n\
         Where did you go yesterday?,I went to the museum.,museum,past tense of go is went,,Tokyo,2023,1\n\
         ,,,,,,,\n\
         What do you want to be?,I want to be a doctor.,doctor,want to + verb,career talk,Osaka,2022,4\n",
    )
    .unwrap();

    std::fs::write(
        dir.path().join("materials.json"),
        r#"[
            {"title": "Present perfect", "body": "I have lived here for ten years. She has just finished lunch!"},
            {"title": "Comparatives", "body": "This box is bigger than that one. Which is faster?"}
        ]"#,
    )
    .unwrap();

    let long_block = "The quick brown fox jumps over the lazy dog. ".repeat(30);
    std::fs::write(
        dir.path().join("notes.txt"),
        format!("Short note about articles.\n\n{}\n", long_block.trim()),
    )
    .unwrap();
}

#[tokio::test]
async fn full_pipeline_round_trip() {
    let dir = TempDir::new().unwrap();
    write_sources(&dir);

    let parser = RecordParser::new();
    let mut records = Vec::new();
    for name in ["questions.csv", "materials.json", "notes.txt"] {
        records.extend(parser.parse(&dir.path().join(name)).unwrap());
    }
    // empty CSV row skipped
    assert_eq!(records.len(), 2 + 2 + 2);

    let chunker = Chunker::new(ChunkerConfig::new(200, 20)).unwrap();
    let chunks = merge_small_chunks(chunker.chunk(&records), 0);
    assert!(chunks.iter().all(|c| !c.text.trim().is_empty()));
    assert!(chunks.iter().any(|c| c.kind == ChunkKind::GrammarExplanation));
    assert!(chunks.iter().filter(|c| c.kind == ChunkKind::TextChunk).count() > 1);

    let encoder = encoder();
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = encoder
        .encode_batch_with_cancel(&texts, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(vectors.len(), chunks.len());

    let index_path = dir.path().join("cache").join("englishy_index");
    let mut index = VectorIndex::with_path(&index_path);
    index.build(chunks.clone(), vectors).unwrap();

    let loaded = VectorIndex::open(&index_path).unwrap();
    assert_eq!(loaded.status(), IndexStatus::Loaded);
    assert_eq!(loaded.len(), chunks.len());
    assert_eq!(loaded.dimension(), Some(DIM));

    let query = "past tense of go is went";
    let built_hits = index.search_by_text(query, &encoder, 3).await.unwrap().top(None);
    let loaded_hits = loaded.search_by_text(query, &encoder, 3).await.unwrap().top(None);

    assert_eq!(built_hits[0].kind, ChunkKind::GrammarExplanation);
    assert_eq!(built_hits[0].parent_record_id, "q_1");
    assert!((built_hits[0].score - 1.0).abs() < 1e-5);
    assert_eq!(
        built_hits.iter().map(|r| &r.id).collect::<Vec<_>>(),
        loaded_hits.iter().map(|r| &r.id).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn cancelled_encoding_leaves_index_untouched() {
    let index = VectorIndex::new();
    let token = CancellationToken::new();
    token.cancel();

    let err = encoder()
        .encode_batch_with_cancel(&["some text".to_string()], &token)
        .await
        .unwrap_err();
    assert_eq!(err.encoding_kind(), Some(EncodingErrorKind::Cancelled));
    assert_eq!(index.status(), IndexStatus::Empty);
    assert!(index
        .search_by_text("anything", &encoder(), 5)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn cancelled_text_search_returns_cancelled() {
    let dir = TempDir::new().unwrap();
    write_sources(&dir);
    let records = RecordParser::new().parse(&dir.path().join("materials.json")).unwrap();
    let chunks = Chunker::new(ChunkerConfig::new(200, 20)).unwrap().chunk(&records);

    let encoder = encoder();
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let mut index = VectorIndex::new();
    index.build(chunks, encoder.encode_batch(&texts).await.unwrap()).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let err = index
        .search_by_text_with_cancel("present perfect", &encoder, 3, &token)
        .await
        .unwrap_err();
    assert_eq!(err.encoding_kind(), Some(EncodingErrorKind::Cancelled));

    let hits = index
        .search_by_text_with_cancel("present perfect", &encoder, 3, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!hits.is_empty());
}
