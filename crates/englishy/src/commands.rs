use englishy_common::{AppConfig, EnglishyError, Result};
use englishy_embed::{CancellationToken, Encoder};
use englishy_ingest::{merge_small_chunks, Chunk, Chunker, ChunkerConfig, Record, RecordParser};
use englishy_vector::VectorIndex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

const PARSED_FILE: &str = "parsed_data.json";
const CHUNKED_FILE: &str = "chunked_data.json";
const INDEX_NAME: &str = "englishy_index";
const PREVIEW_ITEMS: usize = 3;
const PREVIEW_CHARS: usize = 100;

/// Pipeline stages wired from one configuration
pub struct App {
    config: AppConfig,
    parser: RecordParser,
    cancel: CancellationToken,
}

impl App {
    pub fn new(config: AppConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            parser: RecordParser::new(),
            cancel,
        }
    }

    fn chunker(&self, chunk_size: Option<usize>, overlap: Option<usize>) -> Result<Chunker> {
        Chunker::new(ChunkerConfig::new(
            chunk_size.unwrap_or(self.config.chunk_size),
            overlap.unwrap_or(self.config.chunk_overlap),
        ))
    }

    fn encoder(&self, model: Option<String>, batch_size: Option<usize>) -> Result<Encoder> {
        let mut config = self.config.clone();
        if let Some(model) = model {
            config.embedding_model = model;
        }
        if let Some(batch_size) = batch_size {
            config.embedding_batch_size = batch_size;
        }
        config.validate()?;
        Ok(Encoder::from_config(&config)?.with_progress(true))
    }

    fn index_path(&self, index_path: Option<PathBuf>) -> PathBuf {
        index_path.unwrap_or_else(|| self.config.index_path.clone())
    }

    /// `parse-data`
    pub fn parse_data(&self, input: &Path, output: Option<&Path>) -> Result<()> {
        let records = self.parser.parse(input)?;

        match output {
            Some(output) => {
                write_json(output, &records)?;
                println!("Parsed {} records -> {}", records.len(), output.display());
            }
            None => {
                for (i, record) in records.iter().take(PREVIEW_ITEMS).enumerate() {
                    println!("\nRecord {}:", i + 1);
                    println!("  ID: {}", record.id());
                    println!("  Kind: {}", record.kind());
                    println!("  Text: {}", preview(record.search_text()));
                }
                println!("\nParsed {} records from {}", records.len(), input.display());
            }
        }
        Ok(())
    }

    /// `chunk-data`
    pub fn chunk_data(
        &self,
        input: &Path,
        output: Option<&Path>,
        chunk_size: Option<usize>,
        overlap: Option<usize>,
        min_chunk_size: Option<usize>,
    ) -> Result<()> {
        let records: Vec<Record> = read_json(input)?;
        let chunker = self.chunker(chunk_size, overlap)?;
        let chunks = merge_small_chunks(
            chunker.chunk(&records),
            min_chunk_size.unwrap_or(self.config.min_chunk_size),
        );

        match output {
            Some(output) => {
                write_json(output, &chunks)?;
                println!(
                    "Created {} chunks from {} records -> {}",
                    chunks.len(),
                    records.len(),
                    output.display()
                );
            }
            None => {
                for (i, chunk) in chunks.iter().take(PREVIEW_ITEMS).enumerate() {
                    println!("\nChunk {}:", i + 1);
                    println!("  ID: {}", chunk.id);
                    println!("  Kind: {}", chunk.kind);
                    println!("  Text: {}", preview(&chunk.text));
                }
                println!("\nCreated {} chunks from {} records", chunks.len(), records.len());
            }
        }
        Ok(())
    }

    /// `build-index`
    pub async fn build_index(
        &self,
        chunks_file: &Path,
        index_path: Option<PathBuf>,
        model: Option<String>,
        batch_size: Option<usize>,
    ) -> Result<()> {
        let chunks: Vec<Chunk> = read_json(chunks_file)?;
        let encoder = self.encoder(model, batch_size)?;
        let index_path = self.index_path(index_path);

        let index = self.embed_and_index(chunks, &encoder, &index_path).await?;
        println!(
            "Built index with {} chunks -> {}",
            index.len(),
            index_path.display()
        );
        Ok(())
    }

    /// `search`
    pub async fn search(
        &self,
        query: &str,
        index_path: Option<PathBuf>,
        model: Option<String>,
        limit: Option<usize>,
        json: bool,
    ) -> Result<()> {
        let limit = limit.unwrap_or(self.config.search_limit);
        let index = VectorIndex::open(self.index_path(index_path))?;
        let encoder = self.encoder(model, None)?.with_progress(false);

        let results = index
            .search_by_text_with_cancel(query, &encoder, limit, &self.cancel)
            .await?;
        let top = results.top(Some(limit));

        if json {
            println!("{}", serde_json::to_string_pretty(&top)?);
            return Ok(());
        }

        println!("\nSearch results for: '{}'", query);
        println!("Found {} results\n", top.len());
        for (i, result) in top.iter().enumerate() {
            println!("{}. {}", i + 1, preview(&result.text));
            println!("   Score: {:.3}", result.score);
            println!("   Kind: {}", result.kind);
            println!("   Source: {}", result.parent_record_id);
            println!();
        }
        Ok(())
    }

    /// `process-pipeline`
    pub async fn process_pipeline(
        &self,
        input: &Path,
        output_dir: Option<PathBuf>,
        chunk_size: Option<usize>,
        overlap: Option<usize>,
        model: Option<String>,
    ) -> Result<()> {
        let output_dir = output_dir.unwrap_or_else(|| self.config.cache_dir.clone());
        std::fs::create_dir_all(&output_dir)?;

        // Fail on bad settings before any work is done
        let chunker = self.chunker(chunk_size, overlap)?;
        let encoder = self.encoder(model, None)?;

        info!("Step 1: Parsing {}", input.display());
        let records = self.parser.parse(input)?;
        write_json(&output_dir.join(PARSED_FILE), &records)?;

        info!("Step 2: Chunking {} records", records.len());
        let chunks = merge_small_chunks(chunker.chunk(&records), self.config.min_chunk_size);
        write_json(&output_dir.join(CHUNKED_FILE), &chunks)?;

        info!("Step 3: Building index from {} chunks", chunks.len());
        let index_path = output_dir.join(INDEX_NAME);
        let index = self.embed_and_index(chunks, &encoder, &index_path).await?;

        println!("Pipeline completed");
        println!("  Parsed: {} records", records.len());
        println!("  Chunks: {} chunks", index.len());
        println!("  Index:  {}", index_path.display());
        Ok(())
    }

    /// `index-info`
    pub fn index_info(&self, index_path: Option<PathBuf>) -> Result<()> {
        let index = VectorIndex::open(self.index_path(index_path))?;
        println!("{}", serde_json::to_string_pretty(&index.info())?);
        Ok(())
    }

    /// Encode every chunk, then build and persist; nothing is written if encoding fails
    async fn embed_and_index(
        &self,
        chunks: Vec<Chunk>,
        encoder: &Encoder,
        index_path: &Path,
    ) -> Result<VectorIndex> {
        if chunks.is_empty() {
            return Err(EnglishyError::invalid_input("No chunks to index"));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = encoder.encode_batch_with_cancel(&texts, &self.cancel).await?;

        let mut index = VectorIndex::with_path(index_path);
        index.build(chunks, vectors)?;
        Ok(index)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(EnglishyError::not_found(format!(
            "File not found: {}",
            path.display()
        )));
    }
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader)
        .map_err(|e| EnglishyError::parse(format!("{}: {}", path.display(), e)))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    info!("Saved {}", path.display());
    Ok(())
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use englishy_common::{EmbeddingProviderKind, EncodingErrorKind};
    use englishy_vector::IndexStatus;

    fn app(dir: &Path) -> App {
        let config = AppConfig {
            cache_dir: dir.join("cache"),
            index_path: dir.join("cache").join(INDEX_NAME),
            log_dir: dir.join("logs"),
            ..AppConfig::default()
        };
        App::new(config, CancellationToken::new())
    }

    #[test]
    fn test_parse_then_chunk_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let input = dir.path().join("notes.txt");
        std::fs::write(&input, "I went to school.\n\nShe has finished her homework.").unwrap();

        let parsed = dir.path().join("out").join(PARSED_FILE);
        app.parse_data(&input, Some(&parsed)).unwrap();
        let records: Vec<Record> = read_json(&parsed).unwrap();
        assert_eq!(records.len(), 2);

        let chunked = dir.path().join("out").join(CHUNKED_FILE);
        app.chunk_data(&parsed, Some(&chunked), None, None, None).unwrap();
        let chunks: Vec<Chunk> = read_json(&chunked).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].parent_record_id, "text_1");
    }

    #[test]
    fn test_chunk_data_rejects_bad_window() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let parsed = dir.path().join(PARSED_FILE);
        write_json(&parsed, &Vec::<Record>::new()).unwrap();

        let err = app
            .chunk_data(&parsed, None, Some(10), Some(10), None)
            .unwrap_err();
        assert!(matches!(err, EnglishyError::InvalidInput(_)));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_json::<Vec<Chunk>>(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, EnglishyError::NotFound(_)));
    }

    #[test]
    fn test_index_info_without_index() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        app.index_info(None).unwrap();
        let index = VectorIndex::open(app.index_path(None)).unwrap();
        assert_eq!(index.status(), IndexStatus::Empty);
    }

    #[tokio::test]
    async fn test_search_stops_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let config = AppConfig {
            embedding_provider: EmbeddingProviderKind::Ollama,
            embedding_model: "nomic-embed-text".to_string(),
            ollama_base_url: "http://127.0.0.1:9".to_string(),
            index_path: dir.path().join(INDEX_NAME),
            log_dir: dir.path().join("logs"),
            ..AppConfig::default()
        };
        let app = App::new(config, cancel.clone());

        let input = dir.path().join("notes.txt");
        std::fs::write(&input, "I went to school.\n\nShe has finished her homework.").unwrap();
        let chunks = app.chunker(None, None).unwrap().chunk(&app.parser.parse(&input).unwrap());
        let vectors = vec![vec![1.0, 0.5, 0.25]; chunks.len()];
        VectorIndex::with_path(app.index_path(None))
            .build(chunks, vectors)
            .unwrap();

        cancel.cancel();
        let err = app
            .search("past tense", None, None, Some(3), false)
            .await
            .unwrap_err();
        assert_eq!(err.encoding_kind(), Some(EncodingErrorKind::Cancelled));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let text = "é".repeat(PREVIEW_CHARS + 5);
        let shown = preview(&text);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
