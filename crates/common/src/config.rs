use crate::error::EnglishyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "englishy.toml";

/// Prefix for environment overrides (`ENGLISHY_CHUNK_SIZE=256`)
pub const ENV_PREFIX: &str = "ENGLISHY";

/// Embedding backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// OpenAI-compatible `/embeddings` endpoint
    OpenAi,
    /// Local Ollama server
    Ollama,
}

impl fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => f.write_str("openai"),
            Self::Ollama => f.write_str("ollama"),
        }
    }
}

/// Englishy application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pipeline artifact directory
    pub cache_dir: PathBuf,

    /// Base path of the persisted index (`<index_path>.idx` + `<index_path>.chunks`)
    pub index_path: PathBuf,

    /// Log directory
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Embedding backend
    pub embedding_provider: EmbeddingProviderKind,

    /// Embedding model name
    pub embedding_model: String,

    /// OpenAI API key (falls back to `OPENAI_API_KEY`)
    #[serde(skip_serializing)]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    pub openai_base_url: String,

    /// Ollama API base URL
    pub ollama_base_url: String,

    /// Texts sent per provider call
    pub embedding_batch_size: usize,

    /// HTTP timeout per provider call
    pub request_timeout_secs: u64,

    /// Attempts per batch for retryable provider errors
    pub max_retries: u32,

    /// Window size in characters for long text records
    pub chunk_size: usize,

    /// Characters shared between consecutive windows
    pub chunk_overlap: usize,

    /// Merge threshold for undersized chunks (0 disables merging)
    pub min_chunk_size: usize,

    /// Default number of search results
    pub search_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            index_path: PathBuf::from("./cache/englishy_index"),
            log_dir: PathBuf::from("./logs"),
            log_level: "info".to_string(),
            embedding_provider: EmbeddingProviderKind::OpenAi,
            embedding_model: "text-embedding-3-small".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            embedding_batch_size: 100,
            request_timeout_secs: 60,
            max_retries: 3,
            chunk_size: 512,
            chunk_overlap: 50,
            min_chunk_size: 0,
            search_limit: 5,
        }
    }
}

impl AppConfig {
    /// Load configuration from `.env`, an optional TOML file and `ENGLISHY_*` variables
    ///
    /// Later sources override earlier ones. When `path` is `None` the
    /// default `englishy.toml` in the working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, EnglishyError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if path.is_some() && !file.exists() {
            return Err(EnglishyError::config(format!(
                "Config file not found: {}",
                file.display()
            )));
        }

        let mut config: Self = config::Config::builder()
            .add_source(config::File::from(file.as_path()).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| EnglishyError::config(format!("Failed to load configuration: {}", e)))?;

        if config.openai_api_key.is_none() {
            config.openai_api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), EnglishyError> {
        if self.embedding_model.trim().is_empty() {
            return Err(EnglishyError::config("Embedding model name cannot be empty"));
        }

        for (name, url) in [
            ("OpenAI", &self.openai_base_url),
            ("Ollama", &self.ollama_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(EnglishyError::config(format!(
                    "{} base URL must start with http:// or https://",
                    name
                )));
            }
        }

        if self.chunk_size == 0 {
            return Err(EnglishyError::config("Chunk size must be greater than 0"));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(EnglishyError::config(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }

        if self.embedding_batch_size == 0 {
            return Err(EnglishyError::config("Embedding batch size must be greater than 0"));
        }

        if self.max_retries == 0 {
            return Err(EnglishyError::config("Max retries must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.embedding_provider, EmbeddingProviderKind::OpenAi);
        assert_eq!(config.embedding_model, "text-embedding-3-small");
    }

    #[test]
    fn test_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid = AppConfig::default();
        invalid.embedding_model = String::new();
        assert!(invalid.validate().is_err());

        let mut invalid = AppConfig::default();
        invalid.chunk_overlap = invalid.chunk_size;
        assert!(invalid.validate().is_err());

        let mut invalid = AppConfig::default();
        invalid.ollama_base_url = "localhost:11434".to_string();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("englishy.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "embedding_provider = \"ollama\"").unwrap();
        writeln!(file, "embedding_model = \"nomic-embed-text\"").unwrap();
        writeln!(file, "chunk_size = 256").unwrap();
        writeln!(file, "chunk_overlap = 32").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.embedding_provider, EmbeddingProviderKind::Ollama);
        assert_eq!(config.embedding_model, "nomic-embed-text");
        assert_eq!(config.chunk_size, 256);
        assert_eq!(config.chunk_overlap, 32);
        // untouched keys keep their defaults
        assert_eq!(config.search_limit, 5);
    }

    #[test]
    fn test_load_ignores_retired_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("englishy.toml");
        std::fs::write(&path, "data_dir = \"./data\"\ncache_dir = \"./artifacts\"\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("./artifacts"));
        assert_eq!(config.index_path, AppConfig::default().index_path);
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(matches!(
            AppConfig::load(Some(&path)),
            Err(EnglishyError::Config(_))
        ));
    }
}
