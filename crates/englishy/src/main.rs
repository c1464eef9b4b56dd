mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use englishy_common::config::DEFAULT_CONFIG_FILE;
use englishy_common::{logger, AppConfig};
use englishy_embed::CancellationToken;
use std::path::PathBuf;

use crate::commands::App;

/// Find project root by looking for .git or englishy.toml
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() || current_dir.join(DEFAULT_CONFIG_FILE).exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        // Fallback to default dotenv behavior
        dotenv::dotenv().ok();
    }
}

#[derive(Parser)]
#[command(name = "englishy")]
#[command(about = "Englishy - parse, chunk, embed and search English-learning materials", long_about = None)]
struct Cli {
    /// Config file (default: englishy.toml in the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV, JSON or text file into records
    ParseData {
        /// Input file
        input: PathBuf,

        /// Write records as JSON here instead of printing a preview
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Split parsed records into chunks
    ChunkData {
        /// Records file written by parse-data
        input: PathBuf,

        /// Write chunks as JSON here instead of printing a preview
        #[arg(long)]
        output: Option<PathBuf>,

        /// Window size in characters for text records
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive windows
        #[arg(long)]
        overlap: Option<usize>,

        /// Merge adjacent same-kind chunks shorter than this
        #[arg(long)]
        min_chunk_size: Option<usize>,
    },

    /// Embed chunks and build the search index
    BuildIndex {
        /// Chunks file written by chunk-data
        chunks_file: PathBuf,

        /// Index base path
        #[arg(long)]
        index_path: Option<PathBuf>,

        /// Embedding model
        #[arg(long)]
        encoder_model: Option<String>,

        /// Texts per embedding request
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Search the index
    Search {
        /// Query text
        query: String,

        /// Index base path
        #[arg(long)]
        index_path: Option<PathBuf>,

        /// Embedding model (must match the one the index was built with)
        #[arg(long)]
        encoder_model: Option<String>,

        /// Number of results
        #[arg(long)]
        limit: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse, chunk, embed and index in one go
    ProcessPipeline {
        /// Input file
        input: PathBuf,

        /// Directory for artifacts and the index
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Window size in characters for text records
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive windows
        #[arg(long)]
        overlap: Option<usize>,

        /// Embedding model
        #[arg(long)]
        encoder_model: Option<String>,
    },

    /// Show index status as JSON
    IndexInfo {
        /// Index base path
        #[arg(long)]
        index_path: Option<PathBuf>,
    },
}

impl Commands {
    /// Commands that call the embedding provider and stop cleanly on Ctrl-C
    fn is_cancellable(&self) -> bool {
        matches!(
            self,
            Self::BuildIndex { .. } | Self::Search { .. } | Self::ProcessPipeline { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    load_dotenv_from_project_root();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    if let Err(e) = logger::setup_logging(&config.log_dir, &config.log_level) {
        logger::setup_console_logging(&config.log_level);
        tracing::warn!("File logging disabled: {}", e);
    }

    // Other commands keep the default Ctrl-C exit
    let cancel = CancellationToken::new();
    if cli.command.is_cancellable() {
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling...");
                interrupt.cancel();
            }
        });
    }

    let app = App::new(config, cancel);

    let result = match cli.command {
        Commands::ParseData { input, output } => app.parse_data(&input, output.as_deref()),
        Commands::ChunkData {
            input,
            output,
            chunk_size,
            overlap,
            min_chunk_size,
        } => app.chunk_data(&input, output.as_deref(), chunk_size, overlap, min_chunk_size),
        Commands::BuildIndex {
            chunks_file,
            index_path,
            encoder_model,
            batch_size,
        } => {
            app.build_index(&chunks_file, index_path, encoder_model, batch_size)
                .await
        }
        Commands::Search {
            query,
            index_path,
            encoder_model,
            limit,
            json,
        } => app.search(&query, index_path, encoder_model, limit, json).await,
        Commands::ProcessPipeline {
            input,
            output_dir,
            chunk_size,
            overlap,
            encoder_model,
        } => {
            app.process_pipeline(&input, output_dir, chunk_size, overlap, encoder_model)
                .await
        }
        Commands::IndexInfo { index_path } => app.index_info(index_path),
    };

    if let Err(e) = &result {
        tracing::error!("{}", e);
    }
    Ok(result?)
}
