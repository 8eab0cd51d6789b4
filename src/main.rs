use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mrl::cli;
use mrl::config::MrlConfig;
use mrl::index::BackendKind;

#[derive(Parser)]
#[command(name = "mrl")]
#[command(about = "Multilingual Retrieval Lab - dense cross-lingual retrieval and evaluation", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration file (missing fields take defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Index directory (overrides the configuration)
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Dataset directory (overrides the configuration)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Embedder: token or mock
    #[arg(long, global = true, default_value = "token")]
    embedder: String,

    /// Embedding dimension used when building
    #[arg(long, global = true)]
    dimension: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Split {
    Dev,
    Train,
}

impl Split {
    fn as_str(self) -> &'static str {
        match self {
            Split::Dev => "dev",
            Split::Train => "train",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from the corpus
    Build {
        /// Number of documents to sample (default: from the configuration)
        #[arg(long)]
        sample_size: Option<usize>,

        /// Index the full corpus, ignoring any configured sample size
        #[arg(long, conflicts_with = "sample_size")]
        full_corpus: bool,

        /// Rebuild even if an index already exists
        #[arg(long)]
        force_rebuild: bool,

        /// Search backend: exact or native
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Use an accelerator for the native backend when available
        #[arg(long)]
        gpu: bool,
    },

    /// Search the index with a query
    Search {
        /// Query text
        query: String,

        /// Number of results to return
        #[arg(short, long)]
        top_k: Option<usize>,

        /// Show document text in results
        #[arg(long)]
        show_text: bool,

        /// Search backend: exact or native
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Use an accelerator for the native backend when available
        #[arg(long)]
        gpu: bool,
    },

    /// Interactive search mode
    Interactive {
        /// Number of results to return per query
        #[arg(short, long)]
        top_k: Option<usize>,

        /// Search backend: exact or native
        #[arg(long)]
        backend: Option<BackendKind>,
    },

    /// Evaluate retrieval performance (nDCG and Recall)
    Evaluate {
        /// Languages to evaluate (default: all configured)
        #[arg(long, num_args = 1..)]
        languages: Vec<String>,

        /// Dataset split to use
        #[arg(long, value_enum, default_value = "dev")]
        split: Split,

        /// Maximum number of queries per language
        #[arg(long)]
        max_queries: Option<usize>,

        /// Search backend: exact or native
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Output file for the report (JSON)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn apply_backend(config: MrlConfig, backend: Option<BackendKind>, gpu: bool) -> MrlConfig {
    let config = match backend {
        Some(backend) => config.with_backend(backend),
        None => config,
    };
    if gpu {
        config.with_gpu(true)
    } else {
        config
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mrl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MrlConfig::from_file(path)?,
        None => MrlConfig::default(),
    };
    if let Some(dir) = cli.index_dir {
        config = config.with_index_dir(dir);
    }
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }
    if let Some(dimension) = cli.dimension {
        config.embedding_dim = dimension;
    }

    match cli.command {
        Commands::Build {
            sample_size,
            full_corpus,
            force_rebuild,
            backend,
            gpu,
        } => {
            let config = apply_backend(config, backend, gpu);
            let sample_size = if full_corpus {
                None
            } else {
                sample_size.or(config.corpus_sample_size)
            };
            cli::build(&config, &cli.embedder, sample_size, force_rebuild)?;
        }

        Commands::Search {
            query,
            top_k,
            show_text,
            backend,
            gpu,
        } => {
            let config = apply_backend(config, backend, gpu);
            let top_k = top_k.unwrap_or(config.default_top_k);
            cli::search(&config, &cli.embedder, &query, top_k, show_text)?;
        }

        Commands::Interactive { top_k, backend } => {
            let config = apply_backend(config, backend, false);
            let top_k = top_k.unwrap_or(config.default_top_k);
            cli::interactive(&config, &cli.embedder, top_k)?;
        }

        Commands::Evaluate {
            languages,
            split,
            max_queries,
            backend,
            output,
        } => {
            let config = apply_backend(config, backend, false);
            cli::evaluate(
                &config,
                &cli.embedder,
                languages,
                split.as_str(),
                max_queries,
                output.as_deref(),
            )?;
        }
    }

    Ok(())
}
