//! Command-line interface
//!
//! Provides CLI commands for build, search, interactive and evaluate.

use crate::config::MrlConfig;
use crate::data::JsonlDataset;
use crate::embedding::{create_embedder, encode_corpus, Embedder, EmbeddingConfig};
use crate::evaluation::{EvalSettings, Evaluator};
use crate::index::{embeddings_to_matrix, VectorIndex};
use crate::retrieval::{DenseRetriever, Retriever};
use anyhow::{Context, Result};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

const NO_INDEX_MESSAGE: &str = "No index found. Please build the index first using: mrl build";

/// Excerpt length for `search --show-text`
const SEARCH_EXCERPT_CHARS: usize = 300;
/// Excerpt length in interactive mode
const INTERACTIVE_EXCERPT_CHARS: usize = 250;

fn make_embedder(config: &MrlConfig, backend: &str, dimension: usize) -> Result<Arc<dyn Embedder>> {
    let embedding_config = EmbeddingConfig {
        model_name: config.model_name.clone(),
        normalize: true,
        batch_size: config.batch_size,
    };
    create_embedder(backend, embedding_config, dimension)
}

/// Open the saved index and wrap it in a retriever, or `None` if there is no index
fn open_retriever(config: &MrlConfig, embedder_backend: &str) -> Result<Option<DenseRetriever>> {
    let Some(index) = VectorIndex::open(&config.index_dir, &config.index)? else {
        tracing::error!("{}", NO_INDEX_MESSAGE);
        println!("{}", NO_INDEX_MESSAGE);
        return Ok(None);
    };

    let embedder = make_embedder(config, embedder_backend, index.embedding_dim())?;
    Ok(Some(DenseRetriever::new(
        embedder,
        Arc::new(index),
        config.language_table(),
    )))
}

/// Execute the build command
pub fn build(
    config: &MrlConfig,
    embedder_backend: &str,
    sample_size: Option<usize>,
    force_rebuild: bool,
) -> Result<()> {
    tracing::info!("Starting index building process");
    tracing::info!("  Index: {:?}", config.index_dir);
    tracing::info!("  Data: {:?}", config.data_dir);
    tracing::info!("  Backend: {}", config.index.backend);

    let mut index = VectorIndex::from_config(config)?;
    if index.exists_on_disk() && !force_rebuild {
        tracing::info!("Index already exists. Use --force-rebuild to rebuild.");
        println!("Index already exists in {:?}. Use --force-rebuild to rebuild.", config.index_dir);
        return Ok(());
    }

    let dataset = JsonlDataset::from_config(config);
    let corpus = dataset.load_corpus(&config.language_keys(), sample_size, config.sample_seed)?;
    if corpus.is_empty() {
        anyhow::bail!("Corpus in {:?} is empty", config.data_dir);
    }

    let embedder = make_embedder(config, embedder_backend, config.embedding_dim)?;
    let texts = corpus.texts();
    let embeddings = encode_corpus(embedder.as_ref(), &texts, config.batch_size)?;

    index.set_model_name(embedder.model_name());
    index.build(
        embeddings_to_matrix(embeddings)?,
        corpus.ids(),
        corpus.languages(),
        Some(texts),
    )?;
    index.save().context("Failed to save index")?;

    tracing::info!("Index building complete!");

    println!("\nBuild Summary:");
    println!("  Documents indexed: {}", index.num_documents());
    println!("  Embedding dimension: {}", index.embedding_dim());
    println!(
        "  Backend: {} ({})",
        index.backend_kind(),
        if index.is_exact() { "exact" } else { "approximate" }
    );
    println!("  Index directory: {:?}", config.index_dir);

    Ok(())
}

/// Execute the search command
pub fn search(
    config: &MrlConfig,
    embedder_backend: &str,
    query: &str,
    top_k: usize,
    show_text: bool,
) -> Result<()> {
    tracing::info!("Starting search");
    tracing::info!("  Query: {}", query);
    tracing::info!("  Top-k: {}", top_k);

    let Some(retriever) = open_retriever(config, embedder_backend)? else {
        return Ok(());
    };

    let results = retriever.retrieve(query, top_k, show_text)?;

    println!("\nQuery: {}", query);
    println!("Found {} results:\n", results.len());
    for result in &results {
        println!("{}\n", result.format_with_excerpt(SEARCH_EXCERPT_CHARS));
    }

    Ok(())
}

/// Execute the interactive command on stdin/stdout
pub fn interactive(config: &MrlConfig, embedder_backend: &str, top_k: usize) -> Result<()> {
    let Some(retriever) = open_retriever(config, embedder_backend)? else {
        return Ok(());
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    run_interactive(
        &retriever,
        config,
        top_k,
        stdin.lock(),
        &mut stdout.lock(),
    )
}

/// Read queries line by line from `input` until EOF or a quit command
pub fn run_interactive<R: BufRead, W: Write>(
    retriever: &DenseRetriever,
    config: &MrlConfig,
    top_k: usize,
    input: R,
    out: &mut W,
) -> Result<()> {
    let rule = "=".repeat(80);
    writeln!(out, "\n{}", rule)?;
    writeln!(out, "Multilingual Retrieval Lab")?;
    writeln!(out, "{}", rule)?;
    writeln!(
        out,
        "Indexed {} documents in {} languages",
        retriever.index().num_documents(),
        config.languages.len()
    )?;
    writeln!(out, "Languages: {}", config.language_keys().join(", "))?;
    writeln!(out, "\nEnter your queries (in English or any supported language)")?;
    writeln!(out, "Commands: 'quit' or 'exit' to quit, 'help' for help")?;
    writeln!(out, "{}", rule)?;

    let mut lines = input.lines();
    loop {
        write!(out, "\nQuery: ")?;
        out.flush()?;

        let Some(line) = lines.next() else {
            writeln!(out)?;
            break;
        };
        let query = line?;
        let query = query.trim();

        match query.to_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                writeln!(out, "Goodbye!")?;
                break;
            }
            "help" => {
                writeln!(out, "\nHelp:")?;
                writeln!(out, "  - Enter any query in English or a supported language")?;
                writeln!(out, "  - Documents are retrieved across all indexed languages")?;
                writeln!(out, "  - Type 'quit' or 'exit' to quit")?;
                continue;
            }
            "" => continue,
            _ => {}
        }

        match retriever.retrieve(query, top_k, true) {
            Ok(results) => {
                writeln!(out, "\nTop {} Results:", results.len())?;
                writeln!(out, "{}", "=".repeat(80))?;
                for result in &results {
                    writeln!(out, "{}", result.format_with_excerpt(INTERACTIVE_EXCERPT_CHARS))?;
                    writeln!(out, "{}", "-".repeat(80))?;
                }
            }
            Err(e) => {
                tracing::error!("Error during search: {}", e);
                writeln!(out, "Error: {}", e)?;
            }
        }
    }

    Ok(())
}

/// Execute the evaluate command
pub fn evaluate(
    config: &MrlConfig,
    embedder_backend: &str,
    languages: Vec<String>,
    split: &str,
    max_queries: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let languages = if languages.is_empty() {
        config.language_keys()
    } else {
        languages
    };
    tracing::info!("Starting evaluation");
    tracing::info!("  Split: {}", split);
    tracing::info!("  Languages: {}", languages.join(", "));
    if let Some(max) = max_queries {
        tracing::info!("  Limiting to {} queries per language", max);
    }

    let Some(retriever) = open_retriever(config, embedder_backend)? else {
        return Ok(());
    };

    let settings = EvalSettings::from_config(config).with_max_queries(max_queries);
    let evaluator = Evaluator::new(Arc::new(retriever), settings);
    let dataset = JsonlDataset::from_config(config);
    let report = evaluator.evaluate_all(&languages, &dataset, split);

    println!("\n{}", report);

    if let Some(output_path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(output_path, json)
            .with_context(|| format!("Failed to write report to {:?}", output_path))?;
        println!("\nDetailed results saved to: {:?}", output_path);
    }

    tracing::info!("Evaluation complete!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::BackendKind;
    use std::io::Cursor;
    use tempfile::{tempdir, TempDir};

    fn write_dataset(root: &Path) {
        let hindi = root.join("hindi");
        fs::create_dir_all(hindi.join("dev")).unwrap();
        fs::write(
            hindi.join("corpus.jsonl"),
            [
                r#"{"doc_id": "hi#1", "text": "भारत की राजधानी नई दिल्ली है"}"#,
                r#"{"doc_id": "hi#2", "text": "गंगा भारत की सबसे लंबी नदी है"}"#,
            ]
            .join("\n"),
        )
        .unwrap();
        fs::write(
            hindi.join("dev/queries.jsonl"),
            r#"{"query_id": "q1", "text": "नई दिल्ली राजधानी"}"#,
        )
        .unwrap();
        fs::write(
            hindi.join("dev/qrels.jsonl"),
            r#"{"query_id": "q1", "doc_id": "hi#1", "relevance": 1}"#,
        )
        .unwrap();

        let telugu = root.join("telugu");
        fs::create_dir_all(&telugu).unwrap();
        fs::write(
            telugu.join("corpus.jsonl"),
            r#"{"doc_id": "te#1", "text": "హైదరాబాద్ తెలంగాణ రాజధాని"}"#,
        )
        .unwrap();
    }

    fn setup() -> (TempDir, MrlConfig) {
        let dir = tempdir().unwrap();
        write_dataset(&dir.path().join("data"));
        let mut config = MrlConfig::default()
            .with_index_dir(dir.path().join("index"))
            .with_data_dir(dir.path().join("data"));
        config.languages.retain(|l| l.key != "bengali");
        config.embedding_dim = 128;
        (dir, config)
    }

    #[test]
    fn test_build_then_skip_existing() {
        let (_dir, config) = setup();
        build(&config, "token", None, false).unwrap();

        let index = VectorIndex::open(&config.index_dir, &config.index).unwrap().unwrap();
        assert_eq!(index.num_documents(), 3);
        assert_eq!(index.embedding_dim(), 128);
        assert!(index.texts().is_some());
        let created = index.metadata().created_at.clone();

        // second build without --force-rebuild leaves the index alone
        build(&config, "token", None, false).unwrap();
        let again = VectorIndex::open(&config.index_dir, &config.index).unwrap().unwrap();
        assert_eq!(again.metadata().created_at, created);
    }

    #[test]
    fn test_build_respects_sample_size() {
        let (_dir, mut config) = setup();
        config.sample_seed = Some(1);
        build(&config, "token", Some(2), true).unwrap();

        let index = VectorIndex::open(&config.index_dir, &config.index).unwrap().unwrap();
        assert_eq!(index.num_documents(), 2);
    }

    #[test]
    fn test_missing_index_is_not_an_error() {
        let (_dir, config) = setup();
        search(&config, "token", "query", 5, true).unwrap();
        evaluate(&config, "token", vec![], "dev", None, None).unwrap();
        interactive(&config, "token", 5).unwrap();
    }

    #[test]
    fn test_interactive_session() {
        let (_dir, config) = setup();
        build(&config, "token", None, false).unwrap();
        let retriever = open_retriever(&config, "token").unwrap().unwrap();

        let input = Cursor::new("help\n\nनई दिल्ली\nquit\nnever read\n");
        let mut out = Vec::new();
        run_interactive(&retriever, &config, 2, input, &mut out).unwrap();

        let transcript = String::from_utf8(out).unwrap();
        assert!(transcript.contains("Indexed 3 documents"));
        assert!(transcript.contains("Help:"));
        assert!(transcript.contains("Top 2 Results:"));
        assert!(transcript.contains("1. [Hindi] hi#1"));
        assert!(transcript.contains("Goodbye!"));
    }

    #[test]
    fn test_evaluate_writes_report() {
        let (dir, config) = setup();
        build(&config, "token", None, false).unwrap();
        let output = dir.path().join("report.json");

        evaluate(
            &config,
            "token",
            vec!["hindi".to_string(), "telugu".to_string()],
            "dev",
            None,
            Some(&output),
        )
        .unwrap();

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report["split"], "dev");
        assert_eq!(report["languages"][0]["language"], "hindi");
        assert_eq!(report["languages"][0]["num_queries"], 1);
        assert_eq!(report["languages"][0]["recall"], 1.0);
        // telugu has no dev split on disk
        assert!(report["languages"][1]["error"].is_string());
    }

    #[test]
    fn test_saved_backend_is_used_for_search() {
        let (_dir, config) = setup();
        build(&config, "token", None, false).unwrap();

        let native_config = config.clone().with_backend(BackendKind::Native);
        let index = VectorIndex::open(&native_config.index_dir, &native_config.index)
            .unwrap()
            .unwrap();
        assert_eq!(index.backend_kind(), BackendKind::Exact);
    }
}
