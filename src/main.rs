// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use hybrid_rag::utils::logging::{format_error, format_success, format_warning};
use hybrid_rag::{
    Config, FileExtractor, HealthCheck, HealthReport, HybridRetriever, IndexKind, IngestRequest,
    IngestionPipeline, JsonMetadataStore, Metadata, MetadataFilter, MetadataStore,
    PineconeIndexClient, PineconeReranker, ProgressTracker, SearchIndex, Validator,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "hybrid_rag")]
#[command(author = "cipher")]
#[command(version = "0.1.0")]
#[command(about = "Document ingestion and hybrid dense/sparse retrieval with reranking", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a file, or every supported file under a directory
    Ingest {
        path: PathBuf,

        #[arg(short, long)]
        namespace: Option<String>,

        /// Ingest even when identical content is already committed
        #[arg(long)]
        force: bool,

        /// Extra metadata as key=value, repeatable
        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Replace a committed document with new content
    Update {
        document_id: String,

        path: PathBuf,

        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Remove a document and its chunks from both indexes
    Delete { document_id: String },

    /// Run a hybrid query with reranking
    Query {
        text: String,

        #[arg(short, long)]
        namespace: Option<String>,

        #[arg(long, value_name = "NUM")]
        top_k: Option<usize>,

        #[arg(long, value_name = "NUM")]
        top_n: Option<usize>,

        /// Metadata equality filter as key=value, repeatable
        #[arg(short, long, value_name = "KEY=VALUE")]
        filter: Vec<String>,

        /// Print results and diagnostics as JSON
        #[arg(long)]
        json: bool,
    },

    /// List documents in a namespace
    Documents {
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Record counts for a namespace in both indexes
    Stats {
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Probe both indexes and the metadata store
    Health {
        #[arg(short, long)]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    hybrid_rag::utils::logging::init_logger(cli.color, cli.verbose);

    info!("Hybrid RAG Pipeline");
    info!("Loading configuration from: {}", cli.config.display());

    let config = if cli.config.exists() {
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using default configuration",
            cli.config.display()
        );
        Config::load(None).unwrap_or_else(|e| {
            warn!("Falling back to built-in defaults: {}", e);
            Config::default_config()
        })
    };

    match cli.command {
        Commands::Ingest {
            path,
            namespace,
            force,
            meta,
        } => {
            cmd_ingest(&config, &path, namespace, force, &meta, cli.color).await?;
        }
        Commands::Update {
            document_id,
            path,
            meta,
        } => {
            cmd_update(&config, &document_id, &path, &meta).await?;
        }
        Commands::Delete { document_id } => {
            cmd_delete(&config, &document_id).await?;
        }
        Commands::Query {
            text,
            namespace,
            top_k,
            top_n,
            filter,
            json,
        } => {
            cmd_query(&config, &text, namespace, top_k, top_n, &filter, json).await?;
        }
        Commands::Documents { namespace } => {
            cmd_documents(&config, namespace).await?;
        }
        Commands::Stats { namespace } => {
            cmd_stats(&config, namespace).await?;
        }
        Commands::Health { namespace } => {
            cmd_health(&config, namespace).await?;
        }
    }

    Ok(())
}

fn build_indexes(config: &Config) -> Result<(Arc<dyn SearchIndex>, Arc<dyn SearchIndex>)> {
    let degraded = config.upsert.degraded_batch_size;
    let dense: Arc<dyn SearchIndex> = Arc::new(
        PineconeIndexClient::new(IndexKind::Dense, &config.index, degraded)
            .context("Failed to create dense index client")?,
    );
    let sparse: Arc<dyn SearchIndex> = Arc::new(
        PineconeIndexClient::new(IndexKind::Sparse, &config.index, degraded)
            .context("Failed to create sparse index client")?,
    );
    Ok((dense, sparse))
}

async fn open_store(config: &Config) -> Result<Arc<JsonMetadataStore>> {
    let store = JsonMetadataStore::open(config.storage.metadata_path.clone())
        .await
        .context("Failed to open metadata store")?;
    Ok(Arc::new(store))
}

async fn build_pipeline(config: &Config) -> Result<IngestionPipeline> {
    let (dense, sparse) = build_indexes(config)?;
    let store = open_store(config).await?;

    IngestionPipeline::new(
        config,
        Arc::new(FileExtractor::new()),
        store,
        dense,
        sparse,
    )
    .context("Failed to create ingestion pipeline")
}

fn parse_metadata(pairs: &[String]) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let (key, value) = Validator::parse_key_value(pair)?;
        metadata.insert(key, value);
    }
    Ok(metadata)
}

fn resolve_namespace(config: &Config, namespace: Option<String>) -> String {
    namespace.unwrap_or_else(|| config.index.namespace.clone())
}

async fn cmd_ingest(
    config: &Config,
    path: &Path,
    namespace: Option<String>,
    force: bool,
    meta: &[String],
    color: bool,
) -> Result<()> {
    info!("Starting ingestion of {}", path.display());
    let start_time = Instant::now();

    let pipeline = build_pipeline(config).await?;
    let request = IngestRequest {
        namespace,
        metadata: parse_metadata(meta)?,
        force: force || config.pipeline.force_reprocess,
        ..Default::default()
    };

    if path.is_dir() {
        let progress = ProgressTracker::with_color(0, color);
        let report = pipeline
            .ingest_directory(path, request, &progress)
            .await
            .context("Directory ingestion failed")?;
        progress.finish();

        for (file, result) in &report.results {
            match result {
                Ok(outcome) => println!(
                    "{}",
                    format_success(&format!(
                        "{} -> {} ({} chunks)",
                        file.display(),
                        outcome.document.document_id,
                        outcome.document.total_chunks
                    ))
                ),
                Err(e) if e.is_duplicate() => {
                    println!("{}", format_warning(&format!("{}: {}", file.display(), e)))
                }
                Err(e) => println!("{}", format_error(&format!("{}: {}", file.display(), e))),
            }
        }

        let stats = &report.stats;
        println!("\n{}", "=".repeat(80));
        println!("Files ingested: {}", stats.files_ingested);
        println!("Files failed:   {}", stats.files_failed);
        println!("Duplicates:     {}", stats.files_skipped);
        println!("Chunks written: {}", stats.chunks_written);
        println!("Success rate:   {:.1}%", stats.success_rate());
        println!("{}", "=".repeat(80));
    } else {
        let outcome = pipeline
            .ingest_file(path, request)
            .await
            .with_context(|| format!("Failed to ingest {}", path.display()))?;

        println!(
            "{}",
            format_success(&format!(
                "Ingested {} as {}",
                outcome.document.file_name, outcome.document.document_id
            ))
        );
        println!("   Namespace: {}", outcome.document.namespace);
        println!(
            "   Chunks:    {} (dense {}, sparse {})",
            outcome.document.total_chunks, outcome.dense_count, outcome.sparse_count
        );
        if outcome.skipped_units > 0 {
            println!(
                "{}",
                format_warning(&format!("{} units were skipped", outcome.skipped_units))
            );
        }
    }

    info!("Ingestion finished in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

async fn cmd_update(config: &Config, document_id: &str, path: &Path, meta: &[String]) -> Result<()> {
    info!("Updating document {} from {}", document_id, path.display());

    let pipeline = build_pipeline(config).await?;
    let outcome = pipeline
        .update_document(document_id, path, parse_metadata(meta)?)
        .await
        .with_context(|| format!("Failed to update document {}", document_id))?;

    println!(
        "{}",
        format_success(&format!(
            "Document {} replaced by {} ({} chunks)",
            document_id, outcome.document.document_id, outcome.document.total_chunks
        ))
    );
    Ok(())
}

async fn cmd_delete(config: &Config, document_id: &str) -> Result<()> {
    info!("Deleting document {}", document_id);

    let pipeline = build_pipeline(config).await?;
    let record = pipeline
        .delete_document(document_id)
        .await
        .with_context(|| format!("Failed to delete document {}", document_id))?;

    println!(
        "{}",
        format_success(&format!(
            "Deleted {} ({}, {} chunks)",
            record.document_id, record.file_name, record.total_chunks
        ))
    );
    Ok(())
}

async fn cmd_query(
    config: &Config,
    text: &str,
    namespace: Option<String>,
    top_k: Option<usize>,
    top_n: Option<usize>,
    filter: &[String],
    as_json: bool,
) -> Result<()> {
    info!("Querying: {}", text);

    let (dense, sparse) = build_indexes(config)?;
    let reranker = PineconeReranker::new(
        &config.index,
        Duration::from_secs(config.retrieval.rerank_timeout_secs),
    )
    .context("Failed to create reranker")?;
    let retriever = HybridRetriever::new(dense, sparse, Arc::new(reranker), config.retrieval.clone())
        .context("Failed to create retriever")?;

    let namespace = resolve_namespace(config, namespace);
    let filter = MetadataFilter::from_pairs(filter);
    let (hits, diagnostics) = retriever
        .query_with_diagnostics(
            text,
            top_k.unwrap_or(config.retrieval.top_k),
            top_n.unwrap_or(config.retrieval.top_n),
            &namespace,
            filter.as_ref(),
        )
        .await
        .context("Query failed")?;

    if as_json {
        let output = json!({ "results": hits, "diagnostics": diagnostics });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if diagnostics.is_total_outage() {
        println!(
            "{}",
            format_error("Neither index answered; results are empty")
        );
    }
    if let Some(e) = &diagnostics.rerank_error {
        println!(
            "{}",
            format_warning(&format!("Reranking failed, showing provisional order: {}", e))
        );
    }

    if hits.is_empty() {
        println!("\nNo results found for query: \"{}\"\n", text);
        println!("Try:");
        println!("  - Using different search terms");
        println!("  - Removing metadata filters");
        println!("  - Checking that documents have been ingested into {}", namespace);
        return Ok(());
    }

    println!("\nResults for: \"{}\"\n", diagnostics.normalized_query);
    println!(
        "Dense hits: {} | Sparse hits: {} | Merged: {} | In both: {}\n",
        diagnostics.dense.hits, diagnostics.sparse.hits, diagnostics.merged, diagnostics.matched_by_both
    );
    println!("{}", "=".repeat(80));

    for (idx, hit) in hits.iter().enumerate() {
        print!("\n{}. {}", idx + 1, hit.format_summary(300));
    }

    println!("\n{}", "=".repeat(80));
    info!("Query complete in {} ms", diagnostics.elapsed_ms);

    Ok(())
}

async fn cmd_documents(config: &Config, namespace: Option<String>) -> Result<()> {
    let namespace = resolve_namespace(config, namespace);
    let store = open_store(config).await?;
    let documents = store
        .list_documents(&namespace)
        .await
        .context("Failed to list documents")?;

    if documents.is_empty() {
        println!("No documents in namespace {}", namespace);
        return Ok(());
    }

    println!("\nDocuments in {}\n", namespace);
    println!("{}", "=".repeat(80));
    for record in &documents {
        println!(
            "{}  {:<40} {:>5} chunks  {:?}  {}",
            record.document_id,
            Validator::truncate_text(&record.display_name, 37),
            record.total_chunks,
            record.state,
            record.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("{}", "=".repeat(80));
    println!("Total: {}", documents.len());

    Ok(())
}

async fn cmd_stats(config: &Config, namespace: Option<String>) -> Result<()> {
    info!("Gathering statistics");

    let namespace = resolve_namespace(config, namespace);
    let pipeline = build_pipeline(config).await?;
    let stats = pipeline
        .stats(&namespace)
        .await
        .context("Failed to gather statistics")?;

    info!("Namespace: {}", stats.namespace);
    info!("Dense records: {}", stats.dense_records);
    info!("Sparse records: {}", stats.sparse_records);
    info!("Documents: {}", stats.documents);
    if stats.pending_documents > 0 {
        warn!("Pending documents: {}", stats.pending_documents);
    }
    if stats.dense_records != stats.sparse_records {
        warn!("Dense and sparse record counts differ");
    }

    Ok(())
}

async fn cmd_health(config: &Config, namespace: Option<String>) -> Result<()> {
    let namespace = resolve_namespace(config, namespace);
    let slow_after = Duration::from_secs(config.retrieval.search_timeout_secs);
    let mut checks = Vec::new();

    match build_indexes(config) {
        Ok((dense, sparse)) => {
            for index in [dense, sparse] {
                let start = Instant::now();
                let result = index
                    .describe(&namespace)
                    .await
                    .map(|stats| format!("{} records", stats.record_count));
                checks.push(HealthCheck::from_probe(
                    &format!("{} index", index.kind()),
                    result,
                    start.elapsed(),
                    slow_after,
                ));
            }
        }
        Err(e) => checks.push(HealthCheck::unhealthy(
            "indexes",
            format!("{:#}", e),
            Duration::ZERO,
        )),
    }

    let start = Instant::now();
    let store_result = match open_store(config).await {
        Ok(store) => store
            .list_documents(&namespace)
            .await
            .map(|docs| format!("{} documents", docs.len()))
            .map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    checks.push(HealthCheck::from_probe(
        "metadata store",
        store_result.map_err(|e| format!("{:#}", e)),
        start.elapsed(),
        slow_after,
    ));

    let report = HealthReport::new(checks, env!("CARGO_PKG_VERSION").to_string());
    println!("{}", report.format());

    if !report.is_healthy() {
        warn!("One or more components are not healthy");
    }

    Ok(())
}
