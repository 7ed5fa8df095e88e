use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use content_loader_core::{
    digest_file, run_ingestion, DedupChecker, DedupFailurePolicy, Embedder, FeatureHashEmbedder,
    InMemoryIndex, IngestionOptions, IngestionSummary, QdrantIndex, VectorIndex,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "content-loader", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "CONTENT_LOADER_QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection holding the chunks
    #[arg(long, env = "CONTENT_LOADER_QDRANT_COLLECTION", default_value = "source_chunks")]
    qdrant_collection: String,

    /// Vector size produced by the embedding step
    #[arg(
        long,
        env = "CONTENT_LOADER_EMBEDDING_DIMENSIONS",
        default_value = "256",
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    embedding_dimensions: usize,

    /// Seconds before a dedup lookup is abandoned
    #[arg(
        long,
        env = "CONTENT_LOADER_DEDUP_TIMEOUT_SECS",
        default_value = "10",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    dedup_timeout_secs: u64,

    /// Behaviour when the dedup lookup cannot reach the index
    #[arg(
        long,
        env = "CONTENT_LOADER_ON_DEDUP_FAILURE",
        value_enum,
        default_value_t = FailurePolicyArg::AssumeNotLoaded
    )]
    on_dedup_failure: FailurePolicyArg,

    /// Log at debug level when RUST_LOG is not set
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load every configured source into the index, skipping content that is already there.
    Ingest {
        /// File, directory, file:// or http(s):// location. Repeatable.
        #[arg(
            long = "source",
            env = "CONTENT_LOADER_SOURCES",
            value_delimiter = ',',
            required = true
        )]
        sources: Vec<String>,
        /// Maximum tokens per chunk.
        #[arg(long, env = "CONTENT_LOADER_MAX_TOKENS", default_value = "800")]
        max_tokens: usize,
        /// Tokens shared by consecutive chunks of one line.
        #[arg(long, env = "CONTENT_LOADER_OVERLAP_TOKENS", default_value = "0")]
        overlap_tokens: usize,
        /// Sources processed concurrently.
        #[arg(long, env = "CONTENT_LOADER_WORKERS", default_value = "1")]
        workers: usize,
        /// File extensions picked up when a source is a directory.
        #[arg(
            long = "extension",
            value_delimiter = ',',
            default_values_t = ["txt".to_string(), "md".to_string()]
        )]
        extensions: Vec<String>,
        /// Use a throwaway in-memory index instead of Qdrant.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Print the summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the content digest of each file.
    Digest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Report whether a file's current content is already in the index.
    Check { path: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum FailurePolicyArg {
    AssumeNotLoaded,
    AssumeLoaded,
}

impl From<FailurePolicyArg> for DedupFailurePolicy {
    fn from(value: FailurePolicyArg) -> Self {
        match value {
            FailurePolicyArg::AssumeNotLoaded => DedupFailurePolicy::AssumeNotLoaded,
            FailurePolicyArg::AssumeLoaded => DedupFailurePolicy::AssumeLoaded,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "content-loader boot"
    );

    let embedder: Arc<dyn Embedder> = Arc::new(FeatureHashEmbedder {
        dimensions: cli.embedding_dimensions,
    });
    let dedup_timeout = Duration::from_secs(cli.dedup_timeout_secs);

    match cli.command {
        Command::Ingest {
            sources,
            max_tokens,
            overlap_tokens,
            workers,
            extensions,
            dry_run,
            json,
        } => {
            let options = IngestionOptions {
                max_tokens,
                overlap_tokens,
                dedup_query_timeout: dedup_timeout,
                on_dedup_failure: cli.on_dedup_failure.into(),
                workers,
                extensions,
                ..IngestionOptions::default()
            };

            let index: Arc<dyn VectorIndex> = if dry_run {
                warn!("dry run: chunks go to an in-memory index and are discarded on exit");
                Arc::new(InMemoryIndex::new())
            } else {
                let qdrant = QdrantIndex::with_embedder(
                    &cli.qdrant_url,
                    &cli.qdrant_collection,
                    embedder.clone(),
                )?;
                qdrant
                    .ensure_collection()
                    .await
                    .context("preparing qdrant collection")?;
                Arc::new(qdrant)
            };

            let summary = run_ingestion(index, options, &sources)
                .await
                .context("ingestion could not start")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Command::Digest { paths } => {
            for path in paths {
                match digest_file(&path) {
                    Ok(digest) => println!("{digest}  {}", path.display()),
                    Err(error) => warn!(path = %path.display(), %error, "unable to hash file"),
                }
            }
        }
        Command::Check { path } => {
            let digest = digest_file(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let qdrant = QdrantIndex::with_embedder(
                &cli.qdrant_url,
                &cli.qdrant_collection,
                embedder.clone(),
            )?;
            let policy = DedupFailurePolicy::from(cli.on_dedup_failure);
            let checker = DedupChecker::new(Arc::new(qdrant), dedup_timeout, policy);

            match checker.lookup(&digest).await {
                Ok(true) => println!("loaded      {digest}  {}", path.display()),
                Ok(false) => println!("not loaded  {digest}  {}", path.display()),
                Err(error) => println!(
                    "unknown     {digest}  {} (lookup failed: {error}; ingest applies {policy:?})",
                    path.display()
                ),
            }
        }
    }

    Ok(())
}

fn print_summary(summary: &IngestionSummary) {
    println!(
        "{} files processed, {} documents loaded, {} chunks written, {} files skipped, {} errors",
        summary.files_processed,
        summary.documents_loaded,
        summary.chunks_written,
        summary.files_skipped,
        summary.errors.len()
    );
    for skipped in &summary.skipped {
        println!("  skipped {} ({})", skipped.location, skipped.reason);
    }
    for failure in &summary.errors {
        println!("  failed  {}: {}", failure.location, failure.error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn zero_embedding_dimensions_are_rejected() {
        let parsed = Cli::try_parse_from([
            "content-loader",
            "--embedding-dimensions",
            "0",
            "digest",
            "a.txt",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn zero_dedup_timeout_is_rejected() {
        let parsed = Cli::try_parse_from([
            "content-loader",
            "--dedup-timeout-secs",
            "0",
            "digest",
            "a.txt",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn positive_limits_are_accepted() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from([
            "content-loader",
            "--embedding-dimensions",
            "64",
            "--dedup-timeout-secs",
            "3",
            "digest",
            "a.txt",
        ])?;
        assert_eq!(cli.embedding_dimensions, 64);
        assert_eq!(cli.dedup_timeout_secs, 3);
        Ok(())
    }
}
