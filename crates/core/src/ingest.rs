use crate::chunking::{partition_documents, ChunkingConfig, Splitter};
use crate::dedup::DedupChecker;
use crate::hasher::digest;
use crate::sources::{read_source, resolve, ResolvedSource, SourceLocation};
use crate::traits::VectorIndex;
use crate::{
    Chunk, ContentCategory, ContentDigest, DocumentMetadata, IngestError, IngestionOptions,
    IngestionSummary, SkipReason,
};
use chrono::Utc;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Drives hash, dedup, split and write for every configured location.
pub struct IngestionPipeline<I: ?Sized> {
    inner: Arc<PipelineInner<I>>,
}

struct PipelineInner<I: ?Sized> {
    index: Arc<I>,
    dedup: DedupChecker<I>,
    splitter: Splitter,
    options: IngestionOptions,
    http: Client,
    digest_locks: DigestLocks,
}

enum SourceOutcome {
    Loaded { documents: usize, chunks: usize },
    Skipped(SkipReason),
}

impl<I> IngestionPipeline<I>
where
    I: VectorIndex + ?Sized + 'static,
{
    pub fn new(index: Arc<I>, options: IngestionOptions) -> Result<Self, IngestError> {
        let splitter = Splitter::new(ChunkingConfig::try_from(&options)?)?;

        if options.workers == 0 {
            return Err(IngestError::InvalidArgument(
                "workers must be at least 1".to_string(),
            ));
        }

        let dedup = DedupChecker::new(
            Arc::clone(&index),
            options.dedup_query_timeout,
            options.on_dedup_failure,
        );

        Ok(Self {
            inner: Arc::new(PipelineInner {
                index,
                dedup,
                splitter,
                http: Client::new(),
                options,
                digest_locks: DigestLocks::default(),
            }),
        })
    }

    pub fn options(&self) -> &IngestionOptions {
        &self.inner.options
    }

    /// Attempts every location once. Only an unusable configuration is returned as `Err`;
    /// per-source problems are reported in the summary.
    pub async fn run(&self, locations: &[String]) -> Result<IngestionSummary, IngestError> {
        if locations.is_empty() {
            return Err(IngestError::InvalidArgument(
                "no source locations configured".to_string(),
            ));
        }

        info!(
            locations = locations.len(),
            workers = self.inner.options.workers,
            "starting ingestion"
        );

        let mut summary = IngestionSummary::default();
        let mut resolved = Vec::new();

        for raw in locations {
            let expanded = SourceLocation::parse(raw)
                .and_then(|location| resolve(&location, &self.inner.options.extensions));

            match expanded {
                Ok(resolution) => {
                    resolved.extend(resolution.sources);
                    for skipped in resolution.skipped {
                        summary.record_skip(skipped.location, skipped.reason);
                    }
                }
                Err(error) => {
                    warn!(location = %raw, %error, "skipping unresolvable source location");
                    summary.record_skip(raw.as_str(), SkipReason::Unavailable(error.to_string()));
                }
            }
        }

        if resolved.is_empty() {
            return Err(IngestError::NoResolvableSources);
        }

        if self.inner.options.workers <= 1 {
            for source in resolved {
                summary.merge(self.inner.process(&source).await);
            }
        } else {
            summary.merge(self.run_parallel(resolved).await);
        }

        info!(
            files_processed = summary.files_processed,
            documents_loaded = summary.documents_loaded,
            chunks_written = summary.chunks_written,
            files_skipped = summary.files_skipped,
            errors = summary.errors.len(),
            "ingestion completed"
        );

        Ok(summary)
    }

    async fn run_parallel(&self, resolved: Vec<ResolvedSource>) -> IngestionSummary {
        let semaphore = Arc::new(Semaphore::new(self.inner.options.workers));
        let mut join_set = JoinSet::new();
        let mut summary = IngestionSummary::default();

        for source in resolved {
            let semaphore = Arc::clone(&semaphore);
            let inner = Arc::clone(&self.inner);

            join_set.spawn(async move {
                let location = source.location.to_string();
                match semaphore.acquire_owned().await {
                    Ok(_permit) => inner.process(&source).await,
                    Err(error) => {
                        let mut outcome = IngestionSummary::default();
                        outcome.record_error(location, error);
                        outcome
                    }
                }
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => summary.merge(outcome),
                Err(join_error) => {
                    error!(%join_error, "ingestion worker failed");
                    summary.record_error("<worker>", join_error);
                }
            }
        }

        summary
    }
}

impl<I> PipelineInner<I>
where
    I: VectorIndex + ?Sized,
{
    async fn process(&self, source: &ResolvedSource) -> IngestionSummary {
        let location = source.location.to_string();
        let mut outcome = IngestionSummary::default();

        match self.load_source(source).await {
            Ok(SourceOutcome::Loaded { documents, chunks }) => {
                info!(%location, documents, chunks, "loaded source");
                outcome.files_processed = 1;
                outcome.documents_loaded = documents;
                outcome.chunks_written = chunks;
            }
            Ok(SourceOutcome::Skipped(reason)) => {
                info!(%location, %reason, "skipped source");
                outcome.record_skip(location, reason);
            }
            Err(IngestError::SourceUnavailable(reason)) => {
                warn!(%location, %reason, "source unavailable");
                outcome.record_skip(location, SkipReason::Unavailable(reason));
            }
            Err(error) => {
                error!(%location, %error, "failed to load source");
                outcome.record_error(location, error);
            }
        }

        outcome
    }

    async fn load_source(&self, resolved: &ResolvedSource) -> Result<SourceOutcome, IngestError> {
        let source = read_source(resolved, &self.http).await?;
        let content_digest = digest(&source.content);
        debug!(
            location = %source.location,
            digest = %content_digest.short(),
            bytes = source.content.len(),
            "hashed source"
        );

        // Held until the batch write finishes so concurrent sources with identical bytes serialise.
        let _guard = self.digest_locks.acquire(&content_digest).await;

        if self.dedup.already_loaded(&content_digest).await {
            return Ok(SourceOutcome::Skipped(SkipReason::AlreadyLoaded));
        }

        let text = String::from_utf8(source.content).map_err(|error| {
            IngestError::InvalidEncoding(format!("{}: {error}", source.location))
        })?;

        let metadata = DocumentMetadata {
            content_category: ContentCategory::classify(&source.file_name),
            source_file: source.file_name,
            content_digest,
            ingested_at: Utc::now(),
            source_location: source.location,
        };

        let documents = partition_documents(&text, &metadata);
        if documents.is_empty() {
            return Ok(SourceOutcome::Skipped(SkipReason::Empty));
        }

        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|document| self.splitter.split(document))
            .collect();

        if chunks.len() > self.options.max_chunks_per_source {
            return Err(IngestError::InvalidArgument(format!(
                "{} chunks exceed the per-source limit of {}",
                chunks.len(),
                self.options.max_chunks_per_source
            )));
        }

        self.index.add_batch(&chunks).await?;

        Ok(SourceOutcome::Loaded {
            documents: documents.len(),
            chunks: chunks.len(),
        })
    }
}

type DigestLockMap = HashMap<ContentDigest, Arc<tokio::sync::Mutex<()>>>;

#[derive(Default)]
struct DigestLocks {
    locks: Mutex<DigestLockMap>,
}

impl DigestLocks {
    async fn acquire(&self, digest: &ContentDigest) -> DigestGuard<'_> {
        let lock = {
            let mut locks = self.map();
            Arc::clone(locks.entry(digest.clone()).or_default())
        };

        DigestGuard {
            locks: self,
            digest: digest.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    fn map(&self) -> MutexGuard<'_, DigestLockMap> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.map().len()
    }
}

/// Releases the digest and drops its map entry once nobody else holds or waits on it.
struct DigestGuard<'a> {
    locks: &'a DigestLocks,
    digest: ContentDigest,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DigestGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.map();
        let idle = locks
            .get(&self.digest)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.digest);
        }
    }
}

/// One-shot entry point: builds a pipeline over `index` and runs it over `locations`.
pub async fn run_ingestion<I>(
    index: Arc<I>,
    options: IngestionOptions,
    locations: &[String],
) -> Result<IngestionSummary, IngestError>
where
    I: VectorIndex + ?Sized + 'static,
{
    IngestionPipeline::new(index, options)?.run(locations).await
}
