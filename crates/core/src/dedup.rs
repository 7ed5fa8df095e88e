use crate::traits::VectorIndex;
use crate::{ContentDigest, DedupFailurePolicy, IndexError, MetadataFilter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Asks the index whether chunks tagged with a digest already exist.
pub struct DedupChecker<I: ?Sized> {
    index: Arc<I>,
    timeout: Duration,
    on_failure: DedupFailurePolicy,
}

impl<I> DedupChecker<I>
where
    I: VectorIndex + ?Sized,
{
    pub fn new(index: Arc<I>, timeout: Duration, on_failure: DedupFailurePolicy) -> Self {
        Self {
            index,
            timeout,
            on_failure,
        }
    }

    pub async fn already_loaded(&self, digest: &ContentDigest) -> bool {
        match self.lookup(digest).await {
            Ok(found) => {
                debug!(digest = %digest.short(), found, "dedup lookup");
                found
            }
            Err(error) => {
                let assume_loaded = self.on_failure == DedupFailurePolicy::AssumeLoaded;
                warn!(
                    digest = %digest.short(),
                    %error,
                    assume_loaded,
                    "dedup check failed, applying fallback policy"
                );
                assume_loaded
            }
        }
    }

    /// Raw lookup without the fallback policy applied.
    pub async fn lookup(&self, digest: &ContentDigest) -> Result<bool, IndexError> {
        let filter = MetadataFilter::digest_eq(digest);
        let records = tokio::time::timeout(self.timeout, self.index.query(&filter, 1))
            .await
            .map_err(|_| IndexError::Timeout(self.timeout))??;

        Ok(!records.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::digest;
    use crate::stores::InMemoryIndex;
    use crate::{Chunk, IndexRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct UnreachableIndex;

    #[async_trait]
    impl VectorIndex for UnreachableIndex {
        async fn query(
            &self,
            _filter: &MetadataFilter,
            _top_k: usize,
        ) -> Result<Vec<IndexRecord>, IndexError> {
            Err(IndexError::Request("connection refused".to_string()))
        }

        async fn add_batch(&self, _chunks: &[Chunk]) -> Result<(), IndexError> {
            Ok(())
        }
    }

    struct SlowIndex;

    #[async_trait]
    impl VectorIndex for SlowIndex {
        async fn query(
            &self,
            _filter: &MetadataFilter,
            _top_k: usize,
        ) -> Result<Vec<IndexRecord>, IndexError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        async fn add_batch(&self, _chunks: &[Chunk]) -> Result<(), IndexError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        filters: Mutex<Vec<(MetadataFilter, usize)>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn query(
            &self,
            filter: &MetadataFilter,
            top_k: usize,
        ) -> Result<Vec<IndexRecord>, IndexError> {
            if let Ok(mut filters) = self.filters.lock() {
                filters.push((filter.clone(), top_k));
            }
            Ok(vec![IndexRecord {
                id: "1".to_string(),
                text: "existing".to_string(),
                content_digest: None,
                source_file: None,
            }])
        }

        async fn add_batch(&self, _chunks: &[Chunk]) -> Result<(), IndexError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_index_reports_not_loaded() {
        let checker = DedupChecker::new(
            Arc::new(InMemoryIndex::new()),
            Duration::from_secs(1),
            DedupFailurePolicy::AssumeNotLoaded,
        );
        assert!(!checker.already_loaded(&digest(b"fresh")).await);
    }

    #[tokio::test]
    async fn lookup_uses_a_digest_filter_not_a_similarity_query() {
        let index = Arc::new(RecordingIndex::default());
        let checker = DedupChecker::new(
            Arc::clone(&index),
            Duration::from_secs(1),
            DedupFailurePolicy::AssumeNotLoaded,
        );
        let wanted = digest(b"seen");

        assert!(checker.already_loaded(&wanted).await);
        let filters = index.filters.lock().map(|f| f.clone()).unwrap_or_default();
        assert_eq!(filters, vec![(MetadataFilter::digest_eq(&wanted), 1)]);
    }

    #[tokio::test]
    async fn query_failure_follows_configured_policy() {
        let optimistic = DedupChecker::new(
            Arc::new(UnreachableIndex),
            Duration::from_secs(1),
            DedupFailurePolicy::AssumeNotLoaded,
        );
        assert!(!optimistic.already_loaded(&digest(b"x")).await);

        let conservative = DedupChecker::new(
            Arc::new(UnreachableIndex),
            Duration::from_secs(1),
            DedupFailurePolicy::AssumeLoaded,
        );
        assert!(conservative.already_loaded(&digest(b"x")).await);
    }

    #[tokio::test]
    async fn slow_query_times_out() {
        let checker = DedupChecker::new(
            Arc::new(SlowIndex),
            Duration::from_millis(20),
            DedupFailurePolicy::AssumeNotLoaded,
        );
        assert!(matches!(
            checker.lookup(&digest(b"x")).await,
            Err(IndexError::Timeout(_))
        ));
        assert!(!checker.already_loaded(&digest(b"x")).await);
    }
}
