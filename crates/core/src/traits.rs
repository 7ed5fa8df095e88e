use crate::{Chunk, IndexError, IndexRecord, MetadataFilter};
use async_trait::async_trait;

/// The two index operations the ingestion pipeline depends on.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Metadata-filtered lookup. Must not depend on similarity ranking.
    async fn query(
        &self,
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<IndexRecord>, IndexError>;

    async fn add_batch(&self, chunks: &[Chunk]) -> Result<(), IndexError>;
}

#[async_trait]
impl<T> VectorIndex for std::sync::Arc<T>
where
    T: VectorIndex + ?Sized,
{
    async fn query(
        &self,
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<IndexRecord>, IndexError> {
        (**self).query(filter, top_k).await
    }

    async fn add_batch(&self, chunks: &[Chunk]) -> Result<(), IndexError> {
        (**self).add_batch(chunks).await
    }
}
