use crate::traits::VectorIndex;
use crate::{Chunk, IndexError, IndexRecord, MetadataFilter};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

/// Process-local index used for dry runs and tests. Writes are upserts keyed by chunk id.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    chunks: Mutex<Vec<Chunk>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Chunk>>, IndexError> {
        self.chunks
            .lock()
            .map_err(|_| IndexError::Request("in-memory index lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|chunks| chunks.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Chunk> {
        self.lock().map(|chunks| chunks.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(
        &self,
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<IndexRecord>, IndexError> {
        let chunks = self.lock()?;
        Ok(chunks
            .iter()
            .filter(|chunk| filter.matches(&chunk.metadata))
            .take(top_k)
            .map(|chunk| IndexRecord {
                id: chunk.chunk_id.to_string(),
                text: chunk.text.clone(),
                content_digest: Some(chunk.metadata.content_digest.to_string()),
                source_file: Some(chunk.metadata.source_file.clone()),
            })
            .collect())
    }

    async fn add_batch(&self, batch: &[Chunk]) -> Result<(), IndexError> {
        let mut chunks = self.lock()?;
        for chunk in batch {
            match chunks
                .iter_mut()
                .find(|existing| existing.chunk_id == chunk.chunk_id)
            {
                Some(existing) => *existing = chunk.clone(),
                None => chunks.push(chunk.clone()),
            }
        }
        Ok(())
    }
}
