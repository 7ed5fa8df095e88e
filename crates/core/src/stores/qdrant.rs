use crate::embeddings::{Embedder, FeatureHashEmbedder};
use crate::traits::VectorIndex;
use crate::{Chunk, IndexError, IndexRecord, MetadataFilter};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

const BACKEND: &str = "qdrant";

pub struct QdrantIndex {
    endpoint: Url,
    collection: String,
    client: Client,
    embedder: Arc<dyn Embedder>,
}

impl QdrantIndex {
    pub fn new(endpoint: &str, collection: impl Into<String>) -> Result<Self, IndexError> {
        Self::with_embedder(endpoint, collection, Arc::new(FeatureHashEmbedder::default()))
    }

    pub fn with_embedder(
        endpoint: &str,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, IndexError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            endpoint,
            collection: collection.into(),
            client,
            embedder,
        })
    }

    fn collection_url(&self, suffix: &str) -> Result<Url, IndexError> {
        let path = format!("collections/{}{}", self.collection, suffix);
        Ok(self.endpoint.join(&path)?)
    }

    /// Creates the collection and a keyword payload index on `content_digest` if missing.
    pub async fn ensure_collection(&self) -> Result<(), IndexError> {
        let response = self.client.get(self.collection_url("")?).send().await?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }

        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        info!(
            collection = %self.collection,
            dimensions = self.embedder.dimensions(),
            "creating qdrant collection"
        );
        let response = self
            .client
            .put(self.collection_url("")?)
            .json(&json!({
                "vectors": {
                    "size": self.embedder.dimensions(),
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .put(self.collection_url("/index?wait=true")?)
            .json(&json!({
                "field_name": "content_digest",
                "field_schema": "keyword",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn query(
        &self,
        filter: &MetadataFilter,
        top_k: usize,
    ) -> Result<Vec<IndexRecord>, IndexError> {
        let response = self
            .client
            .post(self.collection_url("/points/scroll")?)
            .json(&json!({
                "filter": render_filter(filter),
                "limit": top_k,
                "with_payload": true,
                "with_vector": false,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        parse_scroll_records(&parsed)
    }

    async fn add_batch(&self, chunks: &[Chunk]) -> Result<(), IndexError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts);
        let points = build_points(chunks, &embeddings, self.embedder.dimensions())?;

        debug!(collection = %self.collection, points = points.len(), "upserting points");
        let response = self
            .client
            .put(self.collection_url("/points?wait=true")?)
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }
}

fn backend_error(status: StatusCode) -> IndexError {
    IndexError::BackendResponse {
        backend: BACKEND.to_string(),
        details: status.to_string(),
    }
}

pub(crate) fn render_filter(filter: &MetadataFilter) -> Value {
    match filter {
        MetadataFilter::Eq { .. } => json!({ "must": [render_condition(filter)] }),
        MetadataFilter::And(clauses) => {
            json!({ "must": clauses.iter().map(render_condition).collect::<Vec<_>>() })
        }
    }
}

fn render_condition(filter: &MetadataFilter) -> Value {
    match filter {
        MetadataFilter::Eq { field, value } => json!({
            "key": field.key(),
            "match": { "value": value },
        }),
        MetadataFilter::And(_) => render_filter(filter),
    }
}

fn build_points(
    chunks: &[Chunk],
    embeddings: &[Vec<f32>],
    dimensions: usize,
) -> Result<Vec<Value>, IndexError> {
    if chunks.len() != embeddings.len() {
        return Err(IndexError::Request(format!(
            "embedding count {} doesn't match chunk count {}",
            embeddings.len(),
            chunks.len()
        )));
    }

    chunks
        .iter()
        .zip(embeddings.iter())
        .map(|(chunk, embedding)| {
            if embedding.len() != dimensions {
                return Err(IndexError::Request(format!(
                    "embedding dimension {} != {}",
                    embedding.len(),
                    dimensions
                )));
            }

            Ok(json!({
                "id": chunk.chunk_id.to_string(),
                "vector": embedding,
                "payload": {
                    "text": chunk.text,
                    "source_file": chunk.metadata.source_file,
                    "content_digest": chunk.metadata.content_digest.as_str(),
                    "ingested_at": chunk.metadata.ingested_at.to_rfc3339(),
                    "content_category": chunk.metadata.content_category.as_str(),
                    "source_location": chunk.metadata.source_location,
                    "line_number": chunk.line_number,
                    "chunk_index": chunk.chunk_index,
                    "chunk_count": chunk.chunk_count,
                },
            }))
        })
        .collect()
}

fn parse_scroll_records(parsed: &Value) -> Result<Vec<IndexRecord>, IndexError> {
    let points = parsed
        .pointer("/result/points")
        .and_then(Value::as_array)
        .ok_or_else(|| IndexError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "scroll response has no result.points".to_string(),
        })?;

    Ok(points
        .iter()
        .map(|point| {
            let id = match point.pointer("/id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => String::new(),
            };
            let payload_str = |key: &str| {
                point
                    .pointer(&format!("/payload/{key}"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };

            IndexRecord {
                id,
                text: payload_str("text").unwrap_or_default(),
                content_digest: payload_str("content_digest"),
                source_file: payload_str("source_file"),
            }
        })
        .collect())
}
