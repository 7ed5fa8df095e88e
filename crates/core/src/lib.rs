pub mod chunking;
pub mod dedup;
pub mod embeddings;
pub mod error;
pub mod hasher;
pub mod ingest;
pub mod models;
pub mod sources;
pub mod stores;
pub mod traits;

pub use chunking::{partition_documents, split, ChunkingConfig, Splitter};
pub use dedup::DedupChecker;
pub use embeddings::{Embedder, FeatureHashEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IndexError, IngestError};
pub use hasher::{digest, digest_file};
pub use ingest::{run_ingestion, IngestionPipeline};
pub use models::{
    Chunk, ContentCategory, ContentDigest, DedupFailurePolicy, Document, DocumentMetadata,
    IndexRecord, IngestionOptions, IngestionSummary, MetadataField, MetadataFilter, SkipReason,
    SkippedSource, Source, SourceFailure,
};
pub use sources::{
    discover_files, resolve, Discovery, Resolution, ResolvedSource, SourceLocation,
};
pub use stores::{InMemoryIndex, QdrantIndex};
pub use traits::VectorIndex;
