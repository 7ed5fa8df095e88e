use crate::error::IngestError;
use crate::models::{Chunk, ContentDigest, Document, DocumentMetadata, IngestionOptions};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::ops::Range;
use uuid::Uuid;

const TOKEN_PATTERN: &str = r"\w+|[^\w\s]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl ChunkingConfig {
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Result<Self, IngestError> {
        if max_tokens == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if overlap_tokens >= max_tokens {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_tokens ({overlap_tokens}) must be smaller than max_tokens ({max_tokens})"
            )));
        }

        Ok(Self {
            max_tokens,
            overlap_tokens,
        })
    }

    fn step(&self) -> usize {
        self.max_tokens - self.overlap_tokens
    }
}

impl TryFrom<&IngestionOptions> for ChunkingConfig {
    type Error = IngestError;

    fn try_from(value: &IngestionOptions) -> Result<Self, Self::Error> {
        Self::new(value.max_tokens, value.overlap_tokens)
    }
}

/// One document per non-blank line; blank and whitespace-only lines never become documents.
pub fn partition_documents(text: &str, metadata: &DocumentMetadata) -> Vec<Document> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| Document {
            line_number: index as u64 + 1,
            text: line.to_string(),
            metadata: metadata.clone(),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Splitter {
    config: ChunkingConfig,
    token_re: Regex,
}

impl Splitter {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        let token_re = Regex::new(TOKEN_PATTERN)
            .map_err(|error| IngestError::InvalidChunkConfig(error.to_string()))?;
        Ok(Self { config, token_re })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Byte ranges of each token in `text`.
    pub fn tokenize(&self, text: &str) -> Vec<Range<usize>> {
        self.token_re
            .find_iter(text)
            .map(|found| found.range())
            .collect()
    }

    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let tokens = self.tokenize(&document.text);
        let windows = token_windows(tokens.len(), self.config);
        let chunk_count = windows.len() as u32;

        windows
            .into_iter()
            .enumerate()
            .map(|(index, window)| {
                let byte_start = tokens[window.start].start;
                let byte_end = tokens[window.end - 1].end;
                let chunk_index = index as u32;

                Chunk {
                    chunk_id: make_chunk_id(
                        &document.metadata.content_digest,
                        document.line_number,
                        chunk_index,
                    ),
                    text: document.text[byte_start..byte_end].to_string(),
                    metadata: document.metadata.clone(),
                    line_number: document.line_number,
                    chunk_index,
                    chunk_count,
                    token_start: window.start,
                    token_end: window.end,
                }
            })
            .collect()
    }
}

pub fn split(
    document: &Document,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<Chunk>, IngestError> {
    let splitter = Splitter::new(ChunkingConfig::new(max_tokens, overlap_tokens)?)?;
    Ok(splitter.split(document))
}

fn token_windows(token_count: usize, config: ChunkingConfig) -> Vec<Range<usize>> {
    let mut windows = Vec::new();
    let mut start = 0;

    while start < token_count {
        let end = (start + config.max_tokens).min(token_count);
        windows.push(start..end);
        if end == token_count {
            break;
        }
        start += config.step();
    }

    windows
}

fn make_chunk_id(digest: &ContentDigest, line_number: u64, chunk_index: u32) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(digest.as_str().as_bytes());
    hasher.update(line_number.to_le_bytes());
    hasher.update(chunk_index.to_le_bytes());
    let hash = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);
    Uuid::from_bytes(bytes)
}
