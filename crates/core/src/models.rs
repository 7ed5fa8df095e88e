use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::IngestError;

/// Hex-encoded SHA-256 of a source's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub const HEX_LEN: usize = 64;

    pub(crate) fn from_hex_unchecked(hex: String) -> Self {
        Self(hex)
    }

    pub fn parse(value: &str) -> Result<Self, IngestError> {
        let valid = value.len() == Self::HEX_LEN
            && value
                .bytes()
                .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte));

        if !valid {
            return Err(IngestError::InvalidArgument(format!(
                "not a lowercase sha-256 hex digest: {value}"
            )));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Books,
    Articles,
    Documents,
    General,
}

impl ContentCategory {
    /// Keyword match on the file name; first hit wins.
    pub fn classify(file_name: &str) -> Self {
        let lowered = file_name.to_lowercase();
        if lowered.contains("book") {
            Self::Books
        } else if lowered.contains("article") {
            Self::Articles
        } else if lowered.contains("doc") {
            Self::Documents
        } else {
            Self::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Books => "books",
            Self::Articles => "articles",
            Self::Documents => "documents",
            Self::General => "general",
        }
    }
}

/// A source after its bytes were read. Lives only for the duration of one source's processing.
#[derive(Debug, Clone)]
pub struct Source {
    pub location: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_file: String,
    pub content_digest: ContentDigest,
    pub ingested_at: DateTime<Utc>,
    pub content_category: ContentCategory,
    pub source_location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub line_number: u64,
    pub text: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: Uuid,
    pub text: String,
    pub metadata: DocumentMetadata,
    pub line_number: u64,
    pub chunk_index: u32,
    pub chunk_count: u32,
    pub token_start: usize,
    pub token_end: usize,
}

impl Chunk {
    pub fn token_len(&self) -> usize {
        self.token_end - self.token_start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    SourceFile,
    ContentDigest,
    ContentCategory,
    SourceLocation,
}

impl MetadataField {
    pub fn key(&self) -> &'static str {
        match self {
            Self::SourceFile => "source_file",
            Self::ContentDigest => "content_digest",
            Self::ContentCategory => "content_category",
            Self::SourceLocation => "source_location",
        }
    }

    pub fn value_of<'a>(&self, metadata: &'a DocumentMetadata) -> &'a str {
        match self {
            Self::SourceFile => &metadata.source_file,
            Self::ContentDigest => metadata.content_digest.as_str(),
            Self::ContentCategory => metadata.content_category.as_str(),
            Self::SourceLocation => &metadata.source_location,
        }
    }
}

/// Typed metadata predicate handed to an index backend.
/// Each backend renders it to its own query language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataFilter {
    Eq { field: MetadataField, value: String },
    And(Vec<MetadataFilter>),
}

impl MetadataFilter {
    pub fn digest_eq(digest: &ContentDigest) -> Self {
        Self::Eq {
            field: MetadataField::ContentDigest,
            value: digest.as_str().to_string(),
        }
    }

    pub fn and(self, other: MetadataFilter) -> Self {
        match self {
            Self::And(mut clauses) => {
                clauses.push(other);
                Self::And(clauses)
            }
            single => Self::And(vec![single, other]),
        }
    }

    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        match self {
            Self::Eq { field, value } => field.value_of(metadata) == value,
            Self::And(clauses) => clauses.iter().all(|clause| clause.matches(metadata)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub content_digest: Option<String>,
    pub source_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupFailurePolicy {
    /// Proceed with ingestion; risks a duplicate write while the index is unreachable.
    #[default]
    AssumeNotLoaded,
    /// Skip the source; risks missing new content while the index is unreachable.
    AssumeLoaded,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub dedup_query_timeout: Duration,
    pub on_dedup_failure: DedupFailurePolicy,
    pub workers: usize,
    pub extensions: Vec<String>,
    pub max_chunks_per_source: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            overlap_tokens: 0,
            dedup_query_timeout: Duration::from_secs(10),
            on_dedup_failure: DedupFailurePolicy::AssumeNotLoaded,
            workers: 1,
            extensions: vec!["txt".to_string(), "md".to_string()],
            max_chunks_per_source: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    Unavailable(String),
    AlreadyLoaded,
    Empty,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "unavailable: {reason}"),
            Self::AlreadyLoaded => f.write_str("already loaded"),
            Self::Empty => f.write_str("no non-blank content"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSource {
    pub location: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub location: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub files_processed: usize,
    pub documents_loaded: usize,
    pub chunks_written: usize,
    pub files_skipped: usize,
    pub skipped: Vec<SkippedSource>,
    pub errors: Vec<SourceFailure>,
}

impl IngestionSummary {
    pub fn record_skip(&mut self, location: impl Into<String>, reason: SkipReason) {
        self.files_skipped += 1;
        self.skipped.push(SkippedSource {
            location: location.into(),
            reason,
        });
    }

    pub fn record_error(&mut self, location: impl Into<String>, error: impl fmt::Display) {
        self.errors.push(SourceFailure {
            location: location.into(),
            error: error.to_string(),
        });
    }

    pub fn merge(&mut self, other: IngestionSummary) {
        self.files_processed += other.files_processed;
        self.documents_loaded += other.documents_loaded;
        self.chunks_written += other.chunks_written;
        self.files_skipped += other.files_skipped;
        self.skipped.extend(other.skipped);
        self.errors.extend(other.errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> DocumentMetadata {
        DocumentMetadata {
            source_file: "handbook.txt".to_string(),
            content_digest: ContentDigest::from_hex_unchecked("ab".repeat(32)),
            ingested_at: Utc::now(),
            content_category: ContentCategory::Books,
            source_location: "/data/handbook.txt".to_string(),
        }
    }

    #[test]
    fn classify_uses_first_matching_keyword() {
        assert_eq!(ContentCategory::classify("MyBook.txt"), ContentCategory::Books);
        assert_eq!(
            ContentCategory::classify("article-docs.txt"),
            ContentCategory::Articles
        );
        assert_eq!(ContentCategory::classify("docs.md"), ContentCategory::Documents);
        assert_eq!(ContentCategory::classify("input.txt"), ContentCategory::General);
    }

    #[test]
    fn digest_parse_rejects_malformed_values() {
        assert!(ContentDigest::parse("abc").is_err());
        assert!(ContentDigest::parse(&"' or 1 == 1".repeat(6)).is_err());
        assert!(ContentDigest::parse(&"AB".repeat(32)).is_err());
        assert!(ContentDigest::parse(&"0f".repeat(32)).is_ok());
    }

    #[test]
    fn filter_matches_on_typed_fields() {
        let metadata = metadata();
        let digest = metadata.content_digest.clone();

        assert!(MetadataFilter::digest_eq(&digest).matches(&metadata));

        let combined = MetadataFilter::digest_eq(&digest).and(MetadataFilter::Eq {
            field: MetadataField::ContentCategory,
            value: "articles".to_string(),
        });
        assert!(!combined.matches(&metadata));
    }

    #[test]
    fn summary_merge_accumulates_counts() {
        let mut left = IngestionSummary {
            files_processed: 1,
            documents_loaded: 2,
            ..IngestionSummary::default()
        };
        let mut right = IngestionSummary::default();
        right.record_skip("b.txt", SkipReason::AlreadyLoaded);
        right.record_error("c.txt", "boom");

        left.merge(right);
        assert_eq!(left.files_processed, 1);
        assert_eq!(left.documents_loaded, 2);
        assert_eq!(left.files_skipped, 1);
        assert_eq!(left.errors.len(), 1);
    }
}
