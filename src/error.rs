// Error taxonomy for table loading, collaborator services and per-document processing.
// Configuration errors abort a run; document errors only skip the document that raised them.

use std::path::PathBuf;
use thiserror::Error;

use crate::aligner::AlignmentReport;

/// Fatal problems with the loaded tables or run configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read table {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}, line {line}: {expected} tab-separated items expected, {found} found", .path.display())]
    MalformedLine {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("rule {index} has an invalid target pattern {pattern:?}: {message}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        message: String,
    },

    #[error("irregular verb table {} is not valid JSON: {source}", .path.display())]
    InvalidIrregularTable {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no irregular verb table loaded; past tense derivation needs one")]
    MissingIrregularTable,

    #[error("irregular verb {verb:?} has no past tense spelling")]
    EmptyIrregularEntry { verb: String },

    #[error("past tense marker {marker:?} is unusable: {reason}")]
    InvalidMarker { marker: String, reason: String },

    #[error("past tense marker {marker:?} already occurs in {}", .path.display())]
    MarkerInCorpus { marker: String, path: PathBuf },

    #[error("unsupported annotation columns: {0}")]
    InvalidAnnotationColumns(String),

    #[error("batch width must be at least 1")]
    ZeroBatchWidth,
}

/// Failures of the external tokenizer/annotator
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to run annotator backend: {0}")]
    Backend(#[from] std::io::Error),

    #[error("annotator backend exited with {status}: {stderr}")]
    BackendStatus { status: String, stderr: String },

    #[error("unparseable annotator output: {0}")]
    Unparseable(String),

    #[error("annotator gave up after narrowing the chunk step to zero (started at {initial_step} tokens)")]
    Exhausted { initial_step: usize },

    #[error("annotator returned no annotations")]
    Empty,
}

/// Reasons a single document is skipped
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("body text is {length} chars, outside the accepted window [{lower}, {}]", describe_upper(.upper))]
    LengthGate {
        length: usize,
        lower: usize,
        upper: Option<usize>,
    },

    #[error("normalized body has {} tokens against {} tokenized; misaligned at {:?}", .0.normalized_len, .0.tokenized_len, .0.misaligned_indices)]
    Alignment(AlignmentReport),

    #[error("placeholder at unit {unit} has no remaining tag ({tags} tags extracted)")]
    TagsExhausted { unit: usize, tags: usize },

    #[error("annotation column {column} has {len} values but unit {unit} needs one")]
    AnnotationTooShort { column: String, len: usize, unit: usize },

    #[error("normalized body has {normalized} units but tokenized body has {tokenized}")]
    NormalizedTooShort { tokenized: usize, normalized: usize },

    #[error("{used} of {tags} extracted tags were restored")]
    TagsLeftOver { used: usize, tags: usize },

    #[error("<{0}> region not found")]
    RegionMissing(String),

    #[error("annotation unavailable: {0}")]
    ServiceUnavailable(#[from] ServiceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_upper(upper: &Option<usize>) -> String {
    match upper {
        Some(limit) => limit.to_string(),
        None => "unbounded".to_string(),
    }
}

impl DocumentError {
    /// Short machine-readable label used in run statistics
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentError::LengthGate { .. } => "length_gate",
            DocumentError::Alignment(_) => "alignment",
            DocumentError::TagsExhausted { .. }
            | DocumentError::AnnotationTooShort { .. }
            | DocumentError::NormalizedTooShort { .. }
            | DocumentError::TagsLeftOver { .. } => "reconstruction",
            DocumentError::RegionMissing(_) => "region_missing",
            DocumentError::ServiceUnavailable(_) => "service_unavailable",
            DocumentError::Io(_) => "io",
        }
    }
}
