//! Error types for codelm-forge operations.
//!
//! Defines error types for the major subsystems:
//! - Record loading and JSONL persistence
//! - Tokenizer adapters and special-token resolution
//! - Sequence encoding
//! - Generation filtering
//! - Docstring augmentation
//! - Column export (JSONL, Parquet)

use thiserror::Error;

/// Errors that can occur while reading or writing persisted records.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Malformed record at {path}:{line}: {message}")]
    Malformed {
        path: String,
        line: usize,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a tokenizer adapter.
#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("Failed to load tokenizer from '{path}': {message}")]
    LoadFailed { path: String, message: String },

    #[error("Special token '{0}' is not in the tokenizer vocabulary")]
    UnknownSpecialToken(String),

    #[error("Tokenizer encode error: {0}")]
    Encode(String),
}

/// Errors that can occur during sequence encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),

    #[error(
        "Parallel arrays diverged for record '{id}': input_ids={input_ids}, code_mask={code_mask}, docstr_mask={docstr_mask}, special_tokens_mask={special_tokens_mask}"
    )]
    MaskLengthMismatch {
        id: String,
        input_ids: usize,
        code_mask: usize,
        docstr_mask: usize,
        special_tokens_mask: usize,
    },

    #[error("Invalid vocabulary remap: {0}")]
    InvalidRemap(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while filtering sampled generations.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Failed to build distance worker pool: {0}")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),

    #[error("Distance computation failed for task '{task_id}': {message}")]
    DistanceWorker { task_id: String, message: String },

    #[error("Invalid keep count: {0}")]
    InvalidKeep(usize),

    #[error("Invalid threshold ratio: {0}")]
    InvalidThresholdRatio(f64),
}

/// Errors that can occur during docstring augmentation.
#[derive(Debug, Error)]
pub enum AugmentError {
    #[error("Missing API key: set OPENROUTER_API_KEY or pass --api-key")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("Paraphraser returned no text")]
    EmptyResponse,

    #[error("Failed to parse paraphraser response: {0}")]
    ParseError(String),
}

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
