//! codelm-forge: training-data preparation for code language models.
//!
//! Turns (docstring, signature, code) records into prefix-LM token sequences
//! with parallel masks, and filters sampled code generations per task down to
//! the most diverse subset.

pub mod augment;
pub mod cli;
pub mod config;
pub mod encoding;
pub mod error;
pub mod export;
pub mod filter;
pub mod records;
pub mod tokenizer;

// Re-export commonly used types
pub use config::{ConfigError, PrepConfig};
pub use encoding::{BatchEncoder, BatchOutput, EncodedExample, SequenceAssembler, Variant};
pub use error::{
    AugmentError, EncodeError, ExportError, FilterError, RecordError, TokenizerError,
};
pub use filter::{DiversityFilter, DiversityFilterBuilder};
pub use records::{GenerationSample, Record, TaskGroup};
