//! Sequence encoding for prefix-LM training.
//!
//! Turns (signature, docstring, code) records into flat token sequences with
//! parallel code, docstring, and special-token masks plus a prefix cut-point.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use codelm_forge::encoding::{BatchEncoder, SequenceAssembler, Variant};
//! use codelm_forge::tokenizer::{HfTokenizerAdapter, SpecialTokenIds, SpecialTokenNames};
//!
//! let tokenizer = Arc::new(HfTokenizerAdapter::from_file("tokenizer.json".as_ref())?);
//! let special = SpecialTokenIds::resolve(tokenizer.as_ref(), &SpecialTokenNames::default())?;
//! let assembler = SequenceAssembler::new(tokenizer, special, 1024);
//! let output = BatchEncoder::new(assembler, Variant::SignatureAware).encode_batch(&records)?;
//! println!("{} rows, {} dropped", output.rows(), output.dropped.len());
//! ```

pub mod assembler;
pub mod batch;
pub mod docstring;
pub mod remap;
pub mod signature;

pub use assembler::{
    Assembled, EncodedExample, LengthPolicy, SequenceAssembler, Variant, DEFAULT_MAX_SEQ_LENGTH,
};
pub use batch::{BatchEncoder, BatchOutput, DroppedRecord, EncodedColumns, DEFAULT_CHUNK_SIZE};
pub use docstring::wrap_docstring;
pub use remap::VocabRemap;
pub use signature::{
    split_signature, ExtractionReport, SignatureExtractor, SignatureSplit, END_OF_SIGNATURE,
};
