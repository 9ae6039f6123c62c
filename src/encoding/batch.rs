//! Batch encoding into column-oriented output.
//!
//! Row order is explicit: under the truncate policy there is exactly one row
//! per input record, in input order; under the reject policy the rows are the
//! surviving records in input order. Dropped records are reported through
//! [`BatchOutput::dropped`] as well as the log.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use super::assembler::{Assembled, EncodedExample, SequenceAssembler, Variant};
use crate::error::EncodeError;
use crate::records::Record;
use crate::tokenizer::TokenId;

/// Default number of records encoded per chunk by [`BatchEncoder::encode_chunked`].
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// One field per column, aligned by row index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EncodedColumns {
    pub input_ids: Vec<Vec<TokenId>>,
    pub code_mask: Vec<Vec<u8>>,
    pub docstr_mask: Vec<Vec<u8>>,
    pub special_tokens_mask: Vec<Vec<u8>>,
    pub prefix_lm_token_idx: Vec<usize>,
    pub length: Vec<usize>,
}

impl EncodedColumns {
    pub fn push(&mut self, example: EncodedExample) {
        self.input_ids.push(example.input_ids);
        self.code_mask.push(example.code_mask);
        self.docstr_mask.push(example.docstr_mask);
        self.special_tokens_mask.push(example.special_tokens_mask);
        self.prefix_lm_token_idx.push(example.prefix_lm_token_idx);
        self.length.push(example.length);
    }

    pub fn len(&self) -> usize {
        self.length.len()
    }

    pub fn is_empty(&self) -> bool {
        self.length.is_empty()
    }

    /// Rebuilds row `i` as an [`EncodedExample`].
    pub fn row(&self, i: usize) -> Option<EncodedExample> {
        if i >= self.len() {
            return None;
        }
        Some(EncodedExample {
            input_ids: self.input_ids[i].clone(),
            code_mask: self.code_mask[i].clone(),
            docstr_mask: self.docstr_mask[i].clone(),
            special_tokens_mask: self.special_tokens_mask[i].clone(),
            prefix_lm_token_idx: self.prefix_lm_token_idx[i],
            length: self.length[i],
        })
    }

    fn append(&mut self, other: EncodedColumns) {
        self.input_ids.extend(other.input_ids);
        self.code_mask.extend(other.code_mask);
        self.docstr_mask.extend(other.docstr_mask);
        self.special_tokens_mask.extend(other.special_tokens_mask);
        self.prefix_lm_token_idx.extend(other.prefix_lm_token_idx);
        self.length.extend(other.length);
    }
}

/// A record dropped for exceeding the maximum length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedRecord {
    pub id: String,
    pub length: usize,
    pub max_seq_length: usize,
}

/// Encoded batch plus diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutput {
    /// Record id for each emitted row.
    pub ids: Vec<String>,
    pub columns: EncodedColumns,
    pub dropped: Vec<DroppedRecord>,
}

impl BatchOutput {
    pub fn rows(&self) -> usize {
        self.columns.len()
    }

    fn accept(&mut self, record: &Record, assembled: Assembled, max_seq_length: usize) {
        match assembled {
            Assembled::Emitted(example) => {
                self.ids.push(record.id.clone());
                self.columns.push(example);
            }
            Assembled::Rejected { length } => {
                info!(
                    id = %record.id,
                    length = length,
                    max_seq_length = max_seq_length,
                    "Rejecting example {} with length {} > {}",
                    record.id,
                    length,
                    max_seq_length
                );
                self.dropped.push(DroppedRecord {
                    id: record.id.clone(),
                    length,
                    max_seq_length,
                });
            }
        }
    }

    fn extend(&mut self, other: BatchOutput) {
        self.ids.extend(other.ids);
        self.columns.append(other.columns);
        self.dropped.extend(other.dropped);
    }
}

/// Applies a [`SequenceAssembler`] across batches of records.
#[derive(Debug, Clone)]
pub struct BatchEncoder {
    assembler: SequenceAssembler,
    variant: Variant,
}

impl BatchEncoder {
    pub fn new(assembler: SequenceAssembler, variant: Variant) -> Self {
        Self { assembler, variant }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Encodes records one by one on the calling thread.
    pub fn encode_batch(&self, records: &[Record]) -> Result<BatchOutput, EncodeError> {
        let max = self.assembler.max_seq_length();
        let mut output = BatchOutput::default();
        for record in records {
            let assembled = self.assembler.assemble(self.variant, record)?;
            output.accept(record, assembled, max);
        }
        Ok(output)
    }

    /// Encodes records on the rayon global pool.
    ///
    /// Output is identical to [`Self::encode_batch`], including row order.
    pub fn encode_batch_parallel(&self, records: &[Record]) -> Result<BatchOutput, EncodeError> {
        let max = self.assembler.max_seq_length();
        let assembled = records
            .par_iter()
            .map(|record| self.assembler.assemble(self.variant, record))
            .collect::<Result<Vec<_>, _>>()?;

        let mut output = BatchOutput::default();
        for (record, result) in records.iter().zip(assembled) {
            output.accept(record, result, max);
        }
        Ok(output)
    }

    /// Encodes in fixed-size chunks, logging progress after each chunk.
    pub fn encode_chunked(
        &self,
        records: &[Record],
        chunk_size: usize,
        parallel: bool,
    ) -> Result<BatchOutput, EncodeError> {
        let chunk_size = chunk_size.max(1);
        let mut output = BatchOutput::default();
        let mut processed = 0usize;

        for chunk in records.chunks(chunk_size) {
            let part = if parallel {
                self.encode_batch_parallel(chunk)?
            } else {
                self.encode_batch(chunk)?
            };
            processed += chunk.len();
            output.extend(part);
            debug!(
                processed = processed,
                total = records.len(),
                emitted = output.rows(),
                "Encoded chunk"
            );
        }

        info!(
            variant = %self.variant,
            records = records.len(),
            emitted = output.rows(),
            dropped = output.dropped.len(),
            "Batch encoding finished"
        );
        Ok(output)
    }
}
