//! Sequence assembly for prefix-LM training examples.
//!
//! An example is one flat token sequence made of marker tokens and encoded
//! text runs, plus three 0/1 masks aligned with it:
//!
//! | Segment          | code_mask | docstr_mask | special_tokens_mask |
//! |------------------|-----------|-------------|---------------------|
//! | begin marker     | 1         | 1           | 1                   |
//! | signature ids    | 1         | 1           | 0                   |
//! | comment marker   | 0         | 1           | 1                   |
//! | docstring ids    | 0         | 1           | 0                   |
//! | code marker      | 0         | 1           | 1                   |
//! | code ids         | 1         | 0           | 0                   |
//! | end marker       | 1         | 0           | 1                   |
//!
//! The begin marker and signature only exist in the signature-aware variant.
//! Masks are assigned by segment membership, never by looking at token values.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::docstring::wrap_docstring;
use super::remap::VocabRemap;
use super::signature::split_signature;
use crate::error::EncodeError;
use crate::records::Record;
use crate::tokenizer::{SpecialTokenIds, TokenId, TokenizerAdapter};

/// Default maximum sequence length.
pub const DEFAULT_MAX_SEQ_LENGTH: usize = 1024;

/// Which segment layout to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// `[comment] docstring [code] code [end]`
    Simple,
    /// `[begin] signature [comment] docstring [code] code [end]`
    SignatureAware,
}

impl Variant {
    pub fn length_policy(self) -> LengthPolicy {
        match self {
            Variant::Simple => LengthPolicy::Reject,
            Variant::SignatureAware => LengthPolicy::Truncate,
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Variant::Simple => "simple",
            Variant::SignatureAware => "signature_aware",
        };
        write!(f, "{}", name)
    }
}

/// What happens to a sequence longer than the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPolicy {
    /// Drop the example entirely.
    Reject,
    /// Cut every parallel array to the maximum length.
    Truncate,
}

/// One training example.
///
/// All four sequences have length `length`, and
/// `prefix_lm_token_idx <= length`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedExample {
    pub input_ids: Vec<TokenId>,
    pub code_mask: Vec<u8>,
    pub docstr_mask: Vec<u8>,
    pub special_tokens_mask: Vec<u8>,
    /// Number of leading tokens treated as unmasked context.
    pub prefix_lm_token_idx: usize,
    pub length: usize,
}

/// Result of assembling one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    Emitted(EncodedExample),
    /// Dropped under [`LengthPolicy::Reject`]; `length` is the full length.
    Rejected { length: usize },
}

/// Accumulates ids and masks in lockstep.
#[derive(Default)]
struct SegmentWriter {
    input_ids: Vec<TokenId>,
    code_mask: Vec<u8>,
    docstr_mask: Vec<u8>,
    special_tokens_mask: Vec<u8>,
}

impl SegmentWriter {
    fn with_capacity(n: usize) -> Self {
        Self {
            input_ids: Vec::with_capacity(n),
            code_mask: Vec::with_capacity(n),
            docstr_mask: Vec::with_capacity(n),
            special_tokens_mask: Vec::with_capacity(n),
        }
    }

    fn marker(&mut self, id: TokenId, code: u8, docstr: u8) {
        self.push(&[id], code, docstr, 1);
    }

    fn text(&mut self, ids: &[TokenId], code: u8, docstr: u8) {
        self.push(ids, code, docstr, 0);
    }

    fn push(&mut self, ids: &[TokenId], code: u8, docstr: u8, special: u8) {
        let n = ids.len();
        self.input_ids.extend_from_slice(ids);
        self.code_mask.extend(std::iter::repeat_n(code, n));
        self.docstr_mask.extend(std::iter::repeat_n(docstr, n));
        self.special_tokens_mask.extend(std::iter::repeat_n(special, n));
    }

    fn len(&self) -> usize {
        self.input_ids.len()
    }

    fn truncate(&mut self, max: usize) {
        self.input_ids.truncate(max);
        self.code_mask.truncate(max);
        self.docstr_mask.truncate(max);
        self.special_tokens_mask.truncate(max);
    }

    fn finish(self, id: &str, prefix_lm_token_idx: usize) -> Result<EncodedExample, EncodeError> {
        let length = self.input_ids.len();
        if self.code_mask.len() != length
            || self.docstr_mask.len() != length
            || self.special_tokens_mask.len() != length
        {
            return Err(EncodeError::MaskLengthMismatch {
                id: id.to_string(),
                input_ids: length,
                code_mask: self.code_mask.len(),
                docstr_mask: self.docstr_mask.len(),
                special_tokens_mask: self.special_tokens_mask.len(),
            });
        }

        Ok(EncodedExample {
            input_ids: self.input_ids,
            code_mask: self.code_mask,
            docstr_mask: self.docstr_mask,
            special_tokens_mask: self.special_tokens_mask,
            prefix_lm_token_idx,
            length,
        })
    }
}

/// Turns records into [`EncodedExample`]s.
///
/// The tokenizer and remap are shared read-only, so one assembler can be used
/// from several threads at once.
#[derive(Clone)]
pub struct SequenceAssembler {
    tokenizer: Arc<dyn TokenizerAdapter>,
    special: SpecialTokenIds,
    max_seq_length: usize,
    remap: Option<Arc<VocabRemap>>,
}

impl std::fmt::Debug for SequenceAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceAssembler")
            .field("special", &self.special)
            .field("max_seq_length", &self.max_seq_length)
            .field("remap_entries", &self.remap.as_ref().map(|r| r.len()))
            .finish()
    }
}

impl SequenceAssembler {
    pub fn new(
        tokenizer: Arc<dyn TokenizerAdapter>,
        special: SpecialTokenIds,
        max_seq_length: usize,
    ) -> Self {
        Self {
            tokenizer,
            special,
            max_seq_length,
            remap: None,
        }
    }

    /// Sets the remap applied to code (and signature) ids.
    pub fn with_remap(mut self, remap: Option<Arc<VocabRemap>>) -> Self {
        self.remap = remap;
        self
    }

    pub fn max_seq_length(&self) -> usize {
        self.max_seq_length
    }

    pub fn special_ids(&self) -> SpecialTokenIds {
        self.special
    }

    /// Assembles `record` with the given variant.
    pub fn assemble(&self, variant: Variant, record: &Record) -> Result<Assembled, EncodeError> {
        match variant {
            Variant::Simple => self.assemble_simple(&record.id, &record.docstring, &record.code),
            Variant::SignatureAware => {
                self.assemble_signature_aware(&record.id, &record.docstring, &record.code)
            }
        }
    }

    /// `[comment] docstring [code] code [end]`, rejected when over-long.
    ///
    /// The prefix index is `1 + len(docstring_ids)`.
    pub fn assemble_simple(
        &self,
        id: &str,
        docstring: &str,
        code: &str,
    ) -> Result<Assembled, EncodeError> {
        let docstring_ids = self.tokenizer.encode(docstring)?;
        let code_ids = self.remapped(self.tokenizer.encode(code)?);

        let mut writer = SegmentWriter::with_capacity(docstring_ids.len() + code_ids.len() + 3);
        writer.marker(self.special.comment, 0, 1);
        writer.text(&docstring_ids, 0, 1);
        let prefix = writer.len();
        writer.marker(self.special.code, 0, 1);
        writer.text(&code_ids, 1, 0);
        writer.marker(self.special.end, 1, 0);

        if writer.len() > self.max_seq_length {
            return Ok(Assembled::Rejected {
                length: writer.len(),
            });
        }
        Ok(Assembled::Emitted(writer.finish(id, prefix)?))
    }

    /// `[begin] signature [comment] docstring [code] code [end]`, truncated
    /// when over-long.
    ///
    /// The signature is split off the raw code with
    /// [`split_signature`](super::signature::split_signature) and the
    /// docstring is rendered with [`wrap_docstring`]. The prefix index covers
    /// everything before the code marker, capped at the maximum length.
    pub fn assemble_signature_aware(
        &self,
        id: &str,
        docstring: &str,
        code: &str,
    ) -> Result<Assembled, EncodeError> {
        let docstring_ids = self.tokenizer.encode(&wrap_docstring(docstring))?;
        let split = split_signature(code);
        let code_ids = self.remapped(self.tokenizer.encode(split.code)?);
        let signature_ids = self.remapped(self.tokenizer.encode(split.signature)?);

        let mut writer = SegmentWriter::with_capacity(
            signature_ids.len() + docstring_ids.len() + code_ids.len() + 4,
        );
        writer.marker(self.special.begin, 1, 1);
        writer.text(&signature_ids, 1, 1);
        writer.marker(self.special.comment, 0, 1);
        writer.text(&docstring_ids, 0, 1);
        let prefix = writer.len();
        writer.marker(self.special.code, 0, 1);
        writer.text(&code_ids, 1, 0);
        writer.marker(self.special.end, 1, 0);

        if writer.len() > self.max_seq_length {
            tracing::trace!(
                id = id,
                length = writer.len(),
                max_seq_length = self.max_seq_length,
                "Truncating example"
            );
            writer.truncate(self.max_seq_length);
        }
        let prefix = prefix.min(self.max_seq_length);
        Ok(Assembled::Emitted(writer.finish(id, prefix)?))
    }

    fn remapped(&self, mut ids: Vec<TokenId>) -> Vec<TokenId> {
        if let Some(remap) = &self.remap {
            remap.apply_in_place(&mut ids);
        }
        ids
    }
}
