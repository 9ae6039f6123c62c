//! Tokenizer adapter seam.
//!
//! The encoder only needs two things from a tokenizer: text to ids without
//! added special tokens, and the id of a named special token. Anything that
//! can provide those (a HuggingFace `tokenizer.json`, a test vocabulary)
//! implements [`TokenizerAdapter`].

mod hf;

use serde::{Deserialize, Serialize};

use crate::error::TokenizerError;

pub use hf::HfTokenizerAdapter;

/// Token id type used throughout the encoder.
pub type TokenId = u32;

/// Minimal tokenizer contract consumed by the encoder.
pub trait TokenizerAdapter: Send + Sync {
    /// Encodes raw text. Must not add special tokens.
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError>;

    /// Looks up the id of a special token by name.
    fn id_of(&self, token: &str) -> Result<TokenId, TokenizerError>;
}

/// Names of the four marker tokens the encoder inserts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialTokenNames {
    /// Starts the docstring segment.
    pub comment: String,
    /// Starts the code segment.
    pub code: String,
    /// Ends the sequence.
    pub end: String,
    /// Starts the signature segment.
    pub begin: String,
}

impl Default for SpecialTokenNames {
    fn default() -> Self {
        Self {
            comment: "<comments>".to_string(),
            code: "<python>".to_string(),
            end: "<eot>".to_string(),
            begin: "<|beginoftext|>".to_string(),
        }
    }
}

/// Marker ids resolved once from a tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokenIds {
    pub comment: TokenId,
    pub code: TokenId,
    pub end: TokenId,
    pub begin: TokenId,
}

impl SpecialTokenIds {
    /// Resolves every marker name, failing on the first unknown one.
    pub fn resolve<T: TokenizerAdapter + ?Sized>(
        tokenizer: &T,
        names: &SpecialTokenNames,
    ) -> Result<Self, TokenizerError> {
        let ids = Self {
            comment: tokenizer.id_of(&names.comment)?,
            code: tokenizer.id_of(&names.code)?,
            end: tokenizer.id_of(&names.end)?,
            begin: tokenizer.id_of(&names.begin)?,
        };
        tracing::debug!(
            comment = ids.comment,
            code = ids.code,
            end = ids.end,
            begin = ids.begin,
            "Resolved special token ids"
        );
        Ok(ids)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::WordTokenizer;
    use super::*;

    #[test]
    fn test_resolve_special_ids() {
        let tok = WordTokenizer::new();
        let ids = tok.special_ids();
        assert_eq!(ids.comment, WordTokenizer::COMMENT);
        assert_eq!(ids.begin, WordTokenizer::BEGIN);
    }

    #[test]
    fn test_resolve_unknown_special_token() {
        let tok = WordTokenizer::new();
        let names = SpecialTokenNames {
            end: "<|endoftext|>".to_string(),
            ..Default::default()
        };
        let err = SpecialTokenIds::resolve(&tok, &names).unwrap_err();
        assert!(matches!(err, TokenizerError::UnknownSpecialToken(t) if t == "<|endoftext|>"));
    }
}
