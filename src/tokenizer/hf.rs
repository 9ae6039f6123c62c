//! HuggingFace `tokenizer.json` adapter.

use std::path::Path;

use super::{TokenId, TokenizerAdapter};
use crate::error::TokenizerError;

pub struct HfTokenizerAdapter {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizerAdapter {
    pub fn from_file(path: &Path) -> Result<Self, TokenizerError> {
        let inner =
            tokenizers::Tokenizer::from_file(path).map_err(|e| TokenizerError::LoadFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        tracing::info!(
            path = %path.display(),
            vocab_size = inner.get_vocab_size(true),
            "Loaded tokenizer"
        );
        Ok(Self { inner })
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

impl TokenizerAdapter for HfTokenizerAdapter {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError> {
        let enc = self
            .inner
            .encode(text, false)
            .map_err(|e| TokenizerError::Encode(e.to_string()))?;
        Ok(enc.get_ids().to_vec())
    }

    fn id_of(&self, token: &str) -> Result<TokenId, TokenizerError> {
        self.inner
            .token_to_id(token)
            .ok_or_else(|| TokenizerError::UnknownSpecialToken(token.to_string()))
    }
}
