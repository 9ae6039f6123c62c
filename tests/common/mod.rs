//! Shared fixtures for integration tests.

use std::collections::HashMap;
use std::sync::Mutex;

use codelm_forge::tokenizer::{SpecialTokenNames, TokenId, TokenizerAdapter};
use codelm_forge::TokenizerError;

/// Whitespace tokenizer that hands out ids on first sight.
pub struct VocabTokenizer {
    specials: HashMap<String, TokenId>,
    vocab: Mutex<HashMap<String, TokenId>>,
}

impl VocabTokenizer {
    pub fn new() -> Self {
        let names = SpecialTokenNames::default();
        let specials = [names.comment, names.code, names.end, names.begin]
            .into_iter()
            .zip(1..)
            .collect();
        Self {
            specials,
            vocab: Mutex::new(HashMap::new()),
        }
    }
}

impl TokenizerAdapter for VocabTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<TokenId>, TokenizerError> {
        let mut vocab = self.vocab.lock().unwrap();
        Ok(text
            .split_whitespace()
            .map(|word| {
                let next = 1000 + vocab.len() as TokenId;
                *vocab.entry(word.to_string()).or_insert(next)
            })
            .collect())
    }

    fn id_of(&self, token: &str) -> Result<TokenId, TokenizerError> {
        self.specials
            .get(token)
            .copied()
            .ok_or_else(|| TokenizerError::UnknownSpecialToken(token.to_string()))
    }
}
