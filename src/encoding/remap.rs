//! Partial token-id remapping applied before sequence assembly.

use std::collections::HashMap;
use std::path::Path;

use crate::error::EncodeError;
use crate::tokenizer::TokenId;

/// Partial mapping from old token ids to new ones.
///
/// Ids absent from the map pass through unchanged. The map is built once and
/// shared read-only by every encoding in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VocabRemap {
    map: HashMap<TokenId, TokenId>,
}

impl VocabRemap {
    pub fn new(map: HashMap<TokenId, TokenId>) -> Self {
        Self { map }
    }

    /// Loads a JSON object of `{"old_id": new_id}` pairs.
    ///
    /// JSON object keys are strings, so keys are parsed as integers here.
    pub fn from_json_file(path: &Path) -> Result<Self, EncodeError> {
        let content = std::fs::read_to_string(path)?;
        let raw: HashMap<String, TokenId> = serde_json::from_str(&content)?;

        let mut map = HashMap::with_capacity(raw.len());
        for (key, new_id) in raw {
            let old_id: TokenId = key.trim().parse().map_err(|_| {
                EncodeError::InvalidRemap(format!("key '{}' is not a token id", key))
            })?;
            map.insert(old_id, new_id);
        }

        tracing::info!(path = %path.display(), entries = map.len(), "Loaded vocabulary remap");
        Ok(Self { map })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, id: TokenId) -> TokenId {
        self.map.get(&id).copied().unwrap_or(id)
    }

    /// Returns a remapped copy. Length and order are preserved.
    pub fn apply(&self, ids: &[TokenId]) -> Vec<TokenId> {
        ids.iter().map(|&id| self.get(id)).collect()
    }

    pub fn apply_in_place(&self, ids: &mut [TokenId]) {
        for id in ids.iter_mut() {
            *id = self.get(*id);
        }
    }
}

impl FromIterator<(TokenId, TokenId)> for VocabRemap {
    fn from_iter<I: IntoIterator<Item = (TokenId, TokenId)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_preserves_length_and_unmapped_ids() {
        let remap: VocabRemap = [(5, 50), (7, 70)].into_iter().collect();
        let ids = vec![1, 5, 9, 7, 5];
        let out = remap.apply(&ids);
        assert_eq!(out.len(), ids.len());
        assert_eq!(out, vec![1, 50, 9, 70, 50]);
    }

    #[test]
    fn test_empty_remap_is_identity() {
        let remap = VocabRemap::default();
        let mut ids = vec![3, 2, 1];
        remap.apply_in_place(&mut ids);
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(&path, r#"{"10": 1, "11": 2}"#).unwrap();

        let remap = VocabRemap::from_json_file(&path).unwrap();
        assert_eq!(remap.len(), 2);
        assert_eq!(remap.get(10), 1);
        assert_eq!(remap.get(12), 12);
    }

    #[test]
    fn test_from_json_file_rejects_non_numeric_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.json");
        std::fs::write(&path, r#"{"abc": 1}"#).unwrap();

        let err = VocabRemap::from_json_file(&path).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidRemap(_)));
    }
}
