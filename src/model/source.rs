//! Source registration and lookup
//!
//! Every input comment becomes an immutable `Source` with a stable id.
//! Quotes address source text through character-offset spans.

use std::collections::HashMap;

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SourceIndexError {
    #[error("Source not found: {0}")]
    NotFound(Uuid),
}

/// One original input comment, addressable by id and character offsets.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: Uuid,
    /// Display name, e.g. "Anonymous #3"
    pub label: String,
    pub text: String,
}

/// A half-open character span into a registered source's text.
///
/// Invariant: `0 <= start_idx < end_idx <= text.chars().count()` and the
/// spanned slice equals the owning quote's text verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRef {
    pub source_id: Uuid,
    pub start_idx: usize,
    pub end_idx: usize,
}

/// Extract the `[start, end)` character slice of `text`.
pub fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Registry of input comments with stable, monotonically-assigned entries.
///
/// Sources are never mutated or removed after registration.
#[derive(Debug, Default)]
pub struct SourceIndex {
    sources: Vec<Source>,
    by_id: HashMap<Uuid, usize>,
}

impl SourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a comment, assigning a fresh id. Labels default to
    /// "Anonymous #N" by 1-based registration order.
    pub fn register(&mut self, text: impl Into<String>, label: Option<String>) -> &Source {
        let id = Uuid::new_v4();
        let index = self.sources.len();
        let label = label.unwrap_or_else(|| format!("Anonymous #{}", index + 1));
        self.by_id.insert(id, index);
        self.sources.push(Source {
            id,
            label,
            text: text.into(),
        });
        &self.sources[index]
    }

    pub fn resolve(&self, source_id: Uuid) -> Result<&Source, SourceIndexError> {
        self.by_id
            .get(&source_id)
            .map(|&i| &self.sources[i])
            .ok_or(SourceIndexError::NotFound(source_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Total characters across all registered sources.
    pub fn total_chars(&self) -> usize {
        self.sources.iter().map(|s| s.text.chars().count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_default_labels() {
        let mut index = SourceIndex::new();
        let first = index.register("I love cats", None).id;
        index.register("Dogs are the best", Some("Participant A".to_string()));
        let third = index.register("Birds I'm hesitant about", None).id;

        assert_eq!(index.resolve(first).unwrap().label, "Anonymous #1");
        assert_eq!(index.resolve(third).unwrap().label, "Anonymous #3");
        let labels: Vec<_> = index.iter().map(|s| s.label.clone()).collect();
        assert_eq!(labels[1], "Participant A");
    }

    #[test]
    fn test_resolve_unknown_id_fails() {
        let index = SourceIndex::new();
        let result = index.resolve(Uuid::new_v4());
        assert!(matches!(result, Err(SourceIndexError::NotFound(_))));
    }

    #[test]
    fn test_registration_order_is_stable() {
        let mut index = SourceIndex::new();
        let texts = ["a", "b", "c", "d"];
        for t in texts {
            index.register(t, None);
        }
        let seen: Vec<_> = index.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(seen, texts);
    }

    #[test]
    fn test_char_slice_is_character_based() {
        // Multi-byte characters count as one position each
        let text = "héllo wörld";
        assert_eq!(char_slice(text, 0, 5), "héllo");
        assert_eq!(char_slice(text, 6, 11), "wörld");
    }
}
