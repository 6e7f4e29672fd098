// File: src/core/target_index.rs
use crate::core::types::TargetId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Append-only bidirectional mapping between target-phrase strings and small
/// integer ids. Insertion order defines id assignment; an id, once handed
/// out, never changes and is never reused. Identical phrases resolve to the
/// same id for as long as the same index instance (or its persisted copy)
/// is in play.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetIndex {
    ids: HashMap<String, TargetId>,
    phrases: Vec<String>,
}

/// One index instance shared by every extractor. Writers take the write
/// lock (single-writer discipline for interning), readers are unrestricted.
pub type SharedTargetIndex = Arc<RwLock<TargetIndex>>;

impl TargetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `phrase`, assigning the next unused id on first
    /// sight. O(1) amortized.
    pub fn intern(&mut self, phrase: &str) -> TargetId {
        if let Some(&id) = self.ids.get(phrase) {
            return id;
        }
        let id = self.phrases.len();
        self.phrases.push(phrase.to_string());
        self.ids.insert(phrase.to_string(), id);
        id
    }

    pub fn id_of(&self, phrase: &str) -> Option<TargetId> {
        self.ids.get(phrase).copied()
    }

    pub fn phrase_of(&self, id: TargetId) -> Option<&str> {
        self.phrases.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Wraps the index in the shared handle extractors hold.
    pub fn into_shared(self) -> SharedTargetIndex {
        Arc::new(RwLock::new(self))
    }
}
