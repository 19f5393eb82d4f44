use crate::catalog::DocCatalog;
use crate::postings::{PostingsEntry, PostingsList};
use crate::DocId;
use anyhow::Result;
use std::collections::HashMap;

/// Capability shared by the in-memory and disk-backed indexes.
pub trait Index {
    /// Records one occurrence of `token` at `offset` in `doc_id`.
    fn insert(&mut self, token: &str, doc_id: DocId, offset: u32);

    /// Postings of `token`, `Ok(None)` if the term is absent.
    fn get_postings(&self, token: &str) -> Result<Option<PostingsList>>;

    /// Number of distinct terms.
    fn size(&self) -> usize;

    /// Called once after the last insert.
    fn finalize(&mut self, catalog: &DocCatalog) -> Result<()>;
}

/// Inverted index held entirely in main memory.
#[derive(Debug, Default, Clone)]
pub struct HashedIndex {
    postings: HashMap<String, PostingsList>,
}

impl HashedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.postings.keys().map(String::as_str)
    }
}

impl Index for HashedIndex {
    fn insert(&mut self, token: &str, doc_id: DocId, offset: u32) {
        self.postings
            .entry(token.to_string())
            .or_default()
            .insert(PostingsEntry::new(doc_id, offset));
    }

    fn get_postings(&self, token: &str) -> Result<Option<PostingsList>> {
        Ok(self.postings.get(token).cloned())
    }

    fn size(&self) -> usize {
        self.postings.len()
    }

    fn finalize(&mut self, _catalog: &DocCatalog) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_accumulate_per_term() {
        let mut index = HashedIndex::new();
        index.insert("cat", 0, 1);
        index.insert("cat", 1, 1);
        index.insert("cat", 0, 4);
        index.insert("sat", 0, 2);
        assert_eq!(index.size(), 2);
        let cat = index.get_postings("cat").unwrap().unwrap();
        assert_eq!(cat.len(), 3);
        assert_eq!(cat.doc_frequency(), 2);
        assert!(index.get_postings("dog").unwrap().is_none());
    }
}
