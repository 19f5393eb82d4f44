use crate::error::StoreError;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// One occurrence of a term: the document, the token position inside it, and a
/// score that only ranking ever assigns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingsEntry {
    pub doc_id: DocId,
    pub offset: u32,
    #[serde(default)]
    pub score: f64,
}

impl PostingsEntry {
    pub fn new(doc_id: DocId, offset: u32) -> Self {
        Self { doc_id, offset, score: 0.0 }
    }

    /// An entry standing for a whole document rather than one occurrence.
    pub fn document(doc_id: DocId) -> Self {
        Self::new(doc_id, 0)
    }

    pub fn scored(doc_id: DocId, score: f64) -> Self {
        Self { doc_id, offset: 0, score }
    }
}

/// Postings of one term in insertion order.
///
/// Keeps two views: `entries` holds every occurrence (needed for phrase
/// queries) and `filtered` holds the first occurrence per document (used for
/// document frequency and Boolean retrieval).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostingsList {
    entries: Vec<PostingsEntry>,
    filtered: Vec<usize>,
    seen: HashSet<DocId>,
}

impl PostingsList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: PostingsEntry) {
        if self.seen.insert(entry.doc_id) {
            self.filtered.push(self.entries.len());
        }
        self.entries.push(entry);
    }

    /// Number of occurrences.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&PostingsEntry> {
        self.entries.get(i)
    }

    pub fn entries(&self) -> &[PostingsEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &PostingsEntry> {
        self.entries.iter()
    }

    /// First occurrence of every distinct document, in insertion order.
    pub fn filtered(&self) -> impl Iterator<Item = &PostingsEntry> {
        self.filtered.iter().map(move |&i| &self.entries[i])
    }

    /// Number of distinct documents.
    pub fn doc_frequency(&self) -> usize {
        self.filtered.len()
    }

    /// Distinct document ids in ascending order.
    pub fn doc_ids(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self.filtered().map(|e| e.doc_id).collect();
        ids.sort_unstable();
        ids
    }

    /// Copy holding only the first occurrence per document.
    pub fn to_filtered(&self) -> PostingsList {
        self.filtered().cloned().collect()
    }

    /// Stable sort by descending score. Scores are never NaN, but treat it as a
    /// tie if one slips through.
    pub fn sort_by_score(&mut self) {
        self.entries
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        self.rebuild_views();
    }

    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
        self.rebuild_views();
    }

    fn rebuild_views(&mut self) {
        self.filtered.clear();
        self.seen.clear();
        for (i, e) in self.entries.iter().enumerate() {
            if self.seen.insert(e.doc_id) {
                self.filtered.push(i);
            }
        }
    }

    /// On-disk payload: `"docID offset"` pairs joined by `", "`.
    pub fn serialize(&self) -> String {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|e| format!("{} {}", e.doc_id, e.offset))
            .collect();
        parts.join(", ")
    }

    pub fn parse(payload: &str) -> Result<PostingsList, StoreError> {
        let mut list = PostingsList::new();
        if payload.trim().is_empty() {
            return Ok(list);
        }
        for part in payload.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let mut fields = part.split_whitespace();
            let doc_id = fields.next().and_then(|s| s.parse::<DocId>().ok());
            let offset = fields.next().and_then(|s| s.parse::<u32>().ok());
            match (doc_id, offset, fields.next()) {
                (Some(doc_id), Some(offset), None) => list.insert(PostingsEntry::new(doc_id, offset)),
                _ => return Err(StoreError::MalformedPostings(part.to_string())),
            }
        }
        Ok(list)
    }
}

impl FromIterator<PostingsEntry> for PostingsList {
    fn from_iter<T: IntoIterator<Item = PostingsEntry>>(iter: T) -> Self {
        let mut list = PostingsList::new();
        for e in iter {
            list.insert(e);
        }
        list
    }
}

impl<'a> IntoIterator for &'a PostingsList {
    type Item = &'a PostingsEntry;
    type IntoIter = std::slice::Iter<'a, PostingsEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PostingsList {
        [(3, 0), (1, 4), (3, 7), (1, 9), (2, 1)]
            .into_iter()
            .map(|(d, o)| PostingsEntry::new(d, o))
            .collect()
    }

    #[test]
    fn filtered_view_keeps_first_occurrence() {
        let list = sample();
        assert_eq!(list.len(), 5);
        assert_eq!(list.doc_frequency(), 3);
        let firsts: Vec<(DocId, u32)> = list.filtered().map(|e| (e.doc_id, e.offset)).collect();
        assert_eq!(firsts, vec![(3, 0), (1, 4), (2, 1)]);
        assert_eq!(list.doc_ids(), vec![1, 2, 3]);
    }

    #[test]
    fn payload_format_is_stable() {
        let list = sample();
        let payload = list.serialize();
        assert_eq!(payload, "3 0, 1 4, 3 7, 1 9, 2 1");
        assert_eq!(PostingsList::parse(&payload).unwrap(), list);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert!(PostingsList::parse("1 2, 3").is_err());
        assert!(PostingsList::parse("1 x").is_err());
        assert!(PostingsList::parse("1 2 3").is_err());
        assert!(PostingsList::parse("").unwrap().is_empty());
    }

    #[test]
    fn sorting_by_score_rebuilds_views() {
        let mut list: PostingsList = vec![
            PostingsEntry::scored(0, 0.1),
            PostingsEntry::scored(1, 0.9),
            PostingsEntry::scored(2, 0.5),
        ]
        .into_iter()
        .collect();
        list.sort_by_score();
        let ids: Vec<DocId> = list.filtered().map(|e| e.doc_id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
        list.truncate(1);
        assert_eq!(list.doc_ids(), vec![1]);
    }
}
