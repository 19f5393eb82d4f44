use crate::TermId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Maps every k-gram of `^term$` to the ids of the terms containing it.
///
/// Term ids are assigned in insertion order and each postings list is kept
/// sorted, so two lists can be intersected with a linear merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KGramIndex {
    k: usize,
    id2term: Vec<String>,
    term2id: HashMap<String, TermId>,
    index: HashMap<String, Vec<TermId>>,
}

impl KGramIndex {
    /// Panics if `k` is zero.
    pub fn new(k: usize) -> Self {
        assert!(k > 0, "k-gram length must be positive");
        Self {
            k,
            id2term: Vec::new(),
            term2id: HashMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of distinct terms.
    pub fn len(&self) -> usize {
        self.id2term.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2term.is_empty()
    }

    pub fn insert(&mut self, term: &str) {
        if self.term2id.contains_key(term) {
            return;
        }
        let id = self.id2term.len() as TermId;
        self.id2term.push(term.to_string());
        self.term2id.insert(term.to_string(), id);
        for gram in self.kgrams(term) {
            let list = self.index.entry(gram).or_default();
            if list.last() != Some(&id) {
                list.push(id);
            }
        }
    }

    /// k-grams of `^term$` in window order. Repeated windows appear once per
    /// occurrence. Terms shorter than `k - 2` yield the whole padded term.
    pub fn kgrams(&self, term: &str) -> Vec<String> {
        let padded: Vec<char> = format!("^{term}$").chars().collect();
        if padded.len() <= self.k {
            return vec![padded.into_iter().collect()];
        }
        padded.windows(self.k).map(|w| w.iter().collect()).collect()
    }

    /// Distinct k-grams of `term`.
    pub fn kgram_set(&self, term: &str) -> HashSet<String> {
        self.kgrams(term).into_iter().collect()
    }

    pub fn postings(&self, kgram: &str) -> Option<&[TermId]> {
        self.index.get(kgram).map(Vec::as_slice)
    }

    pub fn term_by_id(&self, id: TermId) -> Option<&str> {
        self.id2term.get(id as usize).map(String::as_str)
    }

    pub fn id_by_term(&self, term: &str) -> Option<TermId> {
        self.term2id.get(term).copied()
    }

    /// All terms in id order.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.id2term.iter().map(String::as_str)
    }

    /// Merge of two sorted id lists.
    pub fn intersect(a: &[TermId], b: &[TermId]) -> Vec<TermId> {
        let (mut i, mut j) = (0, 0);
        let mut out = Vec::new();
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Equal => {
                    out.push(a[i]);
                    i += 1;
                    j += 1;
                }
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
            }
        }
        out
    }

    /// Ids of the terms containing every k-gram in `grams`, in id order.
    pub fn matching(&self, grams: &[&str]) -> Vec<TermId> {
        let mut result: Option<Vec<TermId>> = None;
        for gram in grams {
            let Some(list) = self.postings(gram) else { return Vec::new() };
            result = Some(match result {
                None => list.to_vec(),
                Some(acc) => Self::intersect(&acc, list),
            });
            if result.as_ref().is_some_and(Vec::is_empty) {
                break;
            }
        }
        result.unwrap_or_default()
    }

    /// Terms matching a wildcard pattern such as `mon*y`, in id order.
    pub fn expand(&self, pattern: &str) -> Vec<String> {
        let Some(re) = wildcard_regex(pattern) else { return Vec::new() };
        let grams: Vec<String> = self
            .kgrams(pattern)
            .into_iter()
            .filter(|g| !g.contains('*'))
            .collect();
        if grams.is_empty() {
            return self.terms().filter(|t| re.is_match(t)).map(str::to_string).collect();
        }
        let refs: Vec<&str> = grams.iter().map(String::as_str).collect();
        self.matching(&refs)
            .into_iter()
            .filter_map(|id| self.term_by_id(id))
            .filter(|t| re.is_match(t))
            .map(str::to_string)
            .collect()
    }
}

/// Anchored regex for a wildcard pattern, `*` matching any run of characters.
pub fn wildcard_regex(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    match Regex::new(&format!("^{body}$")) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "wildcard pattern does not compile");
            None
        }
    }
}
