//! Spelling correction over the k-gram index.
//!
//! Each query word gets a ranked candidate list: itself if it is indexed,
//! otherwise vocabulary terms that share enough k-grams and lie within a small
//! edit distance. Multi-word suggestions are assembled left to right with a
//! beam of `limit` phrases, scoring phrases by how many documents they match.

use crate::index::Index;
use crate::kgram::KGramIndex;
use crate::postings::PostingsList;
use crate::query::{is_wildcard, Query};
use crate::search::QueryType;
use crate::TermId;
use anyhow::Result;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

pub const JACCARD_THRESHOLD: f64 = 0.4;
pub const MAX_EDIT_DISTANCE: usize = 2;

/// Anything that can run a query. The spell checker uses it to score
/// candidate phrases.
pub trait QueryEvaluator {
    fn evaluate(&self, query: &Query, query_type: QueryType) -> Option<PostingsList>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correction {
    pub phrase: String,
    pub score: f64,
}

impl Correction {
    fn new(phrase: impl Into<String>, score: f64) -> Self {
        Self { phrase: phrase.into(), score }
    }
}

pub struct SpellChecker<'a> {
    index: &'a dyn Index,
    kgrams: &'a KGramIndex,
    evaluator: &'a dyn QueryEvaluator,
}

impl<'a> SpellChecker<'a> {
    pub fn new(index: &'a dyn Index, kgrams: &'a KGramIndex, evaluator: &'a dyn QueryEvaluator) -> Self {
        Self { index, kgrams, evaluator }
    }

    /// Up to `limit` corrected phrases for `query`, best first. Empty only for
    /// an empty query or a zero limit.
    pub fn check(&self, query: &Query, limit: usize) -> Result<Vec<Correction>> {
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let mut positions = Vec::with_capacity(query.len());
        for term in &query.terms {
            positions.push(self.candidates(term)?);
        }
        let mut merged = self.merge(&positions, limit);
        sort_desc(&mut merged);
        merged.truncate(limit);
        tracing::debug!(query = %query, suggestions = merged.len(), "spell check");
        Ok(merged)
    }

    /// Ranked replacements for one word. An indexed word is its own only
    /// candidate; a word with no acceptable neighbour is returned unchanged
    /// with score 0.
    pub fn candidates(&self, term: &str) -> Result<Vec<Correction>> {
        if is_wildcard(term) || self.index.get_postings(term)?.is_some() {
            return Ok(vec![Correction::new(term, 1.0)]);
        }
        let grams = self.kgrams.kgram_set(term);
        let ids: BTreeSet<TermId> = grams
            .iter()
            .filter_map(|g| self.kgrams.postings(g))
            .flatten()
            .copied()
            .collect();

        let mut out = Vec::new();
        for id in ids {
            let Some(candidate) = self.kgrams.term_by_id(id) else { continue };
            if jaccard(&grams, &self.kgrams.kgram_set(candidate)) < JACCARD_THRESHOLD {
                continue;
            }
            if edit_distance(term, candidate) > MAX_EDIT_DISTANCE {
                continue;
            }
            let df = self.index.get_postings(candidate)?.map_or(0, |p| p.doc_frequency());
            out.push(Correction::new(candidate, df as f64));
        }
        if out.is_empty() {
            out.push(Correction::new(term, 0.0));
        }
        sort_desc(&mut out);
        Ok(out)
    }

    fn merge(&self, positions: &[Vec<Correction>], limit: usize) -> Vec<Correction> {
        let mut beam: Vec<Correction> = positions[0].iter().take(limit).cloned().collect();
        let last = positions.len() - 1;
        for (i, candidates) in positions.iter().enumerate().skip(1) {
            if candidates.len() > 1 || i == last {
                let mut extended = Vec::with_capacity(candidates.len() * beam.len());
                for candidate in candidates {
                    for partial in &beam {
                        let phrase = format!("{} {}", partial.phrase, candidate.phrase);
                        let score = self.phrase_score(&phrase);
                        extended.push(Correction::new(phrase, score));
                    }
                }
                sort_desc(&mut extended);
                extended.truncate(limit);
                beam = extended;
            } else if let Some(only) = candidates.first() {
                for partial in &mut beam {
                    partial.phrase = format!("{} {}", partial.phrase, only.phrase);
                }
            }
        }
        beam
    }

    /// Number of documents matching every word of `phrase`.
    fn phrase_score(&self, phrase: &str) -> f64 {
        let query = Query::from_terms(phrase.split(' '));
        self.evaluator
            .evaluate(&query, QueryType::Intersection)
            .map_or(0, |r| r.doc_frequency()) as f64
    }
}

fn sort_desc(list: &mut [Correction]) {
    list.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// `|A ∩ B| / |A ∪ B|`, computed from the set sizes.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Levenshtein distance with unit costs, over characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitute.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
