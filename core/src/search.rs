use crate::catalog::DocCatalog;
use crate::disk::PersistentHashedIndex;
use crate::hits::HitsRanker;
use crate::index::Index;
use crate::kgram::KGramIndex;
use crate::pagerank::PageRankScores;
use crate::persist::{load_kgrams, load_meta, IndexPaths};
use crate::postings::{PostingsEntry, PostingsList};
use crate::query::{is_wildcard, Query};
use crate::spell::QueryEvaluator;
use crate::tokenizer::Analyzer;
use crate::DocId;
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    #[serde(alias = "single")]
    SingleTerm,
    #[default]
    Intersection,
    Phrase,
    Ranked,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankingType {
    #[default]
    #[serde(rename = "tfidf", alias = "tf_idf")]
    TfIdf,
    #[serde(rename = "pagerank")]
    PageRank,
    #[serde(rename = "combination")]
    Combination,
    #[serde(rename = "hits")]
    Hits,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationType {
    #[default]
    #[serde(alias = "words")]
    NumberOfWords,
    Euclidean,
}

impl FromStr for QueryType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" | "single_term" => Ok(Self::SingleTerm),
            "intersection" => Ok(Self::Intersection),
            "phrase" => Ok(Self::Phrase),
            "ranked" => Ok(Self::Ranked),
            other => Err(anyhow!("unknown query type {other:?}")),
        }
    }
}

impl FromStr for RankingType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tfidf" | "tf_idf" => Ok(Self::TfIdf),
            "pagerank" => Ok(Self::PageRank),
            "combination" => Ok(Self::Combination),
            "hits" => Ok(Self::Hits),
            other => Err(anyhow!("unknown ranking type {other:?}")),
        }
    }
}

impl FromStr for NormalizationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "words" | "number_of_words" => Ok(Self::NumberOfWords),
            "euclidean" => Ok(Self::Euclidean),
            other => Err(anyhow!("unknown normalization type {other:?}")),
        }
    }
}

/// Weight of each signal in [`RankingType::Combination`].
pub const TFIDF_WEIGHT: f64 = 0.5;
pub const PAGERANK_WEIGHT: f64 = 0.5;

/// Evaluates queries against an index and its side structures.
pub struct Searcher {
    index: Box<dyn Index + Send + Sync>,
    kgrams: KGramIndex,
    catalog: DocCatalog,
    analyzer: Analyzer,
    pagerank: PageRankScores,
    hits: Option<HitsRanker>,
}

impl Searcher {
    pub fn new(index: Box<dyn Index + Send + Sync>, kgrams: KGramIndex, catalog: DocCatalog) -> Self {
        Self {
            index,
            kgrams,
            catalog,
            analyzer: Analyzer::default(),
            pagerank: PageRankScores::default(),
            hits: None,
        }
    }

    /// Opens an index directory written by the indexer.
    pub fn open(paths: &IndexPaths) -> Result<Self> {
        let meta = load_meta(paths)?;
        let index = PersistentHashedIndex::open(paths.clone())?;
        let mut catalog = DocCatalog::load(&paths.doc_info())?;
        catalog.load_norms(&paths.lengths())?;
        let kgrams = load_kgrams(paths)?;
        tracing::info!(
            root = %paths.root.display(),
            num_docs = catalog.len(),
            num_terms = meta.num_terms,
            "opened index"
        );
        Ok(Self::new(Box::new(index), kgrams, catalog).with_analyzer(Analyzer::new(meta.stem, meta.stopwords)))
    }

    pub fn with_analyzer(mut self, analyzer: Analyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_pagerank(mut self, pagerank: PageRankScores) -> Self {
        self.pagerank = pagerank;
        self
    }

    pub fn with_hits(mut self, hits: HitsRanker) -> Self {
        self.hits = Some(hits);
        self
    }

    pub fn index(&self) -> &dyn Index {
        self.index.as_ref()
    }

    pub fn kgrams(&self) -> &KGramIndex {
        &self.kgrams
    }

    pub fn catalog(&self) -> &DocCatalog {
        &self.catalog
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Runs a query. `None` if the query has no terms, nothing matches, or the
    /// index could not be read (logged).
    pub fn search(
        &self,
        query: &Query,
        query_type: QueryType,
        ranking_type: RankingType,
        normalization: NormalizationType,
    ) -> Option<PostingsList> {
        match self.try_search(query, query_type, ranking_type, normalization) {
            Ok(result) => result.filter(|r| !r.is_empty()),
            Err(e) => {
                tracing::error!(query = %query, error = %format!("{e:#}"), "query failed");
                None
            }
        }
    }

    pub fn try_search(
        &self,
        query: &Query,
        query_type: QueryType,
        ranking_type: RankingType,
        normalization: NormalizationType,
    ) -> Result<Option<PostingsList>> {
        if query.is_empty() {
            return Ok(None);
        }
        let result = match query_type {
            QueryType::SingleTerm => self.single_term(&query.terms[0])?,
            QueryType::Intersection => self.intersection(query)?,
            QueryType::Phrase => self.phrase(query)?,
            QueryType::Ranked => self.ranked(query, ranking_type, normalization)?,
        };
        Ok(Some(result))
    }

    /// Index terms a query word stands for.
    fn expand_term(&self, term: &str) -> Vec<String> {
        if is_wildcard(term) { self.kgrams.expand(term) } else { vec![term.to_string()] }
    }

    /// Postings of every term a query word stands for.
    fn term_postings(&self, term: &str) -> Result<Vec<PostingsList>> {
        let terms = self.expand_term(term);
        let mut lists = Vec::with_capacity(terms.len());
        for t in &terms {
            if let Some(list) = self.index.get_postings(t)? {
                lists.push(list);
            }
        }
        Ok(lists)
    }

    fn single_term(&self, term: &str) -> Result<PostingsList> {
        let lists = self.term_postings(term)?;
        if lists.len() == 1 {
            return Ok(lists[0].to_filtered());
        }
        let docs: BTreeSet<DocId> = lists.iter().flat_map(|l| l.doc_ids()).collect();
        Ok(docs.into_iter().map(PostingsEntry::document).collect())
    }

    fn intersection(&self, query: &Query) -> Result<PostingsList> {
        let mut lists: Vec<Vec<DocId>> = Vec::with_capacity(query.len());
        for term in &query.terms {
            let docs: BTreeSet<DocId> = self.term_postings(term)?.iter().flat_map(|l| l.doc_ids()).collect();
            if docs.is_empty() {
                return Ok(PostingsList::new());
            }
            lists.push(docs.into_iter().collect());
        }
        Ok(intersect_all(&lists).into_iter().map(PostingsEntry::document).collect())
    }

    fn phrase(&self, query: &Query) -> Result<PostingsList> {
        let mut chain: Option<BTreeMap<DocId, Vec<u32>>> = None;
        for (i, term) in query.terms.iter().enumerate() {
            let mut offsets: BTreeMap<DocId, Vec<u32>> = BTreeMap::new();
            for list in self.term_postings(term)? {
                for e in list.iter() {
                    offsets.entry(e.doc_id).or_default().push(e.offset);
                }
            }
            for v in offsets.values_mut() {
                v.sort_unstable();
                v.dedup();
            }
            chain = Some(match chain {
                None => offsets,
                Some(prev) => extend_phrase(&prev, &offsets, query.gap(i)),
            });
            if chain.as_ref().is_some_and(BTreeMap::is_empty) {
                break;
            }
        }
        let span = query.span();
        Ok(chain
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(doc_id, ends)| ends.first().map(|&end| PostingsEntry::new(doc_id, end - span)))
            .collect())
    }

    fn ranked(&self, query: &Query, ranking: RankingType, normalization: NormalizationType) -> Result<PostingsList> {
        let scores: BTreeMap<DocId, f64> = match ranking {
            RankingType::TfIdf => self.tf_idf(query, normalization)?,
            RankingType::PageRank => {
                let docs = self.matching_docs(query)?;
                docs.into_iter().filter_map(|d| self.pagerank_of(d).map(|s| (d, s))).collect()
            }
            RankingType::Combination => self
                .tf_idf(query, normalization)?
                .into_iter()
                .map(|(d, tfidf)| {
                    let pr = self.pagerank_of(d).unwrap_or(0.0);
                    (d, TFIDF_WEIGHT * tfidf + PAGERANK_WEIGHT * pr)
                })
                .collect(),
            RankingType::Hits => {
                let Some(hits) = &self.hits else {
                    bail!("hits ranking requested but no link graph is loaded");
                };
                let root: PostingsList = self.matching_docs(query)?.into_iter().map(PostingsEntry::document).collect();
                let mut ranked = hits.rank(&root, &self.catalog);
                ranked.sort_by_score();
                return Ok(ranked);
            }
        };
        let mut result: PostingsList = scores.into_iter().map(|(d, s)| PostingsEntry::scored(d, s)).collect();
        result.sort_by_score();
        Ok(result)
    }

    /// Union of the documents containing any query term.
    fn matching_docs(&self, query: &Query) -> Result<BTreeSet<DocId>> {
        let mut docs = BTreeSet::new();
        for term in &query.terms {
            for list in self.term_postings(term)? {
                docs.extend(list.filtered().map(|e| e.doc_id));
            }
        }
        Ok(docs)
    }

    fn pagerank_of(&self, doc_id: DocId) -> Option<f64> {
        self.catalog.file_name(doc_id).and_then(|name| self.pagerank.get(name))
    }

    fn tf_idf(&self, query: &Query, normalization: NormalizationType) -> Result<BTreeMap<DocId, f64>> {
        let n = self.catalog.len().max(1) as f64;
        let mut scores: BTreeMap<DocId, f64> = BTreeMap::new();
        // each index term counts once, however many query words reach it
        let mut seen: HashSet<String> = HashSet::new();
        for term in &query.terms {
            for t in self.expand_term(term) {
                if !seen.insert(t.clone()) {
                    continue;
                }
                let Some(list) = self.index.get_postings(&t)? else { continue };
                let df = list.doc_frequency().max(1) as f64;
                let idf = (n / df).ln();
                let mut tf: BTreeMap<DocId, u32> = BTreeMap::new();
                for e in list.iter() {
                    *tf.entry(e.doc_id).or_insert(0) += 1;
                }
                for (doc_id, count) in tf {
                    let norm = self.norm(doc_id, normalization);
                    let score = if norm > 0.0 { count as f64 * idf / norm } else { 0.0 };
                    *scores.entry(doc_id).or_insert(0.0) += score;
                }
            }
        }
        Ok(scores)
    }

    fn norm(&self, doc_id: DocId, normalization: NormalizationType) -> f64 {
        let length = self.catalog.length(doc_id).unwrap_or(0) as f64;
        match normalization {
            NormalizationType::NumberOfWords => length,
            NormalizationType::Euclidean => self.catalog.euclidean_norm(doc_id).unwrap_or(length),
        }
    }
}

impl QueryEvaluator for Searcher {
    fn evaluate(&self, query: &Query, query_type: QueryType) -> Option<PostingsList> {
        self.search(query, query_type, RankingType::default(), NormalizationType::default())
    }
}

/// Multi-way merge of ascending id lists. When the heads differ, every cursor
/// sitting at the smallest head moves forward.
pub fn intersect_all(lists: &[Vec<DocId>]) -> Vec<DocId> {
    if lists.is_empty() {
        return Vec::new();
    }
    let mut cursors = vec![0usize; lists.len()];
    let mut out = Vec::new();
    while cursors.iter().zip(lists).all(|(&c, l)| c < l.len()) {
        let heads: Vec<DocId> = cursors.iter().zip(lists).map(|(&c, l)| l[c]).collect();
        let min = heads.iter().copied().min().unwrap_or_default();
        let max = heads.iter().copied().max().unwrap_or_default();
        if min == max {
            out.push(min);
            cursors.iter_mut().for_each(|c| *c += 1);
        } else {
            for (c, &head) in cursors.iter_mut().zip(&heads) {
                if head == min {
                    *c += 1;
                }
            }
        }
    }
    out
}

/// Keeps offsets of the next phrase word that sit exactly `gap` positions after
/// a surviving offset of the previous one.
fn extend_phrase(
    prev: &BTreeMap<DocId, Vec<u32>>,
    next: &BTreeMap<DocId, Vec<u32>>,
    gap: u32,
) -> BTreeMap<DocId, Vec<u32>> {
    let mut out = BTreeMap::new();
    for (doc_id, offsets) in next {
        let Some(before) = prev.get(doc_id) else { continue };
        let kept: Vec<u32> = offsets
            .iter()
            .copied()
            .filter(|&o| o >= gap && before.binary_search(&(o - gap)).is_ok())
            .collect();
        if !kept.is_empty() {
            out.insert(*doc_id, kept);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_way_intersection() {
        let lists = vec![vec![1, 3, 5, 7, 9], vec![3, 4, 5, 9], vec![0, 3, 9, 11]];
        assert_eq!(intersect_all(&lists), vec![3, 9]);
        assert!(intersect_all(&[vec![1], vec![]]).is_empty());
        assert_eq!(intersect_all(&[vec![2, 4]]), vec![2, 4]);
    }

    #[test]
    fn phrase_step_requires_adjacency() {
        let prev: BTreeMap<DocId, Vec<u32>> = [(0, vec![1, 5]), (1, vec![2])].into_iter().collect();
        let next: BTreeMap<DocId, Vec<u32>> = [(0, vec![2, 4]), (1, vec![4]), (2, vec![1])].into_iter().collect();
        let out = extend_phrase(&prev, &next, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[&0], vec![2]);

        let out = extend_phrase(&prev, &next, 2);
        assert_eq!(out.len(), 1);
        assert_eq!(out[&1], vec![4]);
    }

    #[test]
    fn mode_names_parse() {
        assert_eq!("phrase".parse::<QueryType>().unwrap(), QueryType::Phrase);
        assert_eq!("pagerank".parse::<RankingType>().unwrap(), RankingType::PageRank);
        assert_eq!("euclidean".parse::<NormalizationType>().unwrap(), NormalizationType::Euclidean);
        assert!("fuzzy".parse::<QueryType>().is_err());
    }
}
