use crate::catalog::{euclidean_norms, DocCatalog};
use crate::disk::PersistentHashedIndex;
use crate::index::Index;
use crate::kgram::KGramIndex;
use crate::persist::{save_kgrams, save_meta, IndexPaths, MetaFile, INDEX_VERSION};
use crate::tokenizer::Analyzer;
use crate::DocId;
use anyhow::{Context, Result};
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub num_docs: usize,
    pub num_terms: usize,
}

/// Single pass index construction: documents are tokenized into the
/// in-memory cache of a fresh [`PersistentHashedIndex`], then everything is
/// written once by [`IndexBuilder::finish`].
pub struct IndexBuilder {
    paths: IndexPaths,
    analyzer: Analyzer,
    index: PersistentHashedIndex,
    kgrams: KGramIndex,
    catalog: DocCatalog,
    next_doc_id: DocId,
}

impl IndexBuilder {
    pub fn create(paths: IndexPaths, analyzer: Analyzer, k: usize) -> Result<Self> {
        let index = PersistentHashedIndex::create(paths.clone())?;
        fs::create_dir_all(paths.texts())
            .with_context(|| format!("creating {}", paths.texts().display()))?;
        Ok(Self {
            paths,
            analyzer,
            index,
            kgrams: KGramIndex::new(k),
            catalog: DocCatalog::new(),
            next_doc_id: 0,
        })
    }

    /// Indexes one document under `name` (its path or title) and keeps a copy
    /// of the text for snippets.
    pub fn add_document(&mut self, name: &str, text: &str) -> Result<DocId> {
        let doc_id = self.next_doc_id;
        self.next_doc_id += 1;

        let mut length = 0u32;
        for (term, pos) in self.analyzer.tokenize(text) {
            self.index.insert(&term, doc_id, pos as u32);
            self.kgrams.insert(&term);
            length += 1;
        }
        self.catalog.register(doc_id, name, length);

        let text_path = self.paths.text(doc_id);
        fs::write(&text_path, text).with_context(|| format!("writing {}", text_path.display()))?;
        if (doc_id + 1) % 1000 == 0 {
            tracing::debug!(documents = doc_id + 1, "indexed documents");
        }
        Ok(doc_id)
    }

    pub fn num_docs(&self) -> usize {
        self.catalog.len()
    }

    /// Computes document norms and writes the dictionary, postings, doc info,
    /// norms, k-gram snapshot and metadata.
    pub fn finish(mut self) -> Result<BuildSummary> {
        let num_docs = self.catalog.len();
        let num_terms = self.index.size();
        let terms: Vec<String> = self.index.cached_terms().map(str::to_string).collect();
        let norms = euclidean_norms(&self.index, terms.iter().map(String::as_str), num_docs)?;
        self.catalog.set_euclidean_norms(norms);

        self.index.finalize(&self.catalog)?;
        self.catalog.save_norms(&self.paths.lengths())?;
        save_kgrams(&self.paths, &self.kgrams)?;

        let created_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        let meta = MetaFile {
            num_docs: num_docs as u32,
            num_terms,
            created_at,
            version: INDEX_VERSION,
            kgram_k: self.kgrams.k(),
            stem: self.analyzer.stem,
            stopwords: self.analyzer.stopwords,
        };
        save_meta(&self.paths, &meta)?;
        tracing::info!(num_docs, num_terms, root = %self.paths.root.display(), "index build complete");
        Ok(BuildSummary { num_docs, num_terms })
    }
}
