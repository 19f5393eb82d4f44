use crate::index::Index;
use crate::DocId;
use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Document names, lengths and normalizers shared by every component that
/// needs them. Built once by the indexer, then loaded read-only.
#[derive(Debug, Clone, Default)]
pub struct DocCatalog {
    names: BTreeMap<DocId, String>,
    lengths: BTreeMap<DocId, u32>,
    ids_by_file_name: HashMap<String, DocId>,
    euclidean: HashMap<DocId, f64>,
}

/// Last component of a `/` or `\` separated path.
pub fn file_name(path: &str) -> &str {
    path.rsplit(|c| c == '/' || c == '\\')
        .find(|s| !s.is_empty())
        .unwrap_or("")
}

impl DocCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, doc_id: DocId, path: impl Into<String>, length: u32) {
        let path = path.into();
        self.ids_by_file_name.insert(file_name(&path).to_string(), doc_id);
        self.names.insert(doc_id, path);
        self.lengths.insert(doc_id, length);
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, doc_id: DocId) -> Option<&str> {
        self.names.get(&doc_id).map(String::as_str)
    }

    pub fn file_name(&self, doc_id: DocId) -> Option<&str> {
        self.name(doc_id).map(file_name)
    }

    pub fn length(&self, doc_id: DocId) -> Option<u32> {
        self.lengths.get(&doc_id).copied()
    }

    pub fn id_by_file_name(&self, name: &str) -> Option<DocId> {
        self.ids_by_file_name.get(name).copied()
    }

    pub fn euclidean_norm(&self, doc_id: DocId) -> Option<f64> {
        self.euclidean.get(&doc_id).copied()
    }

    pub fn set_euclidean_norms(&mut self, norms: HashMap<DocId, f64>) {
        self.euclidean = norms;
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, &str)> {
        self.names.iter().map(|(id, name)| (*id, name.as_str()))
    }

    /// Writes one `docID;path;length` line per document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut w = BufWriter::new(f);
        for (doc_id, name) in &self.names {
            let length = self.lengths.get(doc_id).copied().unwrap_or(0);
            writeln!(w, "{doc_id};{name};{length}")?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut catalog = DocCatalog::new();
        for (n, line) in BufReader::new(f).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // Paths may contain ';', so split the id off the front and the length off the back.
            let parsed = line.split_once(';').and_then(|(id, rest)| {
                let (name, length) = rest.rsplit_once(';')?;
                Some((id.parse::<DocId>().ok()?, name, length.parse::<u32>().ok()?))
            });
            let (doc_id, name, length) =
                parsed.ok_or_else(|| anyhow!("{}:{}: malformed doc info line {line:?}", path.display(), n + 1))?;
            catalog.register(doc_id, name, length);
        }
        Ok(catalog)
    }

    /// Writes one `docID:norm` line per document that has a normalizer.
    pub fn save_norms(&self, path: &Path) -> Result<()> {
        let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut w = BufWriter::new(f);
        let sorted: BTreeMap<_, _> = self.euclidean.iter().collect();
        for (doc_id, norm) in sorted {
            writeln!(w, "{doc_id}:{norm}")?;
        }
        w.flush()?;
        Ok(())
    }

    /// Loads Euclidean normalizers. A missing file leaves them empty so ranking
    /// falls back to document length.
    pub fn load_norms(&mut self, path: &Path) -> Result<()> {
        let f = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "no document norms file, euclidean normalization falls back to length");
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
        };
        let mut norms = HashMap::new();
        for line in BufReader::new(f).lines() {
            let line = line?;
            let Some((id, norm)) = line.trim().split_once(':') else { continue };
            match (id.parse::<DocId>(), norm.parse::<f64>()) {
                (Ok(id), Ok(norm)) => {
                    norms.insert(id, norm);
                }
                _ => tracing::warn!(line, "skipping malformed norm line"),
            }
        }
        self.euclidean = norms;
        Ok(())
    }
}

/// Euclidean length of every document's tf-idf vector, over the given
/// vocabulary.
pub fn euclidean_norms<'a, I>(index: &dyn Index, terms: I, num_docs: usize) -> Result<HashMap<DocId, f64>>
where
    I: IntoIterator<Item = &'a str>,
{
    let n = num_docs.max(1) as f64;
    let mut sums: HashMap<DocId, f64> = HashMap::new();
    for term in terms {
        let Some(postings) = index.get_postings(term)? else { continue };
        let df = postings.doc_frequency().max(1) as f64;
        let idf = (n / df).ln();
        let mut tf: HashMap<DocId, u32> = HashMap::new();
        for e in postings.iter() {
            *tf.entry(e.doc_id).or_insert(0) += 1;
        }
        for (doc_id, count) in tf {
            let w = count as f64 * idf;
            *sums.entry(doc_id).or_insert(0.0) += w * w;
        }
    }
    Ok(sums.into_iter().map(|(d, s)| (d, s.sqrt())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::HashedIndex;
    use tempfile::tempdir;

    #[test]
    fn short_file_names() {
        assert_eq!(file_name("davisWiki/Kitten.f"), "Kitten.f");
        assert_eq!(file_name("a\\b\\c.txt"), "c.txt");
        assert_eq!(file_name("plain"), "plain");
        assert_eq!(file_name("dir/"), "dir");
    }

    #[test]
    fn doc_info_round_trip() {
        let dir = tempdir().unwrap();
        let mut catalog = DocCatalog::new();
        catalog.register(0, "corpus/a;b.txt", 12);
        catalog.register(1, "corpus/c.txt", 3);
        let path = dir.path().join("docInfo");
        catalog.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "0;corpus/a;b.txt;12\n1;corpus/c.txt;3\n");

        let loaded = DocCatalog::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.name(0), Some("corpus/a;b.txt"));
        assert_eq!(loaded.length(1), Some(3));
        assert_eq!(loaded.id_by_file_name("c.txt"), Some(1));
    }

    #[test]
    fn missing_norms_file_is_not_fatal() {
        let dir = tempdir().unwrap();
        let mut catalog = DocCatalog::new();
        catalog.load_norms(&dir.path().join("lengths.txt")).unwrap();
        assert_eq!(catalog.euclidean_norm(0), None);
    }

    #[test]
    fn norms_match_hand_computation() {
        let mut index = HashedIndex::new();
        // doc0: a a b, doc1: b
        index.insert("a", 0, 0);
        index.insert("a", 0, 1);
        index.insert("b", 0, 2);
        index.insert("b", 1, 0);
        let norms = euclidean_norms(&index, ["a", "b"], 2).unwrap();
        let expected = 2.0 * 2f64.ln();
        assert!((norms[&0] - expected).abs() < 1e-12);
        assert_eq!(norms[&1], 0.0);

        let dir = tempdir().unwrap();
        let path = dir.path().join("lengths.txt");
        let mut catalog = DocCatalog::new();
        catalog.set_euclidean_norms(norms);
        catalog.save_norms(&path).unwrap();
        let mut loaded = DocCatalog::new();
        loaded.load_norms(&path).unwrap();
        assert!((loaded.euclidean_norm(0).unwrap() - expected).abs() < 1e-12);
    }
}
