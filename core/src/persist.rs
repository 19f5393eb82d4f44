use crate::kgram::KGramIndex;
use crate::DocId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: usize,
    pub created_at: String,
    pub version: u32,
    /// Length of the k-grams in `kgram.bin`.
    pub kgram_k: usize,
    #[serde(default)]
    pub stem: bool,
    #[serde(default)]
    pub stopwords: bool,
}

/// File layout of one index directory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn dictionary(&self) -> PathBuf { self.root.join("dictionary") }
    pub fn data(&self) -> PathBuf { self.root.join("data") }
    pub fn doc_info(&self) -> PathBuf { self.root.join("docInfo") }
    pub fn lengths(&self) -> PathBuf { self.root.join("lengths.txt") }
    pub fn kgrams(&self) -> PathBuf { self.root.join("kgram.bin") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn texts(&self) -> PathBuf { self.root.join("texts") }
    pub fn text(&self, doc_id: DocId) -> PathBuf { self.texts().join(format!("{doc_id}.txt")) }
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta()).with_context(|| format!("opening {}", paths.meta().display()))?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

pub fn save_kgrams(paths: &IndexPaths, kgrams: &KGramIndex) -> Result<()> {
    create_dir_all(&paths.root)?;
    let f = File::create(paths.kgrams())?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, kgrams)?;
    w.flush()?;
    Ok(())
}

pub fn load_kgrams(paths: &IndexPaths) -> Result<KGramIndex> {
    let f = File::open(paths.kgrams()).with_context(|| format!("opening {}", paths.kgrams().display()))?;
    let kgrams = bincode::deserialize_from(BufReader::new(f))?;
    Ok(kgrams)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn meta_and_kgrams_round_trip() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path().join("idx"));
        let meta = MetaFile {
            num_docs: 2,
            num_terms: 4,
            created_at: "2024-01-01T00:00:00Z".into(),
            version: INDEX_VERSION,
            kgram_k: 3,
            stem: false,
            stopwords: true,
        };
        save_meta(&paths, &meta).unwrap();
        let loaded = load_meta(&paths).unwrap();
        assert_eq!(loaded.num_terms, 4);
        assert!(loaded.stopwords);

        let mut kgrams = KGramIndex::new(3);
        kgrams.insert("cat");
        kgrams.insert("cart");
        save_kgrams(&paths, &kgrams).unwrap();
        let loaded = load_kgrams(&paths).unwrap();
        assert_eq!(loaded.expand("ca*t"), vec!["cat".to_string(), "cart".to_string()]);
    }
}
