//! Inverted index persisted as a hash table on disk.
//!
//! Two files make up the index. `dictionary` is a sparse array of fixed-size
//! text records addressed by a hash of the term. `data` holds the serialized
//! postings lists back to back. A record stores where its postings live and a
//! checksum of the term; the term itself is never written.
//!
//! During a build, postings accumulate in a main-memory map and are committed
//! in one sequential pass by [`Index::finalize`]. Afterwards the index is
//! reopened read-only with [`PersistentHashedIndex::open`].

use crate::catalog::DocCatalog;
use crate::error::StoreError;
use crate::index::Index;
use crate::persist::{load_meta, IndexPaths};
use crate::postings::{PostingsEntry, PostingsList};
use crate::DocId;
use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};

/// Number of primary buckets in the dictionary hash table.
pub const TABLE_SIZE: i64 = 611_953;

/// Width in bytes of one dictionary record.
pub const RECORD_SIZE: u64 = 48;

const PAD: u8 = b'n';

/// One dictionary record: where a term's postings live in the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictEntry {
    pub pointer: u64,
    pub checksum: u32,
    pub length: u32,
}

impl DictEntry {
    /// `"pointer,checksum,length,"` right-padded to `RECORD_SIZE`.
    pub fn encode(&self) -> Result<[u8; RECORD_SIZE as usize]> {
        let text = format!("{},{},{},", self.pointer, self.checksum, self.length);
        if text.len() > RECORD_SIZE as usize {
            bail!("dictionary record {text:?} exceeds {RECORD_SIZE} bytes");
        }
        let mut buf = [PAD; RECORD_SIZE as usize];
        buf[..text.len()].copy_from_slice(text.as_bytes());
        Ok(buf)
    }

    /// `Ok(None)` for a never-written slot.
    pub fn decode(buf: &[u8], offset: u64) -> Result<Option<DictEntry>, StoreError> {
        if buf.iter().all(|&b| b == 0) {
            return Ok(None);
        }
        let corrupt = || StoreError::CorruptRecord {
            offset,
            record: String::from_utf8_lossy(buf).into_owned(),
        };
        let text = std::str::from_utf8(buf).map_err(|_| corrupt())?;
        let mut fields = text.split(',');
        let pointer = fields.next().and_then(|s| s.parse::<u64>().ok());
        let checksum = fields.next().and_then(|s| s.parse::<u32>().ok());
        let length = fields.next().and_then(|s| s.parse::<u32>().ok());
        let padding = fields.next().unwrap_or("");
        match (pointer, checksum, length) {
            (Some(pointer), Some(checksum), Some(length))
                if fields.next().is_none() && padding.bytes().all(|b| b == PAD) =>
            {
                Ok(Some(DictEntry { pointer, checksum, length }))
            }
            _ => Err(corrupt()),
        }
    }
}

/// 31-polynomial string hash over UTF-16 code units with wrapping `i32`
/// arithmetic.
pub fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32))
}

/// Sum of the term's character codes. Distinct terms can share a checksum
/// (any two anagrams do).
pub fn checksum(s: &str) -> u32 {
    s.encode_utf16().fold(0u32, |acc, c| acc.wrapping_add(c as u32))
}

/// Byte offset of the first dictionary slot probed for `term`.
pub fn bucket(term: &str) -> u64 {
    let mut b = string_hash(term) as i64 % TABLE_SIZE;
    if b < 0 {
        b += TABLE_SIZE;
    }
    let b = b * 33 + 11;
    (b - b % RECORD_SIZE as i64) as u64
}

/// Counters reported after committing an index to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub terms: usize,
    pub collisions: usize,
    /// Terms whose probe sequence passes another term with the same checksum.
    /// Lookups of such a term return the earlier term's postings.
    pub aliased: usize,
    pub data_bytes: u64,
}

pub struct PersistentHashedIndex {
    paths: IndexPaths,
    dictionary: Mutex<File>,
    data: Mutex<File>,
    /// First unused byte of the data file.
    free: u64,
    cache: HashMap<String, PostingsList>,
    writable: bool,
    num_terms: usize,
}

impl PersistentHashedIndex {
    /// Creates empty dictionary and data files, truncating any existing ones.
    pub fn create(paths: IndexPaths) -> Result<Self> {
        fs::create_dir_all(&paths.root)
            .with_context(|| format!("creating index directory {}", paths.root.display()))?;
        let open = |p: std::path::PathBuf| {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&p)
                .with_context(|| format!("creating {}", p.display()))
        };
        let dictionary = open(paths.dictionary())?;
        let data = open(paths.data())?;
        Ok(Self {
            paths,
            dictionary: Mutex::new(dictionary),
            data: Mutex::new(data),
            free: 0,
            cache: HashMap::new(),
            writable: true,
            num_terms: 0,
        })
    }

    /// Opens a committed index read-only.
    pub fn open(paths: IndexPaths) -> Result<Self> {
        let dictionary = File::open(paths.dictionary())
            .with_context(|| format!("opening {}", paths.dictionary().display()))?;
        let data = File::open(paths.data())
            .with_context(|| format!("opening {}", paths.data().display()))?;
        let free = data.metadata()?.len();
        let num_terms = match load_meta(&paths) {
            Ok(meta) => meta.num_terms,
            Err(e) => {
                tracing::warn!(error = %e, "index metadata unavailable, term count unknown");
                0
            }
        };
        Ok(Self {
            paths,
            dictionary: Mutex::new(dictionary),
            data: Mutex::new(data),
            free,
            cache: HashMap::new(),
            writable: false,
            num_terms,
        })
    }

    /// Terms currently held in the build-phase cache.
    pub fn cached_terms(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }

    fn read_entry(&self, offset: u64) -> Result<Option<DictEntry>> {
        let mut buf = [0u8; RECORD_SIZE as usize];
        {
            let mut f = self.dictionary.lock();
            f.seek(SeekFrom::Start(offset))?;
            match f.read_exact(&mut buf) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e).with_context(|| format!("reading dictionary at {offset}")),
            }
        }
        Ok(DictEntry::decode(&buf, offset)?)
    }

    fn read_postings(&self, entry: &DictEntry) -> Result<PostingsList> {
        let mut buf = Vec::with_capacity(entry.length as usize);
        {
            let mut f = self.data.lock();
            f.seek(SeekFrom::Start(entry.pointer))?;
            (&mut *f).take(entry.length as u64).read_to_end(&mut buf)?;
        }
        if buf.len() < entry.length as usize {
            return Err(StoreError::TruncatedPostings {
                pointer: entry.pointer,
                expected: entry.length as usize,
                actual: buf.len(),
            }
            .into());
        }
        let payload = std::str::from_utf8(&buf).map_err(|_| StoreError::InvalidUtf8(entry.pointer))?;
        Ok(PostingsList::parse(payload)?)
    }

    /// Commits the build-phase cache: doc info, postings payloads, then one
    /// dictionary record per term.
    pub fn write_index(&mut self, catalog: &DocCatalog) -> Result<WriteStats> {
        if !self.writable {
            bail!("index at {} was opened read-only", self.paths.root.display());
        }
        catalog.save(&self.paths.doc_info())?;

        let cache = std::mem::take(&mut self.cache);
        let mut terms: Vec<&String> = cache.keys().collect();
        terms.sort();

        let mut stats = WriteStats::default();
        let mut taken: HashMap<u64, u32> = HashMap::with_capacity(terms.len());
        let mut free = self.free;
        {
            let mut dictionary = self.dictionary.lock();
            let mut data_file = self.data.lock();
            data_file.seek(SeekFrom::Start(free))?;
            let mut data = BufWriter::new(&mut *data_file);

            for (i, term) in terms.iter().enumerate() {
                let payload = cache[*term].serialize();
                data.write_all(payload.as_bytes())?;
                let entry = DictEntry {
                    pointer: free,
                    checksum: checksum(term),
                    length: payload.len() as u32,
                };
                free += payload.len() as u64;

                let mut slot = bucket(term);
                let mut aliased = false;
                while let Some(&other) = taken.get(&slot) {
                    aliased |= other == entry.checksum;
                    stats.collisions += 1;
                    slot += RECORD_SIZE;
                }
                if aliased {
                    stats.aliased += 1;
                    tracing::warn!(term = term.as_str(), "checksum alias on probe path, lookups will return another term's postings");
                }
                dictionary.seek(SeekFrom::Start(slot))?;
                dictionary.write_all(&entry.encode()?)?;
                taken.insert(slot, entry.checksum);

                if (i + 1) % 10_000 == 0 {
                    tracing::debug!(written = i + 1, "dictionary entries written");
                }
            }
            data.flush()?;
            drop(data);
            data_file.sync_all()?;
            dictionary.sync_all()?;
        }

        stats.terms = terms.len();
        stats.data_bytes = free - self.free;
        self.free = free;
        self.num_terms = terms.len();
        Ok(stats)
    }
}

impl Index for PersistentHashedIndex {
    fn insert(&mut self, token: &str, doc_id: DocId, offset: u32) {
        self.cache
            .entry(token.to_string())
            .or_default()
            .insert(PostingsEntry::new(doc_id, offset));
    }

    fn get_postings(&self, token: &str) -> Result<Option<PostingsList>> {
        if let Some(list) = self.cache.get(token) {
            return Ok(Some(list.clone()));
        }
        let sum = checksum(token);
        let mut slot = bucket(token);
        while let Some(entry) = self.read_entry(slot)? {
            if entry.checksum == sum {
                let list = self
                    .read_postings(&entry)
                    .with_context(|| format!("reading postings for {token:?}"))?;
                return Ok(Some(list));
            }
            slot += RECORD_SIZE;
        }
        Ok(None)
    }

    fn size(&self) -> usize {
        if self.cache.is_empty() {
            self.num_terms
        } else {
            self.cache.len()
        }
    }

    fn finalize(&mut self, catalog: &DocCatalog) -> Result<()> {
        tracing::info!(unique_terms = self.cache.len(), "writing index to disk");
        let stats = self.write_index(catalog)?;
        tracing::info!(
            terms = stats.terms,
            collisions = stats.collisions,
            aliased = stats.aliased,
            data_bytes = stats.data_bytes,
            "index written"
        );
        Ok(())
    }
}
