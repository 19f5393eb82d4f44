pub mod builder;
pub mod catalog;
pub mod disk;
pub mod error;
pub mod eval;
pub mod graph;
pub mod hits;
pub mod index;
pub mod kgram;
pub mod pagerank;
pub mod persist;
pub mod postings;
pub mod query;
pub mod search;
pub mod spell;
pub mod tokenizer;

pub type TermId = u32;
pub type DocId = u32;

pub use builder::{BuildSummary, IndexBuilder};
pub use catalog::DocCatalog;
pub use disk::PersistentHashedIndex;
pub use error::StoreError;
pub use index::{HashedIndex, Index};
pub use kgram::KGramIndex;
pub use postings::{PostingsEntry, PostingsList};
pub use query::Query;
pub use search::{NormalizationType, QueryType, RankingType, Searcher};
pub use spell::{Correction, QueryEvaluator, SpellChecker};
