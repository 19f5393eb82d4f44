use thiserror::Error;

/// Corruption detected while reading the persisted index.
///
/// These travel inside `anyhow::Error`; callers that need to tell corruption
/// apart from I/O failures can `downcast_ref::<StoreError>()`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("corrupt dictionary record at byte {offset}: {record:?}")]
    CorruptRecord { offset: u64, record: String },

    #[error("postings at byte {pointer} truncated: expected {expected} bytes, got {actual}")]
    TruncatedPostings { pointer: u64, expected: usize, actual: usize },

    #[error("malformed postings entry: {0:?}")]
    MalformedPostings(String),

    #[error("postings payload is not valid UTF-8 at byte {0}")]
    InvalidUtf8(u64),
}

impl StoreError {
    /// True if any error in the chain is a storage corruption.
    pub fn is_corruption(err: &anyhow::Error) -> bool {
        err.chain().any(|e| e.downcast_ref::<StoreError>().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn error_display() {
        let err = StoreError::TruncatedPostings { pointer: 10, expected: 8, actual: 3 };
        assert_eq!(err.to_string(), "postings at byte 10 truncated: expected 8 bytes, got 3");
    }

    #[test]
    fn corruption_is_found_through_context() {
        let res: anyhow::Result<()> = Err(StoreError::MalformedPostings("x".into()).into());
        let err = res.context("reading postings for \"cat\"").unwrap_err();
        assert!(StoreError::is_corruption(&err));
        let io: anyhow::Error = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(!StoreError::is_corruption(&io));
    }
}
