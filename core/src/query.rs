use crate::tokenizer::Analyzer;
use std::fmt;

/// A parsed query: an ordered list of index terms. Terms containing `*` are
/// wildcards and are expanded through the k-gram index at evaluation time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub terms: Vec<String>,
    /// Word position of each term in the query text. Stopwords dropped by the
    /// analyzer leave gaps, the same way they do in indexed documents.
    positions: Vec<u32>,
}

impl Query {
    /// Splits on whitespace and runs each word through the analyzer. Wildcard
    /// words are only lowercased, since stemming would break the pattern.
    pub fn parse(text: &str, analyzer: &Analyzer) -> Self {
        let mut terms = Vec::new();
        let mut positions = Vec::new();
        let mut pos = 0u32;
        for word in text.split_whitespace() {
            if is_wildcard(word) {
                terms.push(word.to_lowercase());
                positions.push(pos);
                pos += 1;
                continue;
            }
            let (tokens, consumed) = analyzer.analyze(word);
            for (term, offset) in tokens {
                terms.push(term);
                positions.push(pos + offset as u32);
            }
            pos += consumed as u32;
        }
        Self { terms, positions }
    }

    /// Terms at consecutive positions.
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terms: Vec<String> = terms.into_iter().map(Into::into).collect();
        let positions = (0..terms.len() as u32).collect();
        Self { terms, positions }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Distance in words from term `i - 1` to term `i`.
    pub fn gap(&self, i: usize) -> u32 {
        match (i.checked_sub(1).and_then(|p| self.positions.get(p)), self.positions.get(i)) {
            (Some(prev), Some(cur)) => cur - prev,
            _ => 1,
        }
    }

    /// Distance in words from the first term to the last.
    pub fn span(&self) -> u32 {
        (1..self.len()).map(|i| self.gap(i)).sum()
    }
}

pub fn is_wildcard(term: &str) -> bool {
    term.contains('*')
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.terms.join(" "))
    }
}
