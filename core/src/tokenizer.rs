use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use std::collections::HashSet;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// How text is turned into index terms. The same settings must be used when
/// building an index and when parsing queries against it, so they are stored
/// in the index metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analyzer {
    pub stem: bool,
    pub stopwords: bool,
}

impl Analyzer {
    pub fn new(stem: bool, stopwords: bool) -> Self {
        Self { stem, stopwords }
    }

    /// Tokenize text into (term, position) using NFKC normalization and lowercasing,
    /// then optional stopword removal and stemming. Removed stopwords still
    /// consume a position so phrase offsets stay aligned with the source text.
    pub fn tokenize(&self, text: &str) -> Vec<(String, usize)> {
        self.analyze(text).0
    }

    /// Like [`Analyzer::tokenize`], also returning how many positions the text
    /// consumed, removed stopwords included.
    pub fn analyze(&self, text: &str) -> (Vec<(String, usize)>, usize) {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        let mut tokens = Vec::new();
        let mut consumed = 0;
        for (pos, mat) in RE.find_iter(&normalized).enumerate() {
            consumed = pos + 1;
            if let Some(term) = self.finish(mat.as_str()) {
                tokens.push((term, pos));
            }
        }
        (tokens, consumed)
    }


    fn finish(&self, token: &str) -> Option<String> {
        if self.stopwords && is_stopword(token) {
            return None;
        }
        if self.stem {
            Some(STEMMER.stem(token).to_string())
        } else {
            Some(token.to_string())
        }
    }
}

/// Default tokenization: no stemming, no stopword removal.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    Analyzer::default().tokenize(text)
}
