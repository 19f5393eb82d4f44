use ir_core::query::Query;
use ir_core::tokenizer::{tokenize, Analyzer};

#[test]
fn it_normalizes_and_stems() {
    let toks = Analyzer::new(true, true).tokenize("Running Runners RUN! The café's menu.");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    assert!(words.contains(&"run".to_string()));
    // NFKC folds the ligature
    assert_eq!(tokenize("ﬁne"), vec![("fine".to_string(), 0)]);
}

#[test]
fn it_filters_stopwords() {
    let toks = Analyzer::new(false, true).tokenize("The quick brown fox and the lazy dog");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert_eq!(words, vec!["quick", "brown", "fox", "lazy", "dog"]);
}

#[test]
fn default_analysis_keeps_every_word() {
    let words: Vec<String> = tokenize("To be, or not to be").into_iter().map(|(w, _)| w).collect();
    assert_eq!(words, vec!["to", "be", "or", "not", "to", "be"]);
}

#[test]
fn queries_and_documents_agree() {
    let analyzer = Analyzer::new(true, false);
    let doc: Vec<String> = analyzer.tokenize("Searching searches").into_iter().map(|(w, _)| w).collect();
    let query = Query::parse("SEARCHING", &analyzer);
    assert_eq!(query.terms[0], doc[0]);
}
