use ir_core::graph::LinkGraph;
use ir_core::hits::HitsRanker;
use ir_core::pagerank::PageRankScores;
use ir_core::persist::{load_meta, IndexPaths};
use ir_core::tokenizer::Analyzer;
use ir_core::{
    DocId, Index, IndexBuilder, NormalizationType, PersistentHashedIndex, PostingsList, Query, QueryType,
    RankingType, Searcher,
};
use std::collections::HashMap;
use tempfile::{tempdir, TempDir};

fn build(docs: &[(&str, &str)]) -> (TempDir, IndexPaths) {
    build_with(Analyzer::default(), docs)
}

fn build_with(analyzer: Analyzer, docs: &[(&str, &str)]) -> (TempDir, IndexPaths) {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path().join("index"));
    let mut builder = IndexBuilder::create(paths.clone(), analyzer, 3).unwrap();
    for (name, text) in docs {
        builder.add_document(name, text).unwrap();
    }
    builder.finish().unwrap();
    (dir, paths)
}

fn cat_corpus() -> (TempDir, Searcher) {
    let (dir, paths) = build(&[("corpus/d0.txt", "the cat sat"), ("corpus/d1.txt", "the cat ran")]);
    let searcher = Searcher::open(&paths).unwrap();
    (dir, searcher)
}

fn q(text: &str) -> Query {
    Query::parse(text, &Analyzer::default())
}

fn docs(result: Option<PostingsList>) -> Vec<DocId> {
    result.map(|r| r.filtered().map(|e| e.doc_id).collect()).unwrap_or_default()
}

fn run(s: &Searcher, text: &str, mode: QueryType) -> Option<PostingsList> {
    s.search(&q(text), mode, RankingType::TfIdf, NormalizationType::NumberOfWords)
}

#[test]
fn two_document_scenario() {
    let (_dir, s) = cat_corpus();
    assert_eq!(docs(run(&s, "cat sat", QueryType::Phrase)), vec![0]);
    assert_eq!(docs(run(&s, "the cat", QueryType::Phrase)), vec![0, 1]);
    assert!(run(&s, "sat cat", QueryType::Phrase).is_none());
    assert_eq!(docs(run(&s, "cat ran", QueryType::Intersection)), vec![1]);
    assert_eq!(docs(run(&s, "cat", QueryType::Intersection)), vec![0, 1]);
    assert_eq!(docs(run(&s, "cat", QueryType::SingleTerm)), vec![0, 1]);

    let ranked = run(&s, "sat", QueryType::Ranked).unwrap();
    assert_eq!(ranked.len(), 1);
    let e = ranked.get(0).unwrap();
    assert_eq!(e.doc_id, 0);
    assert!((e.score - 2f64.ln() / 3.0).abs() < 1e-12);
}

#[test]
fn repeated_query_terms_score_once() {
    let (_dir, s) = cat_corpus();
    let once = run(&s, "sat", QueryType::Ranked).unwrap();
    let twice = run(&s, "sat sat", QueryType::Ranked).unwrap();
    assert_eq!(twice.len(), 1);
    assert_eq!(twice.get(0).unwrap().score, once.get(0).unwrap().score);
}

#[test]
fn phrases_span_removed_stopwords() {
    let (_dir, paths) = build_with(
        Analyzer::new(false, true),
        &[("a.txt", "the cat sat on the mat"), ("b.txt", "sat the mat on a cat")],
    );
    let s = Searcher::open(&paths).unwrap();
    let parse = |text: &str| Query::parse(text, s.analyzer());
    let phrase = |text: &str| s.search(&parse(text), QueryType::Phrase, RankingType::TfIdf, NormalizationType::NumberOfWords);

    let hit = phrase("sat on the mat").unwrap();
    assert_eq!(docs(Some(hit.clone())), vec![0]);
    // offset of "sat" in the source text
    assert_eq!(hit.get(0).unwrap().offset, 2);

    assert_eq!(docs(phrase("sat the mat")), vec![1]);
    assert!(phrase("sat mat").is_none());
}

#[test]
fn absent_terms_match_nothing() {
    let (_dir, s) = cat_corpus();
    for mode in [QueryType::SingleTerm, QueryType::Intersection, QueryType::Phrase, QueryType::Ranked] {
        assert!(run(&s, "dog", mode).is_none(), "{mode:?}");
    }
    assert!(run(&s, "cat dog", QueryType::Intersection).is_none());
    assert!(run(&s, "", QueryType::Intersection).is_none());
}

#[test]
fn intersection_commutes_and_contains_phrase_results() {
    let (_dir, paths) = build(&[
        ("a.txt", "new york city is big"),
        ("b.txt", "york is new to me"),
        ("c.txt", "the city of new york"),
        ("d.txt", "a new city"),
    ]);
    let s = Searcher::open(&paths).unwrap();
    for (x, y) in [("new", "york"), ("city", "new"), ("york", "city")] {
        let forward = docs(run(&s, &format!("{x} {y}"), QueryType::Intersection));
        let backward = docs(run(&s, &format!("{y} {x}"), QueryType::Intersection));
        assert_eq!(forward, backward);
        for d in docs(run(&s, &format!("{x} {y}"), QueryType::Phrase)) {
            assert!(forward.contains(&d));
        }
    }
    assert_eq!(docs(run(&s, "new york", QueryType::Phrase)), vec![0, 2]);
    assert_eq!(docs(run(&s, "new york", QueryType::Intersection)), vec![0, 1, 2]);
}

#[test]
fn wildcards_expand_through_kgrams() {
    let (_dir, s) = cat_corpus();
    assert_eq!(s.kgrams().expand("*at"), vec!["cat", "sat"]);
    assert_eq!(docs(run(&s, "cat s*", QueryType::Intersection)), vec![0]);
    assert_eq!(docs(run(&s, "cat r*", QueryType::Phrase)), vec![1]);
    assert_eq!(docs(run(&s, "*a*", QueryType::Intersection)), vec![0, 1]);
}

#[test]
fn euclidean_normalization_uses_stored_norms() {
    let (_dir, s) = cat_corpus();
    let ranked = s
        .search(&q("sat"), QueryType::Ranked, RankingType::TfIdf, NormalizationType::Euclidean)
        .unwrap();
    // doc 0's only non-zero weight is "sat" itself
    assert!((ranked.get(0).unwrap().score - 1.0).abs() < 1e-9);
}

#[test]
fn pagerank_and_combination_rankings() {
    let (_dir, s) = cat_corpus();
    let scores: PageRankScores = [("d1.txt".to_string(), 0.9)].into_iter().collect();
    let s = s.with_pagerank(scores);

    let by_pr = s
        .search(&q("cat"), QueryType::Ranked, RankingType::PageRank, NormalizationType::NumberOfWords)
        .unwrap();
    assert_eq!(docs(Some(by_pr)), vec![1]);

    let combined = s
        .search(&q("the"), QueryType::Ranked, RankingType::Combination, NormalizationType::NumberOfWords)
        .unwrap();
    assert_eq!(docs(Some(combined.clone())), vec![1, 0]);
    assert!((combined.get(0).unwrap().score - 0.45).abs() < 1e-12);
    assert_eq!(combined.get(1).unwrap().score, 0.0);
}

#[test]
fn hits_ranking_covers_linked_neighbours() {
    let (_dir, s) = cat_corpus();
    let graph = LinkGraph::parse("1;2\n".as_bytes()).unwrap();
    let titles: HashMap<String, String> =
        [("1", "d0.txt"), ("2", "d1.txt")].into_iter().map(|(a, b)| (a.to_string(), b.to_string())).collect();
    let s = s.with_hits(HitsRanker::from_parts(graph, titles));

    let ranked = s
        .search(&q("sat"), QueryType::Ranked, RankingType::Hits, NormalizationType::NumberOfWords)
        .unwrap();
    // d1 is pulled in through d0's out-link and is the only authority
    assert_eq!(docs(Some(ranked.clone())), vec![1, 0]);
    assert!((ranked.get(0).unwrap().score - 0.7).abs() < 1e-9);
    assert!((ranked.get(1).unwrap().score - 0.3).abs() < 1e-9);
}

#[test]
fn hits_without_a_graph_degrades_to_no_result() {
    let (_dir, s) = cat_corpus();
    assert!(s
        .search(&q("cat"), QueryType::Ranked, RankingType::Hits, NormalizationType::NumberOfWords)
        .is_none());
}

#[test]
fn many_terms_survive_the_round_trip() {
    let words: Vec<String> = (0..500).map(|i| format!("w{i:04}x{}", i % 7)).collect();
    let text_a = words[..300].join(" ");
    let text_b = words[200..].join(" ");
    let (_dir, paths) = build(&[("a.txt", text_a.as_str()), ("b.txt", text_b.as_str())]);

    let meta = load_meta(&paths).unwrap();
    assert_eq!(meta.num_docs, 2);
    assert_eq!(meta.num_terms, 500);

    let index = PersistentHashedIndex::open(paths).unwrap();
    assert_eq!(index.size(), 500);
    for (i, w) in words.iter().enumerate() {
        let list = index.get_postings(w).unwrap().unwrap_or_else(|| panic!("{w} missing"));
        let expected: Vec<DocId> = match i {
            0..=199 => vec![0],
            200..=299 => vec![0, 1],
            _ => vec![1],
        };
        assert_eq!(list.doc_ids(), expected, "{w}");
    }
    assert!(index.get_postings("zzz").unwrap().is_none());
}
