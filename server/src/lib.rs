use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::get, Json, Router};
use ir_core::hits::HitsRanker;
use ir_core::pagerank::PageRankScores;
use ir_core::persist::IndexPaths;
use ir_core::{Correction, DocId, NormalizationType, QueryType, RankingType, Searcher, SpellChecker};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_mode")]
    pub mode: QueryType,
    #[serde(default)]
    pub ranking: RankingType,
    #[serde(default)]
    pub norm: NormalizationType,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_mode() -> QueryType { QueryType::Ranked }
fn default_k() -> usize { 10 }

#[derive(Deserialize)]
pub struct SpellParams {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}
fn default_limit() -> usize { 5 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<Correction>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
    pub title: String,
    pub snippet: Option<String>,
}

#[derive(Serialize)]
pub struct SpellResponse {
    pub query: String,
    pub suggestions: Vec<Correction>,
}

/// Where to find the index and the optional link-analysis inputs.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    pub index: PathBuf,
    /// `title,score` file written by `indexer pagerank`.
    pub pagerank: Option<PathBuf>,
    pub links: Option<PathBuf>,
    pub titles: Option<PathBuf>,
}

#[derive(Clone)]
pub struct AppState {
    pub searcher: Arc<Searcher>,
    pub paths: IndexPaths,
}

pub fn build_app(options: &ServerOptions) -> Result<Router> {
    let paths = IndexPaths::new(&options.index);
    let mut searcher = Searcher::open(&paths)?;
    if let Some(path) = &options.pagerank {
        searcher = searcher.with_pagerank(PageRankScores::load(path)?);
    }
    if let (Some(links), Some(titles)) = (&options.links, &options.titles) {
        searcher = searcher.with_hits(HitsRanker::open(links, titles)?);
    }
    Ok(router(AppState { searcher: Arc::new(searcher), paths }))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/spell", get(spell_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let searcher = &state.searcher;
    let query = ir_core::Query::parse(&params.q, searcher.analyzer());
    let result = searcher.search(&query, params.mode, params.ranking, params.norm);

    let total_hits = result.as_ref().map_or(0, |r| r.doc_frequency());
    let k = params.k.clamp(1, 100);
    let raw_terms: Vec<String> = params.q.split_whitespace().map(|s| s.trim_matches('*').to_string()).collect();
    let results: Vec<SearchHit> = result
        .iter()
        .flat_map(|r| r.filtered())
        .take(k)
        .map(|e| SearchHit {
            doc_id: e.doc_id,
            score: e.score,
            title: searcher.catalog().file_name(e.doc_id).unwrap_or_default().to_string(),
            snippet: snippet_from_file(&state.paths.text(e.doc_id), &raw_terms),
        })
        .collect();

    let suggestions = if total_hits == 0 && !query.is_empty() {
        suggest(searcher, &query, default_limit())
    } else {
        Vec::new()
    };
    tracing::debug!(query = %query, total_hits, "search");
    Json(SearchResponse { query: params.q, took_s: start.elapsed().as_secs_f64(), total_hits, results, suggestions })
}

pub async fn spell_handler(State(state): State<AppState>, Query(params): Query<SpellParams>) -> Json<SpellResponse> {
    let searcher = &state.searcher;
    let query = ir_core::Query::parse(&params.q, searcher.analyzer());
    let suggestions = suggest(searcher, &query, params.limit.clamp(1, 20));
    Json(SpellResponse { query: params.q, suggestions })
}

fn suggest(searcher: &Searcher, query: &ir_core::Query, limit: usize) -> Vec<Correction> {
    let checker = SpellChecker::new(searcher.index(), searcher.kgrams(), searcher);
    match checker.check(query, limit) {
        Ok(suggestions) => suggestions,
        Err(e) => {
            tracing::error!(query = %query, error = %format!("{e:#}"), "spell check failed");
            Vec::new()
        }
    }
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let catalog = state.searcher.catalog();
    let Some(name) = catalog.name(doc_id) else {
        return Err((StatusCode::NOT_FOUND, format!("no document {doc_id}")));
    };
    let mut obj = serde_json::json!({
        "doc_id": doc_id,
        "name": name,
        "title": catalog.file_name(doc_id),
        "length": catalog.length(doc_id),
    });
    if let Ok(text) = std::fs::read_to_string(state.paths.text(doc_id)) {
        obj["text"] = serde_json::Value::String(text);
    }
    Ok(Json(obj))
}

fn snippet_from_file(path: &std::path::Path, raw_terms: &[String]) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    if text.is_empty() { return None; }
    // find first match (case-insensitive) of any raw term
    let mut first_idx: Option<usize> = None;
    for term in raw_terms {
        if term.trim().is_empty() { continue; }
        if let Some(pos) = find_case_insensitive(&text, term) { first_idx = Some(pos); break; }
    }
    let snippet = match first_idx {
        Some(idx) => {
            let start = char_boundary(&text, idx.saturating_sub(100));
            let end = char_boundary(&text, (idx + 200).min(text.len()));
            text[start..end].to_string()
        }
        None => text.chars().take(200).collect(),
    };
    Some(highlight_terms(&snippet, raw_terms))
}

/// Largest char boundary not after `i`.
fn char_boundary(s: &str, mut i: usize) -> usize {
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let pat = regex::RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .ok()?;
    pat.find(haystack).map(|m| m.start())
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() { continue; }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else {
            continue;
        };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippets_respect_char_boundaries() {
        let text = "é".repeat(150) + " rust";
        assert_eq!(char_boundary(&text, 1), 0);
        assert_eq!(char_boundary(&text, 2), 2);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.txt");
        std::fs::write(&path, &text).unwrap();
        let snippet = snippet_from_file(&path, &["Rust".to_string()]).unwrap();
        assert!(snippet.ends_with("<em>rust</em>"));
    }
}
