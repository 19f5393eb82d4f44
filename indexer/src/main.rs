use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ir_core::eval::RelevanceJudgments;
use ir_core::graph::LinkGraph;
use ir_core::hits::{write_top, HitsRanker};
use ir_core::kgram::KGramIndex;
use ir_core::pagerank::{self, Estimator, PageRankConfig, PageRankScores};
use ir_core::persist::{load_kgrams, IndexPaths};
use ir_core::tokenizer::Analyzer;
use ir_core::{IndexBuilder, NormalizationType, Query, QueryType, RankingType, Searcher};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct InputDoc {
    title: String,
    body: String,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build the persistent index and precompute link rankings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from a directory of text files or JSON/JSONL documents
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Length of the k-grams used for wildcards and spelling correction
        #[arg(long, default_value_t = 3)]
        k: usize,
        #[arg(long, default_value_t = false)]
        stem: bool,
        #[arg(long, default_value_t = false)]
        stopwords: bool,
    },
    /// Compute PageRank over a link file and write `title,score` lines
    Pagerank {
        /// Link file, one `title;dest,dest,...` line per page
        #[arg(long)]
        links: String,
        #[arg(long, default_value = "output.txt")]
        output: String,
        /// power, mc1, mc2, mc4 or mc5
        #[arg(long, default_value = "power")]
        estimator: Estimator,
        /// Monte Carlo walks (passes over all nodes for mc2/mc4)
        #[arg(long, default_value_t = 1000)]
        walks: usize,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, default_value_t = 30)]
        top: usize,
        /// Also run power iteration and report the squared error over its top documents
        #[arg(long, default_value_t = false)]
        compare_exact: bool,
    },
    /// Compute hubs and authorities over the whole link graph
    Hits {
        #[arg(long)]
        links: String,
        #[arg(long)]
        titles: String,
        #[arg(long, default_value = ".")]
        output_dir: String,
        #[arg(long, default_value_t = 30)]
        top: usize,
    },
    /// List the terms containing every given k-gram
    Kgram {
        #[arg(long)]
        index: String,
        /// Space separated k-grams
        #[arg(long)]
        kgrams: String,
    },
    /// Run one query and report nDCG against graded relevance judgments
    Evaluate {
        #[arg(long)]
        index: String,
        #[arg(long)]
        query: String,
        /// `fileName relevance` lines
        #[arg(long)]
        relevance: String,
        #[arg(long, default_value = "ranked")]
        mode: QueryType,
        #[arg(long, default_value = "tfidf")]
        ranking: RankingType,
        #[arg(long, default_value = "words")]
        norm: NormalizationType,
        #[arg(long)]
        pagerank: Option<String>,
        #[arg(long, default_value_t = 50)]
        k: usize,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, k, stem, stopwords } => {
            build_index(&input, &output, k, Analyzer::new(stem, stopwords))
        }
        Commands::Pagerank { links, output, estimator, walks, seed, top, compare_exact } => {
            let config = PageRankConfig { walks, seed, ..PageRankConfig::default() };
            run_pagerank(&links, &output, estimator, &config, top, compare_exact)
        }
        Commands::Hits { links, titles, output_dir, top } => run_hits(&links, &titles, &output_dir, top),
        Commands::Kgram { index, kgrams } => run_kgram(&index, &kgrams),
        Commands::Evaluate { index, query, relevance, mode, ranking, norm, pagerank, k } => {
            run_evaluate(&index, &query, &relevance, mode, ranking, norm, pagerank.as_deref(), k)
        }
    }
}

fn build_index(input: &str, output: &str, k: usize, analyzer: Analyzer) -> Result<()> {
    if k == 0 {
        bail!("--k must be at least 1");
    }
    let input_path = Path::new(input);
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    } else {
        bail!("input {input} does not exist");
    }

    let mut builder = IndexBuilder::create(IndexPaths::new(output), analyzer, k)?;
    for file in files {
        match file.extension().and_then(|s| s.to_str()) {
            Some("jsonl") => index_jsonl(&file, &mut builder)?,
            Some("json") => index_json(&file, &mut builder)?,
            _ => index_text(&file, &mut builder)?,
        }
    }
    tracing::info!(num_docs = builder.num_docs(), "ingested documents");

    let summary = builder.finish()?;
    println!("indexed {} documents, {} terms into {output}", summary.num_docs, summary.num_terms);
    Ok(())
}

fn index_text(file: &Path, builder: &mut IndexBuilder) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    builder.add_document(&file.to_string_lossy(), &text)?;
    Ok(())
}

fn index_jsonl(file: &Path, builder: &mut IndexBuilder) -> Result<()> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: InputDoc =
            serde_json::from_str(&line).with_context(|| format!("{}:{}: bad document", file.display(), n + 1))?;
        builder.add_document(&doc.title, &doc.body)?;
    }
    Ok(())
}

fn index_json(file: &Path, builder: &mut IndexBuilder) -> Result<()> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                let doc: InputDoc = serde_json::from_value(v)?;
                builder.add_document(&doc.title, &doc.body)?;
            }
        }
        serde_json::Value::Object(_) => {
            let doc: InputDoc = serde_json::from_value(json)?;
            builder.add_document(&doc.title, &doc.body)?;
        }
        _ => tracing::warn!(file = %file.display(), "skipping JSON file that is neither an object nor an array"),
    }
    Ok(())
}

fn run_pagerank(
    links: &str,
    output: &str,
    estimator: Estimator,
    config: &PageRankConfig,
    top: usize,
    compare_exact: bool,
) -> Result<()> {
    let graph = LinkGraph::load(Path::new(links))?;
    if graph.is_empty() {
        bail!("no pages in {links}");
    }
    let result = pagerank::rank(&graph, estimator, config);
    for (i, (title, score)) in result.ranked(&graph).into_iter().take(top).enumerate() {
        println!("{}: {title} {score:.5}", i + 1);
    }
    pagerank::write_scores(Path::new(output), &graph, &result)?;
    tracing::info!(
        output,
        iterations = result.convergence.iterations,
        converged = result.convergence.converged,
        "pagerank written"
    );

    if compare_exact && estimator != Estimator::PowerIteration {
        let exact = pagerank::power_iteration(&graph, config);
        let error = pagerank::top_k_squared_error(&exact.scores, &result.scores, top);
        println!("squared error over exact top {top}: {error:e}");
    }
    Ok(())
}

fn run_hits(links: &str, titles: &str, output_dir: &str, top: usize) -> Result<()> {
    let ranker = HitsRanker::open(Path::new(links), Path::new(titles))?;
    if ranker.is_empty() {
        bail!("no pages in {links}");
    }
    let scores = ranker.rank_all();
    let dir = Path::new(output_dir);
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let hubs = ranker.top(&scores.nodes, &scores.hubs, top);
    let authorities = ranker.top(&scores.nodes, &scores.authorities, top);
    write_top(&dir.join(format!("hubs_top_{top}.txt")), &hubs)?;
    write_top(&dir.join(format!("authorities_top_{top}.txt")), &authorities)?;
    tracing::info!(
        nodes = scores.nodes.len(),
        iterations = scores.convergence.iterations,
        converged = scores.convergence.converged,
        "hits written"
    );
    Ok(())
}

fn run_kgram(index: &str, kgrams: &str) -> Result<()> {
    let kgram_index: KGramIndex = load_kgrams(&IndexPaths::new(index))?;
    let grams: Vec<&str> = kgrams.split_whitespace().collect();
    if grams.is_empty() {
        bail!("no k-grams given");
    }
    for gram in &grams {
        if gram.chars().count() != kgram_index.k() {
            bail!("cannot search a {}-gram index with {gram:?}", kgram_index.k());
        }
    }
    let ids = kgram_index.matching(&grams);
    println!("Found {} posting(s)", ids.len());
    for id in ids.iter().take(10) {
        if let Some(term) = kgram_index.term_by_id(*id) {
            println!("{term}");
        }
    }
    if ids.len() > 10 {
        println!("...");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_evaluate(
    index: &str,
    query: &str,
    relevance: &str,
    mode: QueryType,
    ranking: RankingType,
    norm: NormalizationType,
    pagerank: Option<&str>,
    k: usize,
) -> Result<()> {
    let mut searcher = Searcher::open(&IndexPaths::new(index))?;
    if let Some(path) = pagerank {
        searcher = searcher.with_pagerank(PageRankScores::load(Path::new(path))?);
    }
    let judgments = RelevanceJudgments::load(Path::new(relevance))?;
    let parsed = Query::parse(query, searcher.analyzer());
    let result = searcher.search(&parsed, mode, ranking, norm).unwrap_or_default();
    let names: Vec<&str> = result
        .filtered()
        .filter_map(|e| searcher.catalog().file_name(e.doc_id))
        .collect();
    let ndcg = judgments.ndcg_at(names.iter().copied(), k);
    println!("{} result(s), nDCG@{k} = {ndcg:.4}", names.len());
    Ok(())
}
