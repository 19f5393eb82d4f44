//! PageRank over a [`LinkGraph`]: exact power iteration plus four Monte Carlo
//! estimators, and the `title,score` file the searcher reads back.

use crate::graph::{LinkGraph, NodeId};
use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Probability of a random jump at each step.
pub const BORED: f64 = 0.15;
/// L1 change below which power iteration stops.
pub const EPSILON: f64 = 1e-4;
pub const MAX_ITERATIONS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    PowerIteration,
    /// Walks from uniformly random starts, counting where they end.
    EndPointRandomStart,
    /// Every node starts one walk per pass, counting where they end.
    EndPointCyclicStart,
    /// Every node starts one walk per pass, counting every node visited.
    CompletePathCyclicStart,
    /// Random starts, counting every node visited.
    CompletePathRandomStart,
}

impl FromStr for Estimator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "power" | "power_iteration" => Ok(Self::PowerIteration),
            "mc1" | "end_point_random_start" => Ok(Self::EndPointRandomStart),
            "mc2" | "end_point_cyclic_start" => Ok(Self::EndPointCyclicStart),
            "mc4" | "complete_path_cyclic_start" => Ok(Self::CompletePathCyclicStart),
            "mc5" | "complete_path_random_start" => Ok(Self::CompletePathRandomStart),
            other => Err(anyhow!("unknown estimator {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageRankConfig {
    pub bored: f64,
    pub epsilon: f64,
    pub max_iterations: usize,
    /// Monte Carlo: number of walks, or passes over all nodes for the cyclic
    /// estimators.
    pub walks: usize,
    pub seed: Option<u64>,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            bored: BORED,
            epsilon: EPSILON,
            max_iterations: MAX_ITERATIONS,
            walks: 1000,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Convergence {
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct PageRank {
    /// Indexed by node id, summing to 1 unless the graph is empty.
    pub scores: Vec<f64>,
    pub convergence: Convergence,
}

impl PageRank {
    /// `(label, score)` in descending score order, ties by node id.
    pub fn ranked<'g>(&self, graph: &'g LinkGraph) -> Vec<(&'g str, f64)> {
        let mut order: Vec<NodeId> = (0..self.scores.len()).collect();
        order.sort_by(|&a, &b| {
            self.scores[b]
                .partial_cmp(&self.scores[a])
                .unwrap_or(Ordering::Equal)
                .then(a.cmp(&b))
        });
        order
            .into_iter()
            .filter_map(|id| graph.label(id).map(|label| (label, self.scores[id])))
            .collect()
    }
}

pub fn rank(graph: &LinkGraph, estimator: Estimator, config: &PageRankConfig) -> PageRank {
    match estimator {
        Estimator::PowerIteration => power_iteration(graph, config),
        mc => monte_carlo(graph, mc, config),
    }
}

/// Rank held by dangling nodes is not passed on; only the jump term reaches
/// other nodes. With a uniform jump the fixed point is proportional to the one
/// that spreads dangling rank uniformly, so the normalized result is the same.
pub fn power_iteration(graph: &LinkGraph, config: &PageRankConfig) -> PageRank {
    let n = graph.len();
    if n == 0 {
        return PageRank { scores: Vec::new(), convergence: Convergence { iterations: 0, converged: true } };
    }
    let jump = config.bored / n as f64;
    let follow = 1.0 - config.bored;
    let mut x = vec![1.0 / n as f64; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        let mut next = vec![jump; n];
        for i in graph.nodes() {
            let out = graph.out_links(i);
            if out.is_empty() {
                continue;
            }
            let share = follow * x[i] / out.len() as f64;
            for &j in out {
                next[j] += share;
            }
        }
        let diff: f64 = x.iter().zip(&next).map(|(a, b)| (a - b).abs()).sum();
        x = next;
        iterations += 1;
        tracing::debug!(iteration = iterations, diff, "power iteration step");
        if diff < config.epsilon {
            converged = true;
            break;
        }
    }

    if converged {
        tracing::info!(iterations, "power iteration converged");
    } else {
        tracing::warn!(iterations, "power iteration hit the iteration cap without converging");
    }
    normalize(&mut x);
    PageRank { scores: x, convergence: Convergence { iterations, converged } }
}

pub fn monte_carlo(graph: &LinkGraph, estimator: Estimator, config: &PageRankConfig) -> PageRank {
    let n = graph.len();
    let mut counts = vec![0u64; n];
    if n == 0 {
        return PageRank { scores: Vec::new(), convergence: Convergence { iterations: 0, converged: true } };
    }
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut walk = |start: NodeId, rng: &mut StdRng| match estimator {
        Estimator::EndPointRandomStart | Estimator::EndPointCyclicStart => {
            let end = end_point_walk(graph, start, config.bored, rng);
            counts[end] += 1;
        }
        _ => complete_path_walk(graph, start, config.bored, rng, &mut counts),
    };

    match estimator {
        Estimator::EndPointRandomStart | Estimator::CompletePathRandomStart => {
            for _ in 0..config.walks {
                let start = rng.gen_range(0..n);
                walk(start, &mut rng);
            }
        }
        Estimator::EndPointCyclicStart | Estimator::CompletePathCyclicStart => {
            for _ in 0..config.walks {
                for start in 0..n {
                    walk(start, &mut rng);
                }
            }
        }
        Estimator::PowerIteration => return power_iteration(graph, config),
    }

    let mut scores: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
    normalize(&mut scores);
    tracing::info!(?estimator, walks = config.walks, "monte carlo estimate done");
    PageRank { scores, convergence: Convergence { iterations: config.walks, converged: true } }
}

/// Follows links until the surfer gets bored. Dangling nodes jump uniformly.
fn end_point_walk(graph: &LinkGraph, start: NodeId, bored: f64, rng: &mut StdRng) -> NodeId {
    let mut node = start;
    while rng.gen::<f64>() > bored {
        let out = graph.out_links(node);
        node = if out.is_empty() { rng.gen_range(0..graph.len()) } else { out[rng.gen_range(0..out.len())] };
    }
    node
}

/// Counts every node on the walk, start included. Stops at dangling nodes.
fn complete_path_walk(graph: &LinkGraph, start: NodeId, bored: f64, rng: &mut StdRng, counts: &mut [u64]) {
    let mut node = start;
    counts[node] += 1;
    while rng.gen::<f64>() > bored {
        let out = graph.out_links(node);
        if out.is_empty() {
            break;
        }
        node = out[rng.gen_range(0..out.len())];
        counts[node] += 1;
    }
}

fn normalize(x: &mut [f64]) {
    let sum: f64 = x.iter().sum();
    if sum > 0.0 {
        x.iter_mut().for_each(|v| *v /= sum);
    }
}

/// Sum of squared differences between an estimate and the exact vector over
/// the `k` highest-ranked nodes of the exact vector.
pub fn top_k_squared_error(exact: &[f64], estimate: &[f64], k: usize) -> f64 {
    let mut order: Vec<usize> = (0..exact.len()).collect();
    order.sort_by(|&a, &b| exact[b].partial_cmp(&exact[a]).unwrap_or(Ordering::Equal).then(a.cmp(&b)));
    order
        .into_iter()
        .take(k)
        .map(|i| {
            let d = exact[i] - estimate.get(i).copied().unwrap_or(0.0);
            d * d
        })
        .sum()
}

/// Writes `title,score` lines in descending score order.
pub fn write_scores(path: &Path, graph: &LinkGraph, pagerank: &PageRank) -> Result<()> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for (label, score) in pagerank.ranked(graph) {
        writeln!(w, "{label},{score}")?;
    }
    w.flush()?;
    Ok(())
}

/// Precomputed PageRank keyed by document title.
#[derive(Debug, Clone, Default)]
pub struct PageRankScores {
    by_title: HashMap<String, f64>,
}

impl PageRankScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a `title,score` file. A missing file gives empty scores.
    pub fn load(path: &Path) -> Result<Self> {
        let f = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "pagerank file not found, pagerank ranking disabled");
                return Ok(Self::new());
            }
            Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
        };
        let mut by_title = HashMap::new();
        for line in BufReader::new(f).lines() {
            let line = line?;
            let Some((title, score)) = line.trim().rsplit_once(',') else { continue };
            match score.trim().parse::<f64>() {
                Ok(score) => {
                    by_title.insert(title.to_string(), score);
                }
                Err(_) => tracing::warn!(line, "skipping malformed pagerank line"),
            }
        }
        tracing::info!(documents = by_title.len(), "loaded pagerank scores");
        Ok(Self { by_title })
    }

    pub fn get(&self, title: &str) -> Option<f64> {
        self.by_title.get(title).copied()
    }

    pub fn len(&self) -> usize {
        self.by_title.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_title.is_empty()
    }
}

impl FromIterator<(String, f64)> for PageRankScores {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self { by_title: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(text: &str) -> LinkGraph {
        LinkGraph::parse(text.as_bytes()).unwrap()
    }

    #[test]
    fn symmetric_cycle_is_uniform() {
        let g = graph("a;b\nb;c\nc;a\n");
        let pr = power_iteration(&g, &PageRankConfig::default());
        assert!(pr.convergence.converged);
        for s in &pr.scores {
            assert!((s - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    /// Textbook PageRank: dangling rank is spread over every node each step.
    fn redistributing(g: &LinkGraph) -> Vec<f64> {
        let n = g.len() as f64;
        let mut x = vec![1.0 / n; g.len()];
        for _ in 0..500 {
            let dangling: f64 = g.nodes().filter(|&i| g.is_dangling(i)).map(|i| x[i]).sum();
            let mut next = vec![(BORED + (1.0 - BORED) * dangling) / n; g.len()];
            for i in g.nodes() {
                let out = g.out_links(i);
                for &j in out {
                    next[j] += (1.0 - BORED) * x[i] / out.len() as f64;
                }
            }
            x = next;
        }
        x
    }

    #[test]
    fn normalized_jump_only_matches_redistribution() {
        let g = graph("a;b,c\nb;c\nc;\nd;a,c\n");
        let tight = PageRankConfig { epsilon: 1e-12, ..PageRankConfig::default() };
        let pr = power_iteration(&g, &tight);
        assert!((pr.scores.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        // c is linked by everyone
        assert_eq!(pr.ranked(&g)[0].0, "c");
        for (got, want) in pr.scores.iter().zip(redistributing(&g)) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
    }

    #[test]
    fn monte_carlo_estimates_approach_power_iteration() {
        let exact_config = PageRankConfig { epsilon: 1e-12, ..PageRankConfig::default() };
        let config = PageRankConfig { walks: 200_000, seed: Some(3), ..PageRankConfig::default() };
        for text in ["a;b,c\nb;c\nc;\nd;a,c\n", "a;b\nb;a,c\nc;a,d\nd;b\n"] {
            let g = graph(text);
            let exact = power_iteration(&g, &exact_config);
            for estimator in [
                Estimator::EndPointRandomStart,
                Estimator::EndPointCyclicStart,
                Estimator::CompletePathCyclicStart,
                Estimator::CompletePathRandomStart,
            ] {
                let estimate = rank(&g, estimator, &config);
                assert!((estimate.scores.iter().sum::<f64>() - 1.0).abs() < 1e-9);
                let l1: f64 = exact.scores.iter().zip(&estimate.scores).map(|(a, b)| (a - b).abs()).sum();
                assert!(l1 < 0.01, "{estimator:?} on {text:?}: {l1}");
            }
        }
    }

    #[test]
    fn iteration_cap_is_reported() {
        let g = graph("a;b\nb;a,c\nc;a\n");
        let pr = power_iteration(&g, &PageRankConfig { max_iterations: 2, ..PageRankConfig::default() });
        assert_eq!(pr.convergence, Convergence { iterations: 2, converged: false });
        assert!((pr.scores.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn seeded_walks_are_reproducible() {
        let g = graph("a;b\nb;a,c\nc;a\n");
        let config = PageRankConfig { walks: 200, seed: Some(7), ..PageRankConfig::default() };
        let first = monte_carlo(&g, Estimator::CompletePathRandomStart, &config);
        let second = monte_carlo(&g, Estimator::CompletePathRandomStart, &config);
        assert_eq!(first.scores, second.scores);
    }

    #[test]
    fn estimator_names_parse() {
        assert_eq!("mc4".parse::<Estimator>().unwrap(), Estimator::CompletePathCyclicStart);
        assert_eq!("power".parse::<Estimator>().unwrap(), Estimator::PowerIteration);
        assert!("mc3".parse::<Estimator>().is_err());
    }

    #[test]
    fn squared_error_over_exact_top_k() {
        let exact = [0.5, 0.3, 0.2];
        let estimate = [0.4, 0.3, 0.3];
        assert!((top_k_squared_error(&exact, &estimate, 1) - 0.01).abs() < 1e-12);
        assert!((top_k_squared_error(&exact, &estimate, 3) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn scores_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut g = LinkGraph::new();
        let (x, y) = (g.add_node("x,1"), g.add_node("y"));
        g.add_edge(x, y);
        g.add_edge(y, x);
        let pr = power_iteration(&g, &PageRankConfig::default());
        let path = dir.path().join("output.txt");
        write_scores(&path, &g, &pr).unwrap();
        let scores = PageRankScores::load(&path).unwrap();
        assert_eq!(scores.len(), 2);
        assert!((scores.get("x,1").unwrap() - 0.5).abs() < 1e-6);
        assert!(PageRankScores::load(&dir.path().join("missing.txt")).unwrap().is_empty());
    }
}
