use crate::catalog::DocCatalog;
use crate::graph::{LinkGraph, NodeId};
use crate::pagerank::Convergence;
use crate::postings::{PostingsEntry, PostingsList};
use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct HitsConfig {
    pub hub_weight: f64,
    pub authority_weight: f64,
    pub epsilon: f64,
    pub max_iterations: usize,
}

impl Default for HitsConfig {
    fn default() -> Self {
        Self { hub_weight: 0.3, authority_weight: 0.7, epsilon: 0.001, max_iterations: 1000 }
    }
}

/// Hub and authority vectors over a set of nodes, each L2-normalized.
#[derive(Debug, Clone)]
pub struct HitsScores {
    pub nodes: Vec<NodeId>,
    pub hubs: Vec<f64>,
    pub authorities: Vec<f64>,
    pub convergence: Convergence,
}

/// Query-time hubs and authorities over the link graph. Node labels in the
/// link file are ids that the titles file maps to document file names.
#[derive(Debug, Clone, Default)]
pub struct HitsRanker {
    graph: LinkGraph,
    titles: HashMap<NodeId, String>,
    nodes_by_title: HashMap<String, NodeId>,
    config: HitsConfig,
}

impl HitsRanker {
    /// Loads `nodeID;outNodeID,...` links and `nodeID;title` titles. Missing
    /// files leave the ranker empty.
    pub fn open(links: &Path, titles: &Path) -> Result<Self> {
        let graph = LinkGraph::load(links)?;
        let titles = load_titles(titles)?;
        Ok(Self::from_parts(graph, titles))
    }

    /// `titles` maps a node label to its document title.
    pub fn from_parts(graph: LinkGraph, titles: HashMap<String, String>) -> Self {
        let mut by_node = HashMap::new();
        let mut nodes_by_title = HashMap::new();
        for (label, title) in titles {
            if let Some(node) = graph.id(&label) {
                nodes_by_title.insert(title.clone(), node);
                by_node.insert(node, title);
            }
        }
        Self { graph, titles: by_node, nodes_by_title, config: HitsConfig::default() }
    }

    pub fn with_config(mut self, config: HitsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn title(&self, node: NodeId) -> Option<&str> {
        self.titles.get(&node).map(String::as_str)
    }

    /// Scores the result documents plus their one-hop neighbourhood. Each
    /// document scores `hub_weight * hub + authority_weight * authority`.
    pub fn rank(&self, postings: &PostingsList, catalog: &DocCatalog) -> PostingsList {
        let mut base = BTreeSet::new();
        for entry in postings.filtered() {
            let Some(name) = catalog.file_name(entry.doc_id) else { continue };
            let Some(&node) = self.nodes_by_title.get(name) else { continue };
            base.insert(node);
            let neighbours = self.graph.out_links(node).iter().chain(self.graph.in_links(node));
            for &other in neighbours {
                let known = self.title(other).and_then(|t| catalog.id_by_file_name(t)).is_some();
                if known {
                    base.insert(other);
                }
            }
        }
        let nodes: Vec<NodeId> = base.into_iter().collect();
        let scores = self.iterate(&nodes);
        tracing::debug!(base_set = nodes.len(), iterations = scores.convergence.iterations, "hits ranking");

        let mut result = PostingsList::new();
        for (i, &node) in scores.nodes.iter().enumerate() {
            let Some(doc_id) = self.title(node).and_then(|t| catalog.id_by_file_name(t)) else { continue };
            let score = self.config.hub_weight * scores.hubs[i] + self.config.authority_weight * scores.authorities[i];
            result.insert(PostingsEntry::scored(doc_id, score));
        }
        result
    }

    /// HITS over the whole graph.
    pub fn rank_all(&self) -> HitsScores {
        let nodes: Vec<NodeId> = self.graph.nodes().collect();
        self.iterate(&nodes)
    }

    /// Synchronous hub/authority iteration on the subgraph induced by `nodes`.
    pub fn iterate(&self, nodes: &[NodeId]) -> HitsScores {
        let n = nodes.len();
        let local: HashMap<NodeId, usize> = nodes.iter().enumerate().map(|(i, &node)| (node, i)).collect();
        let edges: Vec<(usize, usize)> = nodes
            .iter()
            .enumerate()
            .flat_map(|(i, &node)| {
                let local = &local;
                self.graph.out_links(node).iter().filter_map(move |to| local.get(to).map(|&j| (i, j)))
            })
            .collect();

        let mut hubs = vec![1.0; n];
        let mut authorities = vec![1.0; n];
        let mut iterations = 0;
        let mut converged = n == 0;
        while !converged && iterations < self.config.max_iterations {
            let mut new_hubs = vec![0.0; n];
            let mut new_authorities = vec![0.0; n];
            for &(i, j) in &edges {
                new_hubs[i] += authorities[j];
                new_authorities[j] += hubs[i];
            }
            l2_normalize(&mut new_hubs);
            l2_normalize(&mut new_authorities);
            let hub_delta = l1_distance(&hubs, &new_hubs);
            let authority_delta = l1_distance(&authorities, &new_authorities);
            hubs = new_hubs;
            authorities = new_authorities;
            iterations += 1;
            converged = hub_delta <= self.config.epsilon && authority_delta <= self.config.epsilon;
        }
        if !converged {
            tracing::warn!(iterations, nodes = n, "hits did not converge");
        }
        HitsScores { nodes: nodes.to_vec(), hubs, authorities, convergence: Convergence { iterations, converged } }
    }

    /// `(title, score)` pairs in descending order. Nodes without a title use
    /// their link-file label.
    pub fn top(&self, nodes: &[NodeId], scores: &[f64], k: usize) -> Vec<(String, f64)> {
        let mut order: Vec<usize> = (0..nodes.len()).collect();
        order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal).then(a.cmp(&b)));
        order
            .into_iter()
            .take(k)
            .map(|i| {
                let node = nodes[i];
                let name = self.title(node).or_else(|| self.graph.label(node)).unwrap_or_default();
                (name.to_string(), scores[i])
            })
            .collect()
    }
}

/// Writes `title: score` lines.
pub fn write_top(path: &Path, top: &[(String, f64)]) -> Result<()> {
    let f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut w = BufWriter::new(f);
    for (title, score) in top {
        writeln!(w, "{title}: {score}")?;
    }
    w.flush()?;
    Ok(())
}

fn load_titles(path: &Path) -> Result<HashMap<String, String>> {
    let f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "titles file not found, hits ranking disabled");
            return Ok(HashMap::new());
        }
        Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
    };
    let mut titles = HashMap::new();
    for line in BufReader::new(f).lines() {
        let line = line?;
        if let Some((id, title)) = line.split_once(';') {
            titles.insert(id.trim().to_string(), title.trim().to_string());
        }
    }
    Ok(titles)
}

fn l2_normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

fn l1_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranker() -> HitsRanker {
        // 1 -> 2, 1 -> 3, 2 -> 3, 4 -> 3
        let graph = LinkGraph::parse("1;2,3\n2;3\n4;3\n".as_bytes()).unwrap();
        let titles = [("1", "a.f"), ("2", "b.f"), ("3", "c.f"), ("4", "d.f")]
            .into_iter()
            .map(|(id, t)| (id.to_string(), t.to_string()))
            .collect();
        HitsRanker::from_parts(graph, titles)
    }

    #[test]
    fn vectors_are_unit_length() {
        let scores = ranker().rank_all();
        assert!(scores.convergence.converged);
        for v in [&scores.hubs, &scores.authorities] {
            let norm: f64 = v.iter().map(|x| x * x).sum();
            assert!((norm - 1.0).abs() < 1e-9);
        }
        let r = ranker();
        let top_auth = r.top(&scores.nodes, &scores.authorities, 1);
        assert_eq!(top_auth[0].0, "c.f");
        let top_hub = r.top(&scores.nodes, &scores.hubs, 1);
        assert_eq!(top_hub[0].0, "a.f");
    }

    #[test]
    fn isolated_nodes_keep_zero_vectors() {
        let r = HitsRanker::from_parts(LinkGraph::parse("x;\ny;\n".as_bytes()).unwrap(), HashMap::new());
        let scores = r.rank_all();
        assert_eq!(scores.hubs, vec![0.0, 0.0]);
        assert!(scores.convergence.converged);
    }

    #[test]
    fn rank_expands_to_neighbours_in_catalog() {
        let mut catalog = DocCatalog::new();
        catalog.register(10, "wiki/a.f", 5);
        catalog.register(11, "wiki/c.f", 5);
        catalog.register(12, "wiki/b.f", 5);
        let postings: PostingsList = [PostingsEntry::document(11)].into_iter().collect();
        let ranked = ranker().rank(&postings, &catalog);
        // d.f links to c.f but is not in the catalog
        assert_eq!(ranked.doc_ids(), vec![10, 11, 12]);
        let best = ranked.iter().max_by(|a, b| a.score.total_cmp(&b.score)).unwrap();
        assert_eq!(best.doc_id, 11);
    }
}
