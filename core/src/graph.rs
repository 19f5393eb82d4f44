use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub type NodeId = usize;

/// Directed link graph stored as an arena of adjacency lists.
///
/// Nodes are identified by their label in the link file and numbered in order
/// of first appearance. Duplicate edges are dropped.
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    labels: Vec<String>,
    ids: HashMap<String, NodeId>,
    out_links: Vec<Vec<NodeId>>,
    in_links: Vec<Vec<NodeId>>,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `label;dest,dest,...` lines. A missing file yields an empty graph.
    pub fn load(path: &Path) -> Result<Self> {
        let f = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "link file not found, graph is empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
        };
        let graph = Self::parse(BufReader::new(f)).with_context(|| format!("reading {}", path.display()))?;
        tracing::info!(nodes = graph.len(), edges = graph.edge_count(), path = %path.display(), "loaded link graph");
        Ok(graph)
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut graph = Self::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (from, dests) = line.split_once(';').unwrap_or((line, ""));
            let from = graph.add_node(from.trim());
            for dest in dests.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                let to = graph.add_node(dest);
                graph.add_edge(from, to);
            }
        }
        Ok(graph)
    }

    /// Id of `label`, allocating a new node on first sight.
    pub fn add_node(&mut self, label: &str) -> NodeId {
        if let Some(&id) = self.ids.get(label) {
            return id;
        }
        let id = self.labels.len();
        self.labels.push(label.to_string());
        self.ids.insert(label.to_string(), id);
        self.out_links.push(Vec::new());
        self.in_links.push(Vec::new());
        id
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if self.out_links[from].contains(&to) {
            return;
        }
        self.out_links[from].push(to);
        self.in_links[to].push(from);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.out_links.iter().map(Vec::len).sum()
    }

    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub fn id(&self, label: &str) -> Option<NodeId> {
        self.ids.get(label).copied()
    }

    pub fn out_links(&self, id: NodeId) -> &[NodeId] {
        self.out_links.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn in_links(&self, id: NodeId) -> &[NodeId] {
        self.in_links.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn out_degree(&self, id: NodeId) -> usize {
        self.out_links(id).len()
    }

    pub fn is_dangling(&self, id: NodeId) -> bool {
        self.out_degree(id) == 0
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        0..self.labels.len()
    }
}
