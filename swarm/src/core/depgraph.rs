//! Import-based dependency graph among project files.
//!
//! Nodes are files, edges point from a file to the local files it imports.
//! The graph is built once per run and read-only afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::core::syntax;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<PathBuf, ()>,
    /// Files whose content did not parse; they are nodes without edges.
    unparsed: Vec<PathBuf>,
}

impl DependencyGraph {
    /// Build the graph from `(path, content)` pairs.
    ///
    /// Every file becomes a node. Import candidates are matched against file
    /// stems; each match other than the importing file adds one edge.
    pub fn build<P, S>(files: &[(P, S)]) -> Self
    where
        P: AsRef<Path>,
        S: AsRef<str>,
    {
        let mut graph = DiGraph::new();
        let mut by_stem: BTreeMap<String, Vec<NodeIndex>> = BTreeMap::new();
        let mut nodes = Vec::with_capacity(files.len());

        for (path, _) in files {
            let path = path.as_ref();
            let index = graph.add_node(path.to_path_buf());
            if let Some(stem) = path.file_stem() {
                by_stem
                    .entry(stem.to_string_lossy().into_owned())
                    .or_default()
                    .push(index);
            }
            nodes.push(index);
        }

        let mut unparsed = Vec::new();
        for ((path, content), &from) in files.iter().zip(&nodes) {
            let Ok(candidates) = syntax::import_candidates(content.as_ref()) else {
                unparsed.push(path.as_ref().to_path_buf());
                continue;
            };
            for candidate in candidates {
                let Some(targets) = by_stem.get(&candidate) else {
                    continue;
                };
                for &to in targets {
                    if to != from && graph.find_edge(from, to).is_none() {
                        graph.add_edge(from, to, ());
                    }
                }
            }
        }

        Self { graph, unparsed }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn unparsed(&self) -> &[PathBuf] {
        &self.unparsed
    }

    /// Local dependencies of `path` in first-seen order.
    pub fn dependencies(&self, path: &Path) -> Vec<&Path> {
        match self.index_of(path) {
            Some(index) => self.dependencies_of(index),
            None => Vec::new(),
        }
    }

    /// Files ordered by ascending out-degree, then file name, then full path.
    ///
    /// This is a single sort, so cycles cannot cause it to loop.
    pub fn fix_order(&self) -> Vec<PathBuf> {
        let mut ordered: Vec<(usize, &Path)> = self
            .graph
            .node_indices()
            .map(|i| {
                let degree = self.graph.edges_directed(i, Direction::Outgoing).count();
                (degree, self.graph[i].as_path())
            })
            .collect();
        ordered.sort_by(|(da, a), (db, b)| {
            da.cmp(db)
                .then_with(|| a.file_name().cmp(&b.file_name()))
                .then_with(|| a.cmp(b))
        });
        ordered.into_iter().map(|(_, p)| p.to_path_buf()).collect()
    }

    /// One line per file, `name -> dep1, dep2` or `name -> None`, with paths
    /// shown relative to `base` when possible.
    pub fn render(&self, base: &Path) -> String {
        let display = |p: &Path| p.strip_prefix(base).unwrap_or(p).display().to_string();
        let mut out = String::new();
        for index in self.graph.node_indices() {
            let deps: Vec<String> = self
                .dependencies_of(index)
                .into_iter()
                .map(display)
                .collect();
            let deps = if deps.is_empty() {
                "None".to_string()
            } else {
                deps.join(", ")
            };
            out.push_str(&format!("{} -> {deps}\n", display(self.graph[index].as_path())));
        }
        out
    }

    fn index_of(&self, path: &Path) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&i| self.graph[i].as_path() == path)
    }

    fn dependencies_of(&self, index: NodeIndex) -> Vec<&Path> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges
            .into_iter()
            .map(|(_, target)| self.graph[target].as_path())
            .collect()
    }
}
