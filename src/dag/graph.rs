// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::errors::{Result, TaskdagError};

/// Immutable dependency graph over the jobs of one workflow.
///
/// Edge direction: parent -> child. For a job `load` that runs after
/// `extract` we store the edge `extract -> load`.
///
/// Node order is insertion order, which keeps every iteration (and therefore
/// every scheduling decision) deterministic across ticks.
#[derive(Debug, Clone)]
pub struct JobDag {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl JobDag {
    pub fn builder() -> JobDagBuilder {
        JobDagBuilder::default()
    }

    /// All job names, in insertion order.
    pub fn all_nodes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, job: &str) -> bool {
        self.index.contains_key(job)
    }

    /// Jobs with an edge into `job`. Empty for root jobs and unknown names.
    pub fn direct_parents(&self, job: &str) -> Vec<&str> {
        self.neighbours(job, Direction::Incoming)
    }

    /// Jobs that list `job` as a parent.
    pub fn direct_children(&self, job: &str) -> Vec<&str> {
        self.neighbours(job, Direction::Outgoing)
    }

    /// Jobs without parents.
    pub fn roots(&self) -> Vec<&str> {
        self.all_nodes()
            .filter(|job| self.direct_parents(job).is_empty())
            .collect()
    }

    fn neighbours(&self, job: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(job) else {
            return Vec::new();
        };

        // petgraph yields neighbours newest-edge first; sort back into node order.
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(idx, dir).collect();
        found.sort_unstable();
        found.dedup();
        found
            .into_iter()
            .map(|n| self.graph[n].as_str())
            .collect()
    }
}

/// Collects nodes and edges, then validates them in [`JobDagBuilder::build`].
#[derive(Debug, Default, Clone)]
pub struct JobDagBuilder {
    nodes: Vec<String>,
    edges: Vec<(String, String)>,
}

impl JobDagBuilder {
    /// Add a job. Adding the same name twice keeps the first position.
    pub fn node(mut self, job: impl Into<String>) -> Self {
        let job = job.into();
        if !self.nodes.contains(&job) {
            self.nodes.push(job);
        }
        self
    }

    /// Record that `child` runs after `parent`.
    pub fn edge(mut self, parent: impl Into<String>, child: impl Into<String>) -> Self {
        self.edges.push((parent.into(), child.into()));
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Fails with [`TaskdagError::UnknownDependency`] when an edge names a job
    /// that was never added, and with [`TaskdagError::CyclicDependency`] when
    /// the edges form a cycle (self-edges included).
    pub fn build(self) -> Result<JobDag> {
        let mut graph: DiGraph<String, ()> = DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        let mut index = HashMap::with_capacity(self.nodes.len());

        for name in self.nodes {
            let idx = graph.add_node(name.clone());
            index.insert(name, idx);
        }

        for (parent, child) in &self.edges {
            let Some(&child_idx) = index.get(child) else {
                return Err(TaskdagError::UnknownDependency {
                    job: child.clone(),
                    parent: parent.clone(),
                });
            };
            let Some(&parent_idx) = index.get(parent) else {
                return Err(TaskdagError::UnknownDependency {
                    job: child.clone(),
                    parent: parent.clone(),
                });
            };
            graph.update_edge(parent_idx, child_idx, ());
        }

        // A topological sort fails if (and only if) there is a cycle.
        if let Err(cycle) = toposort(&graph, None) {
            let job = &graph[cycle.node_id()];
            return Err(TaskdagError::CyclicDependency(format!(
                "cycle detected in job DAG involving job '{job}'"
            )));
        }

        Ok(JobDag { graph, index })
    }
}
