//! Creation-order planning.
//!
//! Resources declare what must exist before them; the graph produces a
//! total order satisfying every declaration. Ordering is deterministic:
//! among resources whose prerequisites are all met, insertion order
//! wins. Identical input always yields an identical plan.

use crate::error::{Result, SynthError};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    index: BTreeMap<String, usize>,
    /// edges[i] lists node indexes that must be created before node i.
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Re-registering an existing id is a no-op, so
    /// callers can declare edges without tracking what already exists.
    pub fn add_node(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(id.to_string());
        self.index.insert(id.to_string(), idx);
        self.edges.push(Vec::new());
        idx
    }

    /// Declare that `prerequisite` must be created before `id`.
    pub fn depends_on(&mut self, id: &str, prerequisite: &str) {
        let node = self.add_node(id);
        let dep = self.add_node(prerequisite);
        if node != dep && !self.edges[node].contains(&dep) {
            self.edges[node].push(dep);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Kahn's algorithm with insertion-order tie-breaking. Fails when a
    /// cycle makes ordering impossible, naming one involved node.
    pub fn creation_order(&self) -> Result<Vec<String>> {
        let mut pending: Vec<usize> = self.edges.iter().map(Vec::len).collect();
        let mut emitted = vec![false; self.nodes.len()];
        let mut order = Vec::with_capacity(self.nodes.len());

        while order.len() < self.nodes.len() {
            let next = (0..self.nodes.len()).find(|&i| !emitted[i] && pending[i] == 0);
            let Some(next) = next else {
                // Everything left is waiting on something else left.
                let stuck = (0..self.nodes.len())
                    .find(|&i| !emitted[i])
                    .map(|i| self.nodes[i].clone())
                    .unwrap_or_default();
                return Err(SynthError::DependencyCycle { id: stuck });
            };
            emitted[next] = true;
            order.push(self.nodes[next].clone());
            for (node, deps) in self.edges.iter().enumerate() {
                if !emitted[node] && deps.contains(&next) {
                    pending[node] -= 1;
                }
            }
        }
        Ok(order)
    }
}
