// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Dependency graph over the resources of a Bundle.
//!
//! Vertices are resource names; an edge `from -> to` means `from` depends on `to`.
//!
//! ## Algorithm
//!
//! [`DependencyGraph::topological_sort`] runs an iterative depth-first search with
//! three-color marking:
//!
//! 1. **WHITE** (unvisited)
//! 2. **GRAY** (on the current DFS stack)
//! 3. **BLACK** (emitted)
//!
//! A vertex is emitted once all of its dependencies are emitted (post-order), so
//! dependencies always come first. Reaching a GRAY vertex is a cycle.
//!
//! Roots are visited in insertion order and edges are followed in the order they
//! were added, so the output is fully determined by the input sequence:
//!
//! ```text
//! Inserted: a(dependsOn c), b, c(dependsOn b), d(dependsOn e), e
//! Sorted:   b, c, a, e, d
//! ```

use crate::errors::GraphError;
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Insertion-ordered directed graph of resource names.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    vertices: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateVertex`] if the name is already present.
    pub fn add_vertex(&mut self, name: &str) -> Result<(), GraphError> {
        if self.index.contains_key(name) {
            return Err(GraphError::DuplicateVertex(name.to_string()));
        }
        self.index.insert(name.to_string(), self.vertices.len());
        self.vertices.push(name.to_string());
        self.edges.push(Vec::new());
        Ok(())
    }

    /// Record that `from` depends on `to`. Adding the same edge twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownVertex`] if either endpoint is absent.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let from_idx = self.vertex_index(from)?;
        let to_idx = self.vertex_index(to)?;
        let out = &mut self.edges[from_idx];
        if !out.contains(&to_idx) {
            out.push(to_idx);
        }
        Ok(())
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Order vertices so that every dependency precedes its dependents.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CycleDetected`] with the cycle path, e.g. `[a, b, a]`.
    /// No partial order is returned.
    pub fn topological_sort(&self) -> Result<Vec<String>, GraphError> {
        let mut marks = vec![Mark::White; self.vertices.len()];
        let mut order = Vec::with_capacity(self.vertices.len());
        // (vertex, index of the next edge to follow)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..self.vertices.len() {
            if marks[root] != Mark::White {
                continue;
            }
            marks[root] = Mark::Gray;
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let (vertex, next_edge) = *frame;
                if let Some(&dep) = self.edges[vertex].get(next_edge) {
                    frame.1 += 1;
                    match marks[dep] {
                        Mark::White => {
                            marks[dep] = Mark::Gray;
                            stack.push((dep, 0));
                        }
                        Mark::Gray => return Err(self.cycle_error(&stack, dep)),
                        Mark::Black => {}
                    }
                } else {
                    marks[vertex] = Mark::Black;
                    order.push(self.vertices[vertex].clone());
                    stack.pop();
                }
            }
        }

        Ok(order)
    }

    fn vertex_index(&self, name: &str) -> Result<usize, GraphError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownVertex(name.to_string()))
    }

    fn cycle_error(&self, stack: &[(usize, usize)], revisited: usize) -> GraphError {
        let start = stack
            .iter()
            .position(|(v, _)| *v == revisited)
            .unwrap_or(0);
        let mut path: Vec<String> = stack[start..]
            .iter()
            .map(|(v, _)| self.vertices[*v].clone())
            .collect();
        path.push(self.vertices[revisited].clone());
        GraphError::CycleDetected { path }
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod graph_tests;
