//! Invariant oracle for simulated runs.
//!
//! The oracle knows nothing about the updates that produced a graph. It
//! inspects the final structure directly and recomputes every world matrix
//! the slow way, by multiplying local matrices along the parent chain, so a
//! bug in the graph's incremental refresh shows up as a disagreement.

use crate::error::SimError;

use nalgebra::Matrix4;
use scenemirror_core::{GraphConfig, SceneGraph, ROOT_ID};
use std::collections::HashSet;
use tracing::debug;

/// Checks structural and numeric invariants of a [`SceneGraph`].
#[derive(Debug, Clone)]
pub struct Oracle {
    /// Largest tolerated element-wise difference between matrices
    tolerance: f64,
}

impl Default for Oracle {
    fn default() -> Self {
        Self { tolerance: 1e-9 }
    }
}

impl Oracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the matrix comparison tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Returns every violated invariant, in a stable order.
    ///
    /// Recomputes the graph first, so every node must be current afterwards.
    pub fn violations(&self, graph: &mut SceneGraph) -> Vec<String> {
        graph.recompute();

        let mut ids: Vec<String> = graph.ids().map(str::to_string).collect();
        ids.sort();

        let mut violations = Vec::new();
        if !graph.contains(ROOT_ID) {
            violations.push("root is missing".to_string());
        }

        for id in &ids {
            let Some(node) = graph.get(id) else {
                continue;
            };

            // Parent and child links agree
            if let Some(parent) = node.parent() {
                match graph.get(parent) {
                    Some(p) if p.children().iter().any(|c| c == id) => {}
                    Some(_) => violations.push(format!("{id}: parent {parent} does not list it")),
                    None => violations.push(format!("{id}: parent {parent} is not registered")),
                }
            }
            let mut seen = HashSet::new();
            for child in node.children() {
                if !seen.insert(child.as_str()) {
                    violations.push(format!("{id}: child {child} listed twice"));
                }
                match graph.get(child) {
                    Some(c) if c.parent() == Some(id.as_str()) => {}
                    Some(_) => violations.push(format!("{id}: child {child} names another parent")),
                    None => violations.push(format!("{id}: child {child} is not registered")),
                }
            }

            match Self::chain_product(graph, id) {
                Some(expected) => {
                    let diff = (node.world_matrix() - expected).amax();
                    if diff > self.tolerance {
                        violations.push(format!("{id}: world matrix off by {diff:e}"));
                    }
                }
                None => violations.push(format!("{id}: parent chain has a cycle")),
            }

            if !graph.is_current(id) {
                violations.push(format!("{id}: stale after recompute"));
            }
        }

        debug!(entities = ids.len(), violations = violations.len(), "oracle check finished");
        violations
    }

    /// Fails with the first violated invariant.
    pub fn verify(&self, graph: &mut SceneGraph) -> Result<(), SimError> {
        match self.violations(graph).into_iter().next() {
            Some(violation) => Err(SimError::invariant(violation)),
            None => Ok(()),
        }
    }

    /// Exports `graph`, imports the snapshot into a fresh graph and checks
    /// that exporting again yields the same snapshot.
    ///
    /// Returns the number of bytes of the JSON encoding.
    pub fn verify_round_trip(&self, graph: &mut SceneGraph) -> Result<usize, SimError> {
        let json = graph.export_snapshot_json()?;
        let config = GraphConfig {
            reserved_anchors: false,
            ..graph.config().clone()
        };

        let mut mirror = SceneGraph::with_config(config);
        mirror.import_snapshot_json(&json)?;

        if mirror.export_snapshot() != graph.export_snapshot() {
            return Err(SimError::invariant("snapshot round trip changed the graph"));
        }
        self.verify(&mut mirror)?;
        Ok(json.len())
    }

    /// Product of local matrices from the top of `id`'s chain down to `id`.
    /// `None` if the chain loops.
    fn chain_product(graph: &SceneGraph, id: &str) -> Option<Matrix4<f64>> {
        let mut product = Matrix4::identity();
        let mut visited = HashSet::new();
        let mut current = graph.get(id);

        while let Some(node) = current {
            if !visited.insert(node.id()) {
                return None;
            }
            product = node.local_matrix() * product;
            current = node.parent().and_then(|p| graph.get(p));
        }
        Some(product)
    }
}
