//! Topological invariants - reference rules every imported topology must
//! satisfy before it is handed to an exporter.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::graph::Topology;
use crate::{Result, TopologyError};

/// A violation of a topological invariant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub invariant_name: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub affected_ids: Vec<Uuid>,
}

/// Severity levels for invariant violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Worth noting, exporters cope with it
    Warning,
    /// The topology is unusable
    Error,
}

/// Invariant checker for topology validation
pub struct InvariantChecker {
    /// Enable strict mode (all warnings become errors)
    strict_mode: bool,
}

impl Default for InvariantChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantChecker {
    pub fn new() -> Self {
        Self { strict_mode: false }
    }

    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Check all invariants against a topology
    pub fn check_all(&self, topology: &Topology) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        violations.extend(self.check_no_orphan_edges(topology));
        violations.extend(self.check_no_self_loops(topology));
        violations.extend(self.check_edge_lengths(topology));
        violations.extend(self.check_signal_placement(topology));
        violations.extend(self.check_route_references(topology));

        if self.strict_mode {
            for v in &mut violations {
                v.severity = ViolationSeverity::Error;
            }
        }

        violations
    }

    /// Only the error-severity violations
    pub fn errors(&self, topology: &Topology) -> Vec<InvariantViolation> {
        self.check_all(topology)
            .into_iter()
            .filter(|v| v.severity == ViolationSeverity::Error)
            .collect()
    }

    /// Fail with the first error-severity violation, if any
    pub fn ensure(&self, topology: &Topology) -> Result<()> {
        let errors = self.errors(topology);
        match errors.first() {
            None => Ok(()),
            Some(first) => Err(TopologyError::InvariantViolation(format!(
                "{} ({} violation(s) in total)",
                first.message,
                errors.len()
            ))),
        }
    }

    /// Check that all edges reference existing nodes
    fn check_no_orphan_edges(&self, topology: &Topology) -> Vec<InvariantViolation> {
        let node_ids: HashSet<Uuid> = topology.nodes.keys().copied().collect();

        topology
            .edges
            .values()
            .filter_map(|edge| {
                let orphan_refs: Vec<Uuid> = [edge.node_a, edge.node_b]
                    .into_iter()
                    .filter(|id| !node_ids.contains(id))
                    .collect();
                if orphan_refs.is_empty() {
                    return None;
                }
                Some(InvariantViolation {
                    invariant_name: "no_orphan_edges".to_string(),
                    severity: ViolationSeverity::Error,
                    message: format!(
                        "Edge {} references non-existent nodes: {:?}",
                        edge.uuid, orphan_refs
                    ),
                    affected_ids: std::iter::once(edge.uuid).chain(orphan_refs).collect(),
                })
            })
            .collect()
    }

    fn check_no_self_loops(&self, topology: &Topology) -> Vec<InvariantViolation> {
        topology
            .edges
            .values()
            .filter(|edge| edge.node_a == edge.node_b)
            .map(|edge| InvariantViolation {
                invariant_name: "no_self_loops".to_string(),
                severity: ViolationSeverity::Warning,
                message: format!("Edge {} is a self-loop on node {}", edge.uuid, edge.node_a),
                affected_ids: vec![edge.uuid, edge.node_a],
            })
            .collect()
    }

    fn check_edge_lengths(&self, topology: &Topology) -> Vec<InvariantViolation> {
        topology
            .edges
            .values()
            .filter(|edge| !edge.length.is_finite() || edge.length < 0.0)
            .map(|edge| InvariantViolation {
                invariant_name: "valid_edge_length".to_string(),
                severity: ViolationSeverity::Error,
                message: format!("Edge {} has invalid length: {}", edge.uuid, edge.length),
                affected_ids: vec![edge.uuid],
            })
            .collect()
    }

    /// Signals must sit on an existing edge, within its length
    fn check_signal_placement(&self, topology: &Topology) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        for signal in topology.signals.values() {
            match topology.edge(signal.edge) {
                None => violations.push(InvariantViolation {
                    invariant_name: "signal_on_existing_edge".to_string(),
                    severity: ViolationSeverity::Error,
                    message: format!(
                        "Signal {} references non-existent edge {}",
                        signal.uuid, signal.edge
                    ),
                    affected_ids: vec![signal.uuid, signal.edge],
                }),
                Some(edge) if signal.distance < 0.0 || signal.distance > edge.length + 1e-6 => {
                    violations.push(InvariantViolation {
                        invariant_name: "signal_within_edge".to_string(),
                        severity: ViolationSeverity::Error,
                        message: format!(
                            "Signal {} at {:.1} m lies outside edge {} ({:.1} m)",
                            signal.uuid, signal.distance, edge.uuid, edge.length
                        ),
                        affected_ids: vec![signal.uuid, edge.uuid],
                    })
                }
                Some(_) => {}
            }
        }

        violations
    }

    fn check_route_references(&self, topology: &Topology) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        for route in &topology.routes {
            let missing: Vec<Uuid> = [route.start_signal, route.end_signal]
                .into_iter()
                .filter(|id| !topology.signals.contains_key(id))
                .chain(
                    route
                        .edges
                        .iter()
                        .copied()
                        .filter(|id| !topology.edges.contains_key(id)),
                )
                .collect();

            if !missing.is_empty() {
                violations.push(InvariantViolation {
                    invariant_name: "route_references".to_string(),
                    severity: ViolationSeverity::Error,
                    message: format!("Route {} references unknown elements: {:?}", route.uuid, missing),
                    affected_ids: std::iter::once(route.uuid).chain(missing).collect(),
                });
            }
        }

        violations
    }
}
