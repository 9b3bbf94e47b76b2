//! # Topology - canonical railway graph
//!
//! The pivot format between every importer and exporter of the conversion
//! service. A [`Topology`] holds track nodes, the edges (track sections)
//! between them, the signals placed on those edges and, once derived, the
//! signalling routes between signals.
//!
//! ## Modules
//!
//! - **graph**: the data model and basic lookups
//! - **engine**: geometry and traversal helpers
//! - **invariants**: reference checks every importer result must pass
//! - **routing**: signal-to-signal route derivation
//! - **layout**: the schematic overview graph used by the browser renderer

pub mod topology;

pub use topology::{
    engine::{Heading, TopologyEngine},
    graph::{
        CoordinateSystem, Edge, GeoPoint, Node, NodeKind, Route, Signal, SignalDirection,
        SignalFunction, SignalKind, SignalSide, Topology, TopologySummary,
    },
    invariants::{InvariantChecker, InvariantViolation, ViolationSeverity},
    layout::{
        LayoutOptions, OverviewLayout, SchematicEdge, SchematicGraph, SchematicNode,
        SchematicProperties,
    },
    routing::{RoutePlanner, RoutingOptions},
};

use uuid::Uuid;

/// Errors raised by topology operations
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("Node not found: {0}")]
    NodeNotFound(Uuid),

    #[error("Edge not found: {0}")]
    EdgeNotFound(Uuid),

    #[error("Signal not found: {0}")]
    SignalNotFound(Uuid),

    #[error("Signal {signal} lies outside edge {edge} (distance {distance})")]
    SignalOutOfRange { signal: Uuid, edge: Uuid, distance: f64 },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, TopologyError>;
