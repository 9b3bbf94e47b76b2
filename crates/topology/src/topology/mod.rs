//! Topology module - graph model and algorithms for railway topologies

pub mod engine;
pub mod graph;
pub mod invariants;
pub mod layout;
pub mod routing;

pub use engine::TopologyEngine;
pub use graph::{Edge, Node, Signal, Topology};
pub use invariants::InvariantChecker;
pub use layout::OverviewLayout;
pub use routing::RoutePlanner;
