//! Schematic overview layout
//!
//! Produces the graph the browser overview renderer draws directly: nodes
//! carry unit-box coordinates (scaled), signals become nodes of their own
//! with a rotation angle, edges reference node uuids.

use serde::{Deserialize, Serialize};

use super::engine::TopologyEngine;
use super::graph::{GeoPoint, NodeKind, SignalDirection, Topology};

#[derive(Debug, Clone)]
pub struct LayoutOptions {
    /// Keep only main signals
    pub signal_filter: bool,
    /// Multiplier applied to the unit-box coordinates
    pub scale: f64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            signal_filter: false,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchematicNode {
    pub uuid: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchematicEdge {
    pub uuid: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub track_type: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SchematicProperties {
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SchematicGraph {
    pub nodes: Vec<SchematicNode>,
    pub edges: Vec<SchematicEdge>,
    pub properties: SchematicProperties,
}

pub struct OverviewLayout;

impl OverviewLayout {
    pub fn render(topology: &Topology, options: &LayoutOptions) -> SchematicGraph {
        let Some(origin) = topology.nodes.values().next().map(|n| n.geo) else {
            return SchematicGraph::default();
        };
        let planar = |p: GeoPoint| {
            let d = TopologyEngine::planar_delta(origin, p, topology.crs);
            (d.east, d.north)
        };

        let node_positions: Vec<(f64, f64)> = topology.nodes.values().map(|n| planar(n.geo)).collect();
        let min_e = node_positions.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let max_e = node_positions.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let min_n = node_positions.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_n = node_positions.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        let range = (max_e - min_e).max(max_n - min_n);
        let range = if range > 0.0 { range } else { 1.0 };

        // screen space: y grows downwards
        let to_screen = |(east, north): (f64, f64)| {
            (
                (east - min_e) / range * options.scale,
                (max_n - north) / range * options.scale,
            )
        };

        let mut nodes = Vec::with_capacity(topology.node_count() + topology.signal_count());
        for (node, position) in topology.nodes.values().zip(node_positions.iter().copied()) {
            let (x, y) = to_screen(position);
            let node_type = match node.kind {
                NodeKind::Point => "NodeType.Point",
                NodeKind::End => "NodeType.Endpoint",
                NodeKind::Plain => "NodeType.Connection",
            };
            nodes.push(SchematicNode {
                uuid: node.uuid.to_string(),
                node_type: node_type.to_string(),
                name: node.name.clone(),
                x,
                y,
                angle: None,
                direction: None,
            });
        }

        for signal in topology.signals.values() {
            if options.signal_filter && !signal.kind.is_main() {
                continue;
            }
            let Some(edge) = topology.edge(signal.edge) else {
                continue;
            };
            let geometry = topology.edge_geometry(edge);
            let Some((point, heading)) =
                TopologyEngine::point_along(&geometry, signal.distance, topology.crs)
            else {
                continue;
            };

            let mut angle = -heading.degrees();
            if signal.direction == SignalDirection::Against {
                angle += 180.0;
            }
            let (x, y) = to_screen(planar(point));
            nodes.push(SchematicNode {
                uuid: signal.uuid.to_string(),
                node_type: "NodeType.Signal".to_string(),
                name: signal.name.clone(),
                x,
                y,
                angle: Some(angle.rem_euclid(360.0)),
                direction: Some(signal.direction.as_str().to_string()),
            });
        }

        let edges = topology
            .edges
            .values()
            .map(|e| SchematicEdge {
                uuid: e.uuid.to_string(),
                source: e.node_a.to_string(),
                target: e.node_b.to_string(),
                track_type: e.track_type,
            })
            .collect();

        let properties = SchematicProperties {
            max_x: nodes.iter().map(|n| n.x).fold(0.0, f64::max),
            max_y: nodes.iter().map(|n| n.y).fold(0.0, f64::max),
        };

        SchematicGraph {
            nodes,
            edges,
            properties,
        }
    }
}
