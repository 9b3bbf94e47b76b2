//! Graph model for railway topologies

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::engine::TopologyEngine;
use crate::{Result, TopologyError};

/// Coordinate system of every [`GeoPoint`] in a topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSystem {
    /// x = latitude, y = longitude (degrees)
    #[default]
    Wgs84,
    /// Planar metres
    Local,
}

/// A coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub x: f64,
    pub y: f64,
}

impl GeoPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A switch: three or more connected edges
    Point,
    /// Buffer stop or open end of the imported area
    End,
    #[default]
    Plain,
}

/// A track node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub uuid: Uuid,
    pub name: String,
    pub geo: GeoPoint,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osm_id: Option<i64>,
}

impl Node {
    pub fn new(name: impl Into<String>, geo: GeoPoint) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            geo,
            kind: NodeKind::Plain,
            osm_id: None,
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_osm_id(mut self, osm_id: i64) -> Self {
        self.osm_id = Some(osm_id);
        self
    }
}

/// A track section between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub uuid: Uuid,
    pub node_a: Uuid,
    pub node_b: Uuid,
    /// Geometry between `node_a` and `node_b`, endpoints excluded
    #[serde(default)]
    pub intermediate: Vec<GeoPoint>,
    /// Length in metres
    pub length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_type: Option<u8>,
}

impl Edge {
    pub fn new(node_a: Uuid, node_b: Uuid) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            node_a,
            node_b,
            intermediate: Vec::new(),
            length: 0.0,
            track_type: None,
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn with_intermediate(mut self, points: Vec<GeoPoint>) -> Self {
        self.intermediate = points;
        self
    }

    pub fn with_length(mut self, length: f64) -> Self {
        self.length = length;
        self
    }

    pub fn with_track_type(mut self, track_type: u8) -> Self {
        self.track_type = Some(track_type);
        self
    }

    pub fn connects(&self, node_id: Uuid) -> bool {
        self.node_a == node_id || self.node_b == node_id
    }

    /// The node on the other end, if `node_id` is one of the ends
    pub fn other_node(&self, node_id: Uuid) -> Option<Uuid> {
        if self.node_a == node_id {
            Some(self.node_b)
        } else if self.node_b == node_id {
            Some(self.node_a)
        } else {
            None
        }
    }
}

/// Direction in which a signal is effective, relative to its edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    /// Governs movements from `node_a` towards `node_b`
    In,
    Against,
}

impl SignalDirection {
    pub fn opposite(&self) -> Self {
        match self {
            SignalDirection::In => SignalDirection::Against,
            SignalDirection::Against => SignalDirection::In,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalDirection::In => "in",
            SignalDirection::Against => "against",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignalFunction {
    Entry,
    Exit,
    Block,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    #[default]
    Main,
    Distant,
    MultiSection,
    Shunting,
    Other,
}

impl SignalKind {
    /// Main and multi-section signals delimit routes
    pub fn is_main(&self) -> bool {
        matches!(self, SignalKind::Main | SignalKind::MultiSection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignalSide {
    Left,
    #[default]
    Right,
}

/// A signal placed on an edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub uuid: Uuid,
    pub name: String,
    pub edge: Uuid,
    /// Metres from the edge's `node_a`
    pub distance: f64,
    pub direction: SignalDirection,
    #[serde(default)]
    pub function: SignalFunction,
    #[serde(default)]
    pub kind: SignalKind,
    #[serde(default)]
    pub side: SignalSide,
}

impl Signal {
    pub fn new(
        name: impl Into<String>,
        edge: Uuid,
        distance: f64,
        direction: SignalDirection,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            edge,
            distance,
            direction,
            function: SignalFunction::Other,
            kind: SignalKind::Main,
            side: SignalSide::Right,
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    pub fn with_kind(mut self, kind: SignalKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_function(mut self, function: SignalFunction) -> Self {
        self.function = function;
        self
    }

    pub fn with_side(mut self, side: SignalSide) -> Self {
        self.side = side;
        self
    }
}

/// A signalling route between two main signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub uuid: Uuid,
    pub start_signal: Uuid,
    pub end_signal: Uuid,
    pub edges: Vec<Uuid>,
    pub length: f64,
}

/// The railway topology graph
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Topology {
    #[serde(default)]
    pub crs: CoordinateSystem,
    pub nodes: IndexMap<Uuid, Node>,
    pub edges: IndexMap<Uuid, Edge>,
    pub signals: IndexMap<Uuid, Signal>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl Topology {
    pub fn new(crs: CoordinateSystem) -> Self {
        Self {
            crs,
            ..Default::default()
        }
    }

    pub fn add_node(&mut self, node: Node) -> Uuid {
        let id = node.uuid;
        self.nodes.insert(id, node);
        id
    }

    /// Add an edge between two existing nodes. A zero length is replaced by
    /// the length of the edge geometry.
    pub fn add_edge(&mut self, mut edge: Edge) -> Result<Uuid> {
        for end in [edge.node_a, edge.node_b] {
            if !self.nodes.contains_key(&end) {
                return Err(TopologyError::NodeNotFound(end));
            }
        }
        if edge.length <= 0.0 {
            edge.length = TopologyEngine::polyline_length(&self.edge_geometry(&edge), self.crs);
        }
        let id = edge.uuid;
        self.edges.insert(id, edge);
        Ok(id)
    }

    /// Add a signal on an existing edge
    pub fn add_signal(&mut self, signal: Signal) -> Result<Uuid> {
        let edge = self
            .edges
            .get(&signal.edge)
            .ok_or(TopologyError::EdgeNotFound(signal.edge))?;
        if signal.distance < 0.0 || signal.distance > edge.length + f64::EPSILON {
            return Err(TopologyError::SignalOutOfRange {
                signal: signal.uuid,
                edge: edge.uuid,
                distance: signal.distance,
            });
        }
        let id = signal.uuid;
        self.signals.insert(id, signal);
        Ok(id)
    }

    pub fn node(&self, id: Uuid) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, id: Uuid) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn signal(&self, id: Uuid) -> Option<&Signal> {
        self.signals.get(&id)
    }

    /// All edges touching a node
    pub fn edges_at(&self, node_id: Uuid) -> Vec<&Edge> {
        self.edges.values().filter(|e| e.connects(node_id)).collect()
    }

    pub fn degree(&self, node_id: Uuid) -> usize {
        self.edges_at(node_id).len()
    }

    /// Signals on an edge, ordered by distance from `node_a`
    pub fn signals_on(&self, edge_id: Uuid) -> Vec<&Signal> {
        let mut signals: Vec<_> = self.signals.values().filter(|s| s.edge == edge_id).collect();
        signals.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        signals
    }

    /// Full geometry of an edge from `node_a` to `node_b`
    pub fn edge_geometry(&self, edge: &Edge) -> Vec<GeoPoint> {
        let mut points = Vec::with_capacity(edge.intermediate.len() + 2);
        if let Some(a) = self.nodes.get(&edge.node_a) {
            points.push(a.geo);
        }
        points.extend(edge.intermediate.iter().copied());
        if let Some(b) = self.nodes.get(&edge.node_b) {
            points.push(b.geo);
        }
        points
    }

    /// Re-derive node kinds from their degree
    pub fn classify_nodes(&mut self) {
        let degrees: Vec<(Uuid, usize)> = self.nodes.keys().map(|id| (*id, self.degree(*id))).collect();
        for (id, degree) in degrees {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.kind = match degree {
                    0 | 1 => NodeKind::End,
                    2 => NodeKind::Plain,
                    _ => NodeKind::Point,
                };
            }
        }
    }

    /// Drop every signal that does not delimit routes
    pub fn retain_main_signals(&mut self) -> usize {
        let before = self.signals.len();
        self.signals.retain(|_, s| s.kind.is_main());
        before - self.signals.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn summary(&self) -> TopologySummary {
        TopologySummary {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            signal_count: self.signal_count(),
            route_count: self.routes.len(),
            total_length: self.edges.values().map(|e| e.length).sum(),
        }
    }
}

/// Counts used in logs and responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TopologySummary {
    pub node_count: usize,
    pub edge_count: usize,
    pub signal_count: usize,
    pub route_count: usize,
    pub total_length: f64,
}
