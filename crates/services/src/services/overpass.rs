//! Geometry import from OpenStreetMap through the Overpass API.
//!
//! The query selects every way whose `railway` tag matches one of the
//! requested types inside the polygon, plus the nodes it references. The
//! response is turned into a topology: way end points and nodes shared by
//! several ways become topology nodes, the way pieces between them become
//! edges, and `railway=signal` nodes become signals on their edge.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use topology::{
    CoordinateSystem, Edge, GeoPoint, Node, Signal, SignalDirection, SignalFunction, SignalKind,
    SignalSide, Topology, TopologyEngine,
};
use uuid::Uuid;

use super::adapters::{AdapterError, AdapterResult, GeometryImporter};

const CLIENT_NAME: &str = concat!("topology-converter/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OverpassElement {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    Way {
        id: i64,
        #[serde(default)]
        nodes: Vec<i64>,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone)]
pub struct OverpassImporter {
    client: reqwest::Client,
    endpoint: String,
    query_timeout_secs: u64,
}

impl OverpassImporter {
    pub fn new(endpoint: impl Into<String>, query_timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            query_timeout_secs,
        }
    }

    /// Overpass QL for the given flattened polygon and railway types
    pub fn build_query(polygon: &str, option_types: &[String], timeout_secs: u64) -> String {
        let types = option_types
            .iter()
            .map(|t| t.replace(['"', '\\', '|', '(', ')', '^', '$'], ""))
            .collect::<Vec<_>>()
            .join("|");
        format!(
            "[out:json][timeout:{timeout_secs}];(way[\"railway\"~\"^({types})$\"](poly:\"{polygon}\");>;);out body;"
        )
    }
}

#[async_trait]
impl GeometryImporter for OverpassImporter {
    async fn import(&self, polygon: &str, option_types: &[String]) -> AdapterResult<Topology> {
        let query = Self::build_query(polygon, option_types, self.query_timeout_secs);
        tracing::debug!("Querying Overpass at {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header(USER_AGENT, CLIENT_NAME)
            .form(&[("data", query.as_str())])
            .send()
            .await
            .map_err(|e| AdapterError::network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::network(format!(
                "Overpass returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: OverpassResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::parse(format!("invalid Overpass response: {e}")))?;
        build_topology(&parsed)
    }
}

struct OsmNode<'a> {
    geo: GeoPoint,
    tags: &'a HashMap<String, String>,
}

/// Convert an Overpass response into a topology
pub fn build_topology(response: &OverpassResponse) -> AdapterResult<Topology> {
    let mut osm_nodes: HashMap<i64, OsmNode<'_>> = HashMap::new();
    let mut ways: Vec<(i64, Vec<i64>, &HashMap<String, String>)> = Vec::new();

    for element in &response.elements {
        match element {
            OverpassElement::Node { id, lat, lon, tags } => {
                osm_nodes.insert(
                    *id,
                    OsmNode {
                        geo: GeoPoint::new(*lat, *lon),
                        tags,
                    },
                );
            }
            OverpassElement::Way { id, nodes, tags } => ways.push((*id, nodes.clone(), tags)),
            OverpassElement::Other => {}
        }
    }

    // drop references to nodes the response did not include
    for (way_id, refs, _) in ways.iter_mut() {
        let before = refs.len();
        refs.retain(|r| osm_nodes.contains_key(r));
        if refs.len() != before {
            tracing::debug!("Way {} references {} unknown nodes", way_id, before - refs.len());
        }
    }
    ways.retain(|(_, refs, _)| refs.len() >= 2);

    let mut usage: HashMap<i64, usize> = HashMap::new();
    let mut junctions: HashSet<i64> = HashSet::new();
    for (_, refs, _) in &ways {
        for r in refs {
            *usage.entry(*r).or_default() += 1;
        }
        junctions.extend([refs[0], refs[refs.len() - 1]]);
    }
    junctions.extend(usage.iter().filter(|(_, count)| **count > 1).map(|(id, _)| *id));

    let mut topology = Topology::new(CoordinateSystem::Wgs84);
    let mut node_ids: HashMap<i64, Uuid> = HashMap::new();
    let mut placed_signals: HashSet<i64> = HashSet::new();

    for (_, refs, tags) in &ways {
        let category = track_type(tags.get("railway").map(String::as_str));
        let mut start = 0;

        for end in 1..refs.len() {
            if !junctions.contains(&refs[end]) {
                continue;
            }
            let segment = &refs[start..=end];
            let node_a = topology_node(&mut topology, &mut node_ids, &osm_nodes, segment[0])?;
            let node_b =
                topology_node(&mut topology, &mut node_ids, &osm_nodes, segment[segment.len() - 1])?;

            let geometry: Vec<GeoPoint> = segment
                .iter()
                .filter_map(|r| osm_nodes.get(r).map(|n| n.geo))
                .collect();
            let intermediate = geometry[1..geometry.len() - 1].to_vec();
            let edge_id = topology.add_edge(
                Edge::new(node_a, node_b)
                    .with_intermediate(intermediate)
                    .with_track_type(category),
            )?;
            let length = topology.edge(edge_id).map(|e| e.length).unwrap_or_default();

            let mut travelled: f64 = 0.0;
            for (index, r) in segment.iter().enumerate() {
                if index > 0 {
                    travelled +=
                        TopologyEngine::distance(geometry[index - 1], geometry[index], topology.crs);
                }
                let Some(osm) = osm_nodes.get(r) else {
                    continue;
                };
                if osm.tags.get("railway").map(String::as_str) != Some("signal")
                    || !placed_signals.insert(*r)
                {
                    continue;
                }
                topology.add_signal(osm_signal(*r, osm.tags, edge_id, travelled.min(length)))?;
            }

            start = end;
        }
    }

    topology.classify_nodes();
    tracing::debug!(
        "Built topology from Overpass: {} nodes, {} edges, {} signals",
        topology.node_count(),
        topology.edge_count(),
        topology.signal_count()
    );
    Ok(topology)
}

fn topology_node(
    topology: &mut Topology,
    node_ids: &mut HashMap<i64, Uuid>,
    osm_nodes: &HashMap<i64, OsmNode<'_>>,
    osm_id: i64,
) -> AdapterResult<Uuid> {
    if let Some(id) = node_ids.get(&osm_id) {
        return Ok(*id);
    }
    let osm = osm_nodes
        .get(&osm_id)
        .ok_or_else(|| AdapterError::parse(format!("unknown node {osm_id}")))?;
    let id = topology.add_node(Node::new(osm_id.to_string(), osm.geo).with_osm_id(osm_id));
    node_ids.insert(osm_id, id);
    Ok(id)
}

/// Numeric track category used by the schematic renderer for styling
fn track_type(railway: Option<&str>) -> u8 {
    match railway {
        Some("rail") => 1,
        Some("light_rail") => 2,
        Some("subway") => 3,
        Some("tram") => 4,
        Some("narrow_gauge") => 5,
        _ => 6,
    }
}

fn osm_signal(osm_id: i64, tags: &HashMap<String, String>, edge: Uuid, distance: f64) -> Signal {
    let tag = |key: &str| tags.get(key).map(String::as_str);

    let name = tag("ref")
        .or_else(|| tag("name"))
        .map(str::to_string)
        .unwrap_or_else(|| osm_id.to_string());

    let direction = match tag("railway:signal:direction") {
        Some("backward") => SignalDirection::Against,
        _ => SignalDirection::In,
    };

    let (kind, function_key) = if tag("railway:signal:combined").is_some() {
        (SignalKind::Main, "railway:signal:combined:function")
    } else if tag("railway:signal:main").is_some() {
        (SignalKind::Main, "railway:signal:main:function")
    } else if tag("railway:signal:distant").is_some() {
        (SignalKind::Distant, "railway:signal:distant:function")
    } else if tag("railway:signal:minor").is_some() || tag("railway:signal:shunting").is_some() {
        (SignalKind::Shunting, "railway:signal:minor:function")
    } else {
        (SignalKind::Other, "railway:signal:function")
    };

    let function = match tag(function_key) {
        Some("entry") => SignalFunction::Entry,
        Some("exit") => SignalFunction::Exit,
        Some("block") => SignalFunction::Block,
        _ => SignalFunction::Other,
    };

    let side = match tag("railway:signal:position") {
        Some("left") => SignalSide::Left,
        _ => SignalSide::Right,
    };

    Signal::new(name, edge, distance, direction)
        .with_kind(kind)
        .with_function(function)
        .with_side(side)
}
