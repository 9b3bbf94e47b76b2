use std::path::Path;

use roxmltree::{Document, Node as XmlNode};
use topology::{CoordinateSystem, Edge, GeoPoint, Node, Signal, Topology};
use uuid::Uuid;

use super::{
    LOCAL, PlanProVersion, ROOT_ELEMENT,
    writer::{
        parse_node_kind, parse_signal_direction, parse_signal_function, parse_signal_kind,
        parse_signal_side,
    },
};
use crate::services::adapters::{AdapterError, AdapterResult, PlanImporter};

/// Reads PlanPro documents into a topology
#[derive(Debug, Default, Clone)]
pub struct PlanProReader;

impl PlanImporter for PlanProReader {
    fn import(&self, path: &Path, version: PlanProVersion) -> AdapterResult<Topology> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_str(&text, version)
    }
}

fn child<'a, 'input>(node: XmlNode<'a, 'input>, name: &str) -> Option<XmlNode<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

fn children<'a, 'input>(
    node: XmlNode<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = XmlNode<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

/// Text of `<name><Wert>...</Wert></name>` below `node`
fn wert<'a>(node: XmlNode<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name)
        .and_then(|c| child(c, "Wert"))
        .and_then(|w| w.text())
        .map(str::trim)
}

fn required<'a>(node: XmlNode<'a, '_>, element: &str, name: &str) -> AdapterResult<&'a str> {
    wert(node, name).ok_or_else(|| AdapterError::parse(format!("{element} without {name}")))
}

fn parse_uuid(raw: &str) -> AdapterResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| AdapterError::parse(format!("invalid identity '{raw}': {e}")))
}

fn parse_number(raw: &str, what: &str) -> AdapterResult<f64> {
    raw.parse::<f64>()
        .map_err(|_| AdapterError::parse(format!("{what} '{raw}' is not a number")))
}

fn parse_point(node: XmlNode<'_, '_>) -> AdapterResult<GeoPoint> {
    let x = parse_number(required(node, "GEO_Punkt", "GK_X")?, "GK_X")?;
    let y = parse_number(required(node, "GEO_Punkt", "GK_Y")?, "GK_Y")?;
    Ok(GeoPoint::new(x, y))
}

/// Follow a chain of child elements
fn descend<'a, 'input>(node: XmlNode<'a, 'input>, path: &[&str]) -> Option<XmlNode<'a, 'input>> {
    path.iter().try_fold(node, |current, name| child(current, name))
}

impl PlanProReader {
    pub fn parse_str(text: &str, version: PlanProVersion) -> AdapterResult<Topology> {
        let document = Document::parse(text).map_err(|e| AdapterError::parse(e.to_string()))?;
        let root = document.root_element();

        if root.tag_name().name() != ROOT_ELEMENT {
            return Err(AdapterError::schema(format!(
                "root element is {}, expected {ROOT_ELEMENT}",
                root.tag_name().name()
            )));
        }
        let namespace = root.tag_name().namespace().unwrap_or_default();
        if namespace != version.namespace() {
            let found = PlanProVersion::from_namespace(namespace)
                .map(|v| v.as_str().to_string())
                .unwrap_or_else(|| format!("namespace '{namespace}'"));
            return Err(AdapterError::schema(format!(
                "document is PlanPro {found}, expected {}",
                version.as_str()
            )));
        }

        let group = descend(
            root,
            &[
                "LST_Planung",
                "Objektmanagement",
                "LST_Planung_Projekt",
                "LST_Planung_Gruppe",
            ],
        )
        .ok_or_else(|| AdapterError::schema("document has no LST_Planung_Gruppe"))?;
        let container = descend(group, &["LST_Zustand_Ziel", "Container"])
            .ok_or_else(|| AdapterError::schema("planning group has no target state container"))?;

        let crs = match child(group, "Planung_E_Allg").and_then(|g| wert(g, "Koordinatensystem")) {
            Some(LOCAL) => CoordinateSystem::Local,
            _ => CoordinateSystem::Wgs84,
        };
        let mut topology = Topology::new(crs);

        for element in children(container, "TOP_Knoten") {
            let uuid = parse_uuid(required(element, "TOP_Knoten", "Identitaet")?)?;
            let point = child(element, "GEO_Punkt")
                .ok_or_else(|| AdapterError::parse(format!("TOP_Knoten {uuid} without GEO_Punkt")))?;
            let name = wert(element, "Bezeichnung").unwrap_or_default();
            let mut node = Node::new(name, parse_point(point)?)
                .with_uuid(uuid)
                .with_kind(parse_node_kind(wert(element, "Knotenart").unwrap_or_default()));
            if let Some(osm_id) = wert(element, "Fremd_ID").and_then(|v| v.parse().ok()) {
                node = node.with_osm_id(osm_id);
            }
            topology.add_node(node);
        }

        for element in children(container, "TOP_Kante") {
            let uuid = parse_uuid(required(element, "TOP_Kante", "Identitaet")?)?;
            let node_a = parse_uuid(required(element, "TOP_Kante", "ID_TOP_Knoten_A")?)?;
            let node_b = parse_uuid(required(element, "TOP_Kante", "ID_TOP_Knoten_B")?)?;

            let mut edge = Edge::new(node_a, node_b).with_uuid(uuid);
            if let Some(geometry) = child(element, "GEO_Kante") {
                let points = children(geometry, "GEO_Punkt")
                    .map(parse_point)
                    .collect::<AdapterResult<Vec<_>>>()?;
                edge = edge.with_intermediate(points);
            }
            if let Some(length) = wert(element, "TOP_Laenge") {
                edge = edge.with_length(parse_number(length, "TOP_Laenge")?);
            }
            if let Some(track_type) = wert(element, "Gleisart").and_then(|v| v.parse().ok()) {
                edge = edge.with_track_type(track_type);
            }
            topology.add_edge(edge)?;
        }

        for element in children(container, "Signal") {
            let uuid = parse_uuid(required(element, "Signal", "Identitaet")?)?;
            let placement = child(element, "Punkt_Objekt_TOP_Kante").ok_or_else(|| {
                AdapterError::parse(format!("Signal {uuid} without Punkt_Objekt_TOP_Kante"))
            })?;
            let edge = parse_uuid(required(placement, "Signal", "ID_TOP_Kante")?)?;
            let distance = parse_number(required(placement, "Signal", "Abstand")?, "Abstand")?;
            let direction_raw = required(placement, "Signal", "Wirkrichtung")?;
            let direction = parse_signal_direction(direction_raw).ok_or_else(|| {
                AdapterError::parse(format!("Signal {uuid} has unknown Wirkrichtung '{direction_raw}'"))
            })?;

            let name = wert(element, "Bezeichnung_Tabelle").unwrap_or_default();
            let mut signal = Signal::new(name, edge, distance, direction)
                .with_uuid(uuid)
                .with_side(parse_signal_side(
                    wert(placement, "Seitliche_Lage").unwrap_or_default(),
                ));
            if let Some(real) = child(element, "Signal_Real") {
                signal = signal
                    .with_kind(parse_signal_kind(wert(real, "Signal_Art").unwrap_or_default()))
                    .with_function(parse_signal_function(
                        wert(real, "Signal_Funktion").unwrap_or_default(),
                    ));
            }
            topology.add_signal(signal)?;
        }

        tracing::debug!(
            "Read PlanPro {} document: {} nodes, {} edges, {} signals",
            version.as_str(),
            topology.node_count(),
            topology.edge_count(),
            topology.signal_count()
        );
        Ok(topology)
    }
}
