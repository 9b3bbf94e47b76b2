use chrono::Utc;
use topology::{
    CoordinateSystem, GeoPoint, NodeKind, SignalDirection, SignalFunction, SignalKind, SignalSide,
    Topology, TopologyEngine,
};

use super::{LOCAL, NAMESPACE_PREFIX, ROOT_ELEMENT, WGS84};
use crate::services::adapters::{
    AdapterError, AdapterResult, CoordinateRepresentation, ExportOptions, PlanExporter,
};

const TOOL_NAME: &str = "topology-converter";

/// Writes topologies as PlanPro documents
#[derive(Debug, Default, Clone)]
pub struct PlanProWriter;

impl PlanExporter for PlanProWriter {
    fn export(&self, topology: &Topology, options: &ExportOptions) -> AdapterResult<String> {
        let (topology, coordinate_system) =
            match (options.coordinate_representation, topology.crs) {
                (CoordinateRepresentation::Wgs84, CoordinateSystem::Wgs84) => {
                    (topology.clone(), WGS84)
                }
                (CoordinateRepresentation::Local, CoordinateSystem::Local) => {
                    (topology.clone(), LOCAL)
                }
                (CoordinateRepresentation::Local, CoordinateSystem::Wgs84) => {
                    (project_to_local(topology), LOCAL)
                }
                (CoordinateRepresentation::Wgs84, CoordinateSystem::Local) => {
                    return Err(AdapterError::schema(
                        "topology has local coordinates only, cannot export as WGS84",
                    ));
                }
            };

        let document = write_document(&topology, options, coordinate_system);
        tracing::debug!(
            "Wrote PlanPro {} document: {} nodes, {} edges, {} signals",
            options.version.as_str(),
            topology.node_count(),
            topology.edge_count(),
            topology.signal_count()
        );
        Ok(document)
    }
}

/// Equirectangular projection around the first node, in metres
fn project_to_local(topology: &Topology) -> Topology {
    let mut projected = topology.clone();
    projected.crs = CoordinateSystem::Local;
    let Some(origin) = topology.nodes.values().next().map(|n| n.geo) else {
        return projected;
    };
    let project = |p: GeoPoint| {
        let delta = TopologyEngine::planar_delta(origin, p, CoordinateSystem::Wgs84);
        GeoPoint::new(delta.east, delta.north)
    };

    for node in projected.nodes.values_mut() {
        node.geo = project(node.geo);
    }
    for edge in projected.edges.values_mut() {
        for point in edge.intermediate.iter_mut() {
            *point = project(*point);
        }
    }
    projected
}

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn push_indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn open(out: &mut String, level: usize, name: &str) {
    push_indent(out, level);
    out.push('<');
    out.push_str(name);
    out.push_str(">\n");
}

fn close(out: &mut String, level: usize, name: &str) {
    push_indent(out, level);
    out.push_str("</");
    out.push_str(name);
    out.push_str(">\n");
}

/// `<name><Wert>value</Wert></name>`
fn push_wert(out: &mut String, level: usize, name: &str, value: &str) {
    push_indent(out, level);
    out.push('<');
    out.push_str(name);
    out.push_str("><Wert>");
    out.push_str(&escape_text(value));
    out.push_str("</Wert></");
    out.push_str(name);
    out.push_str(">\n");
}

fn push_point(out: &mut String, level: usize, point: GeoPoint) {
    open(out, level, "GEO_Punkt");
    push_wert(out, level + 1, "GK_X", &point.x.to_string());
    push_wert(out, level + 1, "GK_Y", &point.y.to_string());
    close(out, level, "GEO_Punkt");
}

fn node_kind(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Point => "Weiche",
        NodeKind::End => "Streckenende",
        NodeKind::Plain => "Verbindung",
    }
}

fn signal_kind(kind: SignalKind) -> &'static str {
    match kind {
        SignalKind::Main => "Hauptsignal",
        SignalKind::Distant => "Vorsignal",
        SignalKind::MultiSection => "Mehrabschnittssignal",
        SignalKind::Shunting => "Sperrsignal",
        SignalKind::Other => "andere",
    }
}

fn signal_function(function: SignalFunction) -> &'static str {
    match function {
        SignalFunction::Entry => "Einfahr_Signal",
        SignalFunction::Exit => "Ausfahr_Signal",
        SignalFunction::Block => "Block_Signal",
        SignalFunction::Other => "andere",
    }
}

fn signal_direction(direction: SignalDirection) -> &'static str {
    match direction {
        SignalDirection::In => "in",
        SignalDirection::Against => "gegen",
    }
}

fn signal_side(side: SignalSide) -> &'static str {
    match side {
        SignalSide::Left => "links",
        SignalSide::Right => "rechts",
    }
}

fn write_document(topology: &Topology, options: &ExportOptions, coordinate_system: &str) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<{NAMESPACE_PREFIX}:{ROOT_ELEMENT} xmlns:{NAMESPACE_PREFIX}=\"{}\">\n",
        escape_text(options.version.namespace())
    ));

    open(&mut out, 1, "PlanPro_Schnittstelle_Allg");
    push_wert(&mut out, 2, "Erzeugung_Zeitstempel", &Utc::now().to_rfc3339());
    push_wert(&mut out, 2, "Werkzeug_Name", TOOL_NAME);
    close(&mut out, 1, "PlanPro_Schnittstelle_Allg");

    open(&mut out, 1, "LST_Planung");
    open(&mut out, 2, "Objektmanagement");
    open(&mut out, 3, "LST_Planung_Projekt");
    if let Some(name) = &options.filename {
        open(&mut out, 4, "Planung_P_Allg");
        push_wert(&mut out, 5, "Projektname", name);
        close(&mut out, 4, "Planung_P_Allg");
    }
    open(&mut out, 4, "LST_Planung_Gruppe");
    open(&mut out, 5, "Planung_E_Allg");
    push_wert(&mut out, 6, "Planung_E_Ersteller", &options.author);
    push_wert(&mut out, 6, "Planung_E_Organisation", &options.organisation);
    push_wert(&mut out, 6, "Koordinatensystem", coordinate_system);
    close(&mut out, 5, "Planung_E_Allg");
    open(&mut out, 5, "LST_Zustand_Ziel");
    open(&mut out, 6, "Container");
    write_container(&mut out, 7, topology);
    close(&mut out, 6, "Container");
    close(&mut out, 5, "LST_Zustand_Ziel");
    close(&mut out, 4, "LST_Planung_Gruppe");
    close(&mut out, 3, "LST_Planung_Projekt");
    close(&mut out, 2, "Objektmanagement");
    close(&mut out, 1, "LST_Planung");

    out.push_str(&format!("</{NAMESPACE_PREFIX}:{ROOT_ELEMENT}>\n"));
    out
}

fn write_container(out: &mut String, level: usize, topology: &Topology) {
    for node in topology.nodes.values() {
        open(out, level, "TOP_Knoten");
        push_wert(out, level + 1, "Identitaet", &node.uuid.to_string());
        push_wert(out, level + 1, "Bezeichnung", &node.name);
        push_wert(out, level + 1, "Knotenart", node_kind(node.kind));
        if let Some(osm_id) = node.osm_id {
            push_wert(out, level + 1, "Fremd_ID", &osm_id.to_string());
        }
        push_point(out, level + 1, node.geo);
        close(out, level, "TOP_Knoten");
    }

    for edge in topology.edges.values() {
        open(out, level, "TOP_Kante");
        push_wert(out, level + 1, "Identitaet", &edge.uuid.to_string());
        push_wert(out, level + 1, "ID_TOP_Knoten_A", &edge.node_a.to_string());
        push_wert(out, level + 1, "ID_TOP_Knoten_B", &edge.node_b.to_string());
        push_wert(out, level + 1, "TOP_Laenge", &edge.length.to_string());
        if let Some(track_type) = edge.track_type {
            push_wert(out, level + 1, "Gleisart", &track_type.to_string());
        }
        if !edge.intermediate.is_empty() {
            open(out, level + 1, "GEO_Kante");
            for point in &edge.intermediate {
                push_point(out, level + 2, *point);
            }
            close(out, level + 1, "GEO_Kante");
        }
        close(out, level, "TOP_Kante");
    }

    for signal in topology.signals.values() {
        open(out, level, "Signal");
        push_wert(out, level + 1, "Identitaet", &signal.uuid.to_string());
        push_wert(out, level + 1, "Bezeichnung_Tabelle", &signal.name);
        open(out, level + 1, "Punkt_Objekt_TOP_Kante");
        push_wert(out, level + 2, "ID_TOP_Kante", &signal.edge.to_string());
        push_wert(out, level + 2, "Abstand", &signal.distance.to_string());
        push_wert(out, level + 2, "Wirkrichtung", signal_direction(signal.direction));
        push_wert(out, level + 2, "Seitliche_Lage", signal_side(signal.side));
        close(out, level + 1, "Punkt_Objekt_TOP_Kante");
        open(out, level + 1, "Signal_Real");
        push_wert(out, level + 2, "Signal_Art", signal_kind(signal.kind));
        push_wert(out, level + 2, "Signal_Funktion", signal_function(signal.function));
        close(out, level + 1, "Signal_Real");
        close(out, level, "Signal");
    }
}

pub(super) fn parse_node_kind(raw: &str) -> NodeKind {
    match raw {
        "Weiche" => NodeKind::Point,
        "Streckenende" => NodeKind::End,
        _ => NodeKind::Plain,
    }
}

pub(super) fn parse_signal_kind(raw: &str) -> SignalKind {
    match raw {
        "Hauptsignal" => SignalKind::Main,
        "Vorsignal" => SignalKind::Distant,
        "Mehrabschnittssignal" => SignalKind::MultiSection,
        "Sperrsignal" => SignalKind::Shunting,
        _ => SignalKind::Other,
    }
}

pub(super) fn parse_signal_function(raw: &str) -> SignalFunction {
    match raw {
        "Einfahr_Signal" => SignalFunction::Entry,
        "Ausfahr_Signal" => SignalFunction::Exit,
        "Block_Signal" => SignalFunction::Block,
        _ => SignalFunction::Other,
    }
}

pub(super) fn parse_signal_direction(raw: &str) -> Option<SignalDirection> {
    match raw {
        "in" => Some(SignalDirection::In),
        "gegen" => Some(SignalDirection::Against),
        _ => None,
    }
}

pub(super) fn parse_signal_side(raw: &str) -> SignalSide {
    match raw {
        "links" => SignalSide::Left,
        _ => SignalSide::Right,
    }
}
