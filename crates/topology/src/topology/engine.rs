//! Topology engine - geometry and traversal helpers

use uuid::Uuid;

use super::graph::{CoordinateSystem, GeoPoint, Topology};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Continuations turning by this much or more are reversals, not track
const MAX_TURN_DEGREES: f64 = 90.0;

/// A planar direction (east, north), not necessarily normalized
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heading {
    pub east: f64,
    pub north: f64,
}

impl Heading {
    pub fn reversed(&self) -> Self {
        Self {
            east: -self.east,
            north: -self.north,
        }
    }

    /// Compass-free angle in degrees, counter-clockwise from east
    pub fn degrees(&self) -> f64 {
        self.north.atan2(self.east).to_degrees()
    }

    /// Unsigned angle between two headings in degrees (0..=180)
    pub fn angle_to(&self, other: &Heading) -> f64 {
        let dot = self.east * other.east + self.north * other.north;
        let norm = (self.east.hypot(self.north)) * (other.east.hypot(other.north));
        if norm == 0.0 {
            return 0.0;
        }
        (dot / norm).clamp(-1.0, 1.0).acos().to_degrees()
    }
}

/// Engine for topology geometry and traversal
pub struct TopologyEngine;

impl TopologyEngine {
    /// Distance between two points in metres (or planar units for local
    /// coordinates)
    pub fn distance(a: GeoPoint, b: GeoPoint, crs: CoordinateSystem) -> f64 {
        match crs {
            CoordinateSystem::Local => (b.x - a.x).hypot(b.y - a.y),
            CoordinateSystem::Wgs84 => {
                let (lat1, lat2) = (a.x.to_radians(), b.x.to_radians());
                let dlat = lat2 - lat1;
                let dlon = (b.y - a.y).to_radians();
                let h = (dlat / 2.0).sin().powi(2)
                    + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
                2.0 * EARTH_RADIUS_M * h.sqrt().asin()
            }
        }
    }

    pub fn polyline_length(points: &[GeoPoint], crs: CoordinateSystem) -> f64 {
        points
            .windows(2)
            .map(|w| Self::distance(w[0], w[1], crs))
            .sum()
    }

    /// Planar offset from `a` to `b` in metres (east, north)
    pub fn planar_delta(a: GeoPoint, b: GeoPoint, crs: CoordinateSystem) -> Heading {
        match crs {
            CoordinateSystem::Local => Heading {
                east: b.x - a.x,
                north: b.y - a.y,
            },
            CoordinateSystem::Wgs84 => {
                let mean_lat = ((a.x + b.x) / 2.0).to_radians();
                Heading {
                    east: (b.y - a.y).to_radians() * EARTH_RADIUS_M * mean_lat.cos(),
                    north: (b.x - a.x).to_radians() * EARTH_RADIUS_M,
                }
            }
        }
    }

    /// Point and heading at `distance` along a polyline. Distances beyond
    /// the ends are clamped.
    pub fn point_along(
        points: &[GeoPoint],
        distance: f64,
        crs: CoordinateSystem,
    ) -> Option<(GeoPoint, Heading)> {
        let first = *points.first()?;
        if points.len() == 1 {
            return Some((first, Heading { east: 1.0, north: 0.0 }));
        }

        let mut remaining = distance.max(0.0);
        for w in points.windows(2) {
            let segment = Self::distance(w[0], w[1], crs);
            let heading = Self::planar_delta(w[0], w[1], crs);
            if remaining <= segment {
                let t = if segment > 0.0 { remaining / segment } else { 0.0 };
                let point = GeoPoint::new(
                    w[0].x + (w[1].x - w[0].x) * t,
                    w[0].y + (w[1].y - w[0].y) * t,
                );
                return Some((point, heading));
            }
            remaining -= segment;
        }

        let n = points.len();
        Some((
            points[n - 1],
            Self::planar_delta(points[n - 2], points[n - 1], crs),
        ))
    }

    /// Heading when leaving `node_id` along `edge_id`
    pub fn departure_heading(topology: &Topology, edge_id: Uuid, node_id: Uuid) -> Option<Heading> {
        let edge = topology.edge(edge_id)?;
        let mut geometry = topology.edge_geometry(edge);
        if edge.node_b == node_id {
            geometry.reverse();
        } else if edge.node_a != node_id {
            return None;
        }
        let from = *geometry.first()?;
        let to = geometry
            .iter()
            .skip(1)
            .find(|p| **p != from)
            .copied()?;
        Some(Self::planar_delta(from, to, topology.crs))
    }

    /// Edges a movement arriving at `node_id` over `arriving_edge` can
    /// continue on, paired with the node at their far end
    pub fn continuations(topology: &Topology, node_id: Uuid, arriving_edge: Uuid) -> Vec<(Uuid, Uuid)> {
        let arrival = match Self::departure_heading(topology, arriving_edge, node_id) {
            Some(h) => h.reversed(),
            None => return Vec::new(),
        };

        topology
            .edges_at(node_id)
            .into_iter()
            .filter(|e| e.uuid != arriving_edge)
            .filter_map(|e| {
                let departure = Self::departure_heading(topology, e.uuid, node_id)?;
                if arrival.angle_to(&departure) < MAX_TURN_DEGREES {
                    Some((e.uuid, e.other_node(node_id)?))
                } else {
                    None
                }
            })
            .collect()
    }
}
