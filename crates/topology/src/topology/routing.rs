//! Route derivation - signal-to-signal routes through the topology

use uuid::Uuid;

use super::engine::TopologyEngine;
use super::graph::{Route, Signal, SignalDirection, Topology};

/// Limits for the route search
#[derive(Debug, Clone)]
pub struct RoutingOptions {
    /// Maximum number of edges a single route may span
    pub max_edges: usize,
}

impl Default for RoutingOptions {
    fn default() -> Self {
        Self { max_edges: 32 }
    }
}

/// Derives routes between consecutive main signals
pub struct RoutePlanner;

impl RoutePlanner {
    /// Replace the topology's routes with freshly derived ones
    pub fn derive_routes<'a>(topology: &'a mut Topology, options: &RoutingOptions) -> &'a [Route] {
        let routes = Self::find_routes(topology, options);
        tracing::debug!("Derived {} routes from {} signals", routes.len(), topology.signal_count());
        topology.routes = routes;
        &topology.routes
    }

    /// Every route starting at a main signal and ending at the next main
    /// signal effective in the same direction of travel
    pub fn find_routes(topology: &Topology, options: &RoutingOptions) -> Vec<Route> {
        let mut routes = Vec::new();

        for start in topology.signals.values().filter(|s| s.kind.is_main()) {
            let mut path = vec![start.edge];
            Self::walk(
                topology,
                options,
                start,
                start.edge,
                start.direction,
                Some(start.distance),
                0.0,
                &mut path,
                &mut routes,
            );
        }

        routes
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        topology: &Topology,
        options: &RoutingOptions,
        start: &Signal,
        edge_id: Uuid,
        direction: SignalDirection,
        entry: Option<f64>,
        travelled: f64,
        path: &mut Vec<Uuid>,
        routes: &mut Vec<Route>,
    ) {
        let Some(edge) = topology.edge(edge_id) else {
            return;
        };
        let position = entry.unwrap_or(match direction {
            SignalDirection::In => 0.0,
            SignalDirection::Against => edge.length,
        });

        if let Some(end) = Self::next_signal(topology, edge_id, direction, position, entry.is_some()) {
            routes.push(Route {
                uuid: Uuid::new_v4(),
                start_signal: start.uuid,
                end_signal: end.uuid,
                edges: path.clone(),
                length: travelled + (end.distance - position).abs(),
            });
            return;
        }

        if path.len() >= options.max_edges {
            return;
        }

        let (node, remaining) = match direction {
            SignalDirection::In => (edge.node_b, edge.length - position),
            SignalDirection::Against => (edge.node_a, position),
        };

        for (next_edge, _) in TopologyEngine::continuations(topology, node, edge_id) {
            if path.contains(&next_edge) {
                continue;
            }
            let Some(next) = topology.edge(next_edge) else {
                continue;
            };
            let next_direction = if next.node_a == node {
                SignalDirection::In
            } else {
                SignalDirection::Against
            };

            path.push(next_edge);
            Self::walk(
                topology,
                options,
                start,
                next_edge,
                next_direction,
                None,
                travelled + remaining,
                path,
                routes,
            );
            path.pop();
        }
    }

    /// Nearest main signal ahead on an edge. On the start edge the signal
    /// must lie strictly ahead of `position`.
    fn next_signal<'a>(
        topology: &'a Topology,
        edge_id: Uuid,
        direction: SignalDirection,
        position: f64,
        strictly_ahead: bool,
    ) -> Option<&'a Signal> {
        let ahead = |s: &&Signal| match (direction, strictly_ahead) {
            (SignalDirection::In, true) => s.distance > position,
            (SignalDirection::Against, true) => s.distance < position,
            (_, false) => true,
        };

        let candidates = topology
            .signals_on(edge_id)
            .into_iter()
            .filter(|s| s.kind.is_main() && s.direction == direction)
            .filter(ahead);

        match direction {
            SignalDirection::In => candidates.min_by(|a, b| a.distance.total_cmp(&b.distance)),
            SignalDirection::Against => candidates.max_by(|a, b| a.distance.total_cmp(&b.distance)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::graph::{CoordinateSystem, Edge, GeoPoint, Node, SignalKind};

    struct Line {
        topology: Topology,
        first: Uuid,
        second: Uuid,
    }

    /// a --(100 m)-- b --(100 m)-- c
    fn line() -> Line {
        let mut topology = Topology::new(CoordinateSystem::Local);
        let a = topology.add_node(Node::new("a", GeoPoint::new(0.0, 0.0)));
        let b = topology.add_node(Node::new("b", GeoPoint::new(100.0, 0.0)));
        let c = topology.add_node(Node::new("c", GeoPoint::new(200.0, 0.0)));
        let first = topology.add_edge(Edge::new(a, b)).unwrap();
        let second = topology.add_edge(Edge::new(b, c)).unwrap();
        Line {
            topology,
            first,
            second,
        }
    }

    #[test]
    fn test_route_between_consecutive_signals() {
        let Line {
            mut topology,
            first,
            second,
        } = line();
        let s1 = topology
            .add_signal(Signal::new("S1", first, 10.0, SignalDirection::In))
            .unwrap();
        let s2 = topology
            .add_signal(Signal::new("S2", second, 30.0, SignalDirection::In))
            .unwrap();
        topology
            .add_signal(Signal::new("S3", first, 40.0, SignalDirection::Against))
            .unwrap();

        let routes = RoutePlanner::derive_routes(&mut topology, &RoutingOptions::default());

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].start_signal, s1);
        assert_eq!(routes[0].end_signal, s2);
        assert_eq!(routes[0].edges, vec![first, second]);
        assert!((routes[0].length - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_distant_signals_do_not_end_routes() {
        let Line {
            mut topology,
            first,
            second,
        } = line();
        topology
            .add_signal(Signal::new("S1", first, 10.0, SignalDirection::In))
            .unwrap();
        topology
            .add_signal(
                Signal::new("s2", first, 60.0, SignalDirection::In).with_kind(SignalKind::Distant),
            )
            .unwrap();
        let s3 = topology
            .add_signal(Signal::new("S3", second, 90.0, SignalDirection::In))
            .unwrap();

        let routes = RoutePlanner::find_routes(&topology, &RoutingOptions::default());
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].end_signal, s3);
    }

    #[test]
    fn test_against_direction_routes() {
        let Line {
            mut topology,
            first,
            second,
        } = line();
        let s1 = topology
            .add_signal(Signal::new("S1", second, 50.0, SignalDirection::Against))
            .unwrap();
        let s2 = topology
            .add_signal(Signal::new("S2", first, 20.0, SignalDirection::Against))
            .unwrap();

        let routes = RoutePlanner::find_routes(&topology, &RoutingOptions::default());
        assert_eq!(routes.len(), 1);
        assert_eq!((routes[0].start_signal, routes[0].end_signal), (s1, s2));
        assert!((routes[0].length - 130.0).abs() < 1e-9);
    }

    #[test]
    fn test_derivation_replaces_previous_routes() {
        let Line {
            mut topology,
            first,
            second,
        } = line();
        topology
            .add_signal(Signal::new("S1", first, 10.0, SignalDirection::In))
            .unwrap();
        topology
            .add_signal(Signal::new("S2", second, 30.0, SignalDirection::In))
            .unwrap();

        RoutePlanner::derive_routes(&mut topology, &RoutingOptions::default());
        RoutePlanner::derive_routes(&mut topology, &RoutingOptions::default());
        assert_eq!(topology.routes.len(), 1);
    }
}
