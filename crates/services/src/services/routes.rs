use topology::{InvariantChecker, RoutePlanner, RoutingOptions, Topology};

use super::adapters::{AdapterResult, RouteDeriver};

/// Derives routes between consecutive main signals
#[derive(Debug, Clone, Default)]
pub struct SignalRouteDeriver {
    options: RoutingOptions,
}

impl SignalRouteDeriver {
    pub fn new(max_edges: usize) -> Self {
        Self {
            options: RoutingOptions { max_edges },
        }
    }
}

impl RouteDeriver for SignalRouteDeriver {
    fn derive(&self, topology: &mut Topology) -> AdapterResult<()> {
        RoutePlanner::derive_routes(topology, &self.options);
        InvariantChecker::new().ensure(topology)?;
        Ok(())
    }
}
