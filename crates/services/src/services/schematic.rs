use topology::{LayoutOptions, OverviewLayout, SchematicGraph, Topology};

use super::adapters::{AdapterResult, RenderOptions, SchematicRenderer};

/// Renders the browser overview graph
#[derive(Debug, Clone, Default)]
pub struct OverviewRenderer;

impl SchematicRenderer for OverviewRenderer {
    fn render(&self, topology: &Topology, options: &RenderOptions) -> AdapterResult<SchematicGraph> {
        let layout = LayoutOptions {
            signal_filter: options.signal_filter,
            scale: options.scale,
        };
        Ok(OverviewLayout::render(topology, &layout))
    }
}
