//! PlanPro documents: the built-in plan importer and exporter.
//!
//! Only the subset of PlanPro that carries the track topology is handled:
//! `TOP_Knoten`, `TOP_Kante` (with their `GEO_Punkt` geometry) and
//! `Signal` objects inside the target-state container of a planning
//! group, plus the creator metadata of the planning unit.

use serde::{Deserialize, Serialize};

mod reader;
mod writer;

pub use reader::PlanProReader;
pub use writer::PlanProWriter;

pub(crate) const ROOT_ELEMENT: &str = "PlanPro_Schnittstelle";
pub(crate) const NAMESPACE_PREFIX: &str = "nsPlanPro";
pub(crate) const WGS84: &str = "WGS84";
pub(crate) const LOCAL: &str = "LOCAL";

/// Supported PlanPro schema versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlanProVersion {
    #[serde(rename = "1.9")]
    V1_9,
    #[default]
    #[serde(rename = "1.10")]
    V1_10,
}

impl PlanProVersion {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().trim_start_matches(['v', 'V']) {
            "1.9" | "1.9.0" => Some(Self::V1_9),
            "1.10" | "1.10.0" => Some(Self::V1_10),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanProVersion::V1_9 => "1.9",
            PlanProVersion::V1_10 => "1.10",
        }
    }

    pub fn namespace(&self) -> &'static str {
        match self {
            PlanProVersion::V1_9 => "http://www.plan-pro.org/modell/PlanPro/1.9.0",
            PlanProVersion::V1_10 => "http://www.plan-pro.org/modell/PlanPro/1.10.0",
        }
    }

    pub fn from_namespace(namespace: &str) -> Option<Self> {
        [Self::V1_9, Self::V1_10]
            .into_iter()
            .find(|v| v.namespace() == namespace)
    }
}
