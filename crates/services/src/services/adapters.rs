//! Collaborator seams of the conversion service.
//!
//! Each external capability (geometry import, PlanPro import/export, route
//! derivation, schematic rendering) sits behind a trait so the orchestrator
//! can be exercised with substitutes. Every failure surfaces as an
//! [`AdapterError`]; nothing is signalled through process exit codes.

use std::{fmt, path::Path};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use topology::{SchematicGraph, Topology, TopologyError};

use super::planpro::PlanProVersion;

/// Why an adapter gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The upstream service could not be reached or answered with an error
    Network,
    /// Input could not be read
    Parse,
    /// Input was readable but not the expected document
    Schema,
    /// The resulting topology breaks a reference rule
    Invariant,
    /// Reading or writing a file failed
    Io,
    /// The adapter did not answer in time
    Timeout,
    /// Anything else, including adapter panics
    Internal,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Network => "network",
            FailureReason::Parse => "parse",
            FailureReason::Schema => "schema",
            FailureReason::Invariant => "invariant",
            FailureReason::Io => "io",
            FailureReason::Timeout => "timeout",
            FailureReason::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("{reason} failure: {detail}")]
pub struct AdapterError {
    pub reason: FailureReason,
    pub detail: String,
}

impl AdapterError {
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(FailureReason::Network, detail)
    }

    pub fn parse(detail: impl Into<String>) -> Self {
        Self::new(FailureReason::Parse, detail)
    }

    pub fn schema(detail: impl Into<String>) -> Self {
        Self::new(FailureReason::Schema, detail)
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        Self::new(FailureReason::Io, err.to_string())
    }
}

impl From<TopologyError> for AdapterError {
    fn from(err: TopologyError) -> Self {
        Self::new(FailureReason::Invariant, err.to_string())
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Coordinates written into an exported PlanPro document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateRepresentation {
    #[default]
    Wgs84,
    Local,
}

impl CoordinateRepresentation {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "wgs84" => Some(Self::Wgs84),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

/// Metadata and target format of a PlanPro export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    pub author: String,
    pub organisation: String,
    pub coordinate_representation: CoordinateRepresentation,
    pub version: PlanProVersion,
    /// Download name without extension
    pub filename: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            author: String::new(),
            organisation: String::new(),
            coordinate_representation: CoordinateRepresentation::Wgs84,
            version: PlanProVersion::default(),
            filename: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Keep only main signals
    pub signal_filter: bool,
    pub scale: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            signal_filter: false,
            scale: 1.0,
        }
    }
}

/// Imports railway tracks inside a polygon from a geographic data source
#[async_trait]
pub trait GeometryImporter: Send + Sync {
    /// `polygon` is the flattened "lat lon lat lon ..." coordinate string
    async fn import(&self, polygon: &str, option_types: &[String]) -> AdapterResult<Topology>;
}

/// Reads a PlanPro document from disk
pub trait PlanImporter: Send + Sync {
    fn import(&self, path: &Path, version: PlanProVersion) -> AdapterResult<Topology>;
}

/// Serializes a topology as a PlanPro document
pub trait PlanExporter: Send + Sync {
    fn export(&self, topology: &Topology, options: &ExportOptions) -> AdapterResult<String>;
}

/// Adds signalling routes to a topology in place
pub trait RouteDeriver: Send + Sync {
    fn derive(&self, topology: &mut Topology) -> AdapterResult<()>;
}

/// Produces the overview graph drawn by the browser
pub trait SchematicRenderer: Send + Sync {
    fn render(&self, topology: &Topology, options: &RenderOptions) -> AdapterResult<SchematicGraph>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_reason() {
        let err = AdapterError::schema("root element is not PlanPro");
        assert_eq!(err.to_string(), "schema failure: root element is not PlanPro");
    }

    #[test]
    fn test_topology_errors_are_invariant_failures() {
        let err: AdapterError = TopologyError::InvariantViolation("dangling edge".into()).into();
        assert_eq!(err.reason, FailureReason::Invariant);
    }

    #[test]
    fn test_coordinate_representation_parse() {
        assert_eq!(CoordinateRepresentation::parse("WGS84"), Some(CoordinateRepresentation::Wgs84));
        assert_eq!(CoordinateRepresentation::parse(" local "), Some(CoordinateRepresentation::Local));
        assert_eq!(CoordinateRepresentation::parse("utm"), None);
    }
}
