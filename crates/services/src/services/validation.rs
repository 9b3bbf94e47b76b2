//! Request validation shared by the HTTP handlers and the orchestrator.
//!
//! Everything here runs before any collaborator is invoked or any file is
//! written.

use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utils::filename::{has_extension, sanitize_filename};

use super::planpro::PlanProVersion;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No location specified")]
    NoLocation,
    #[error("No mode specified")]
    NoMode,
    #[error("No option types specified")]
    NoOptionTypes,
    #[error("Invalid polygon: {0}")]
    InvalidPolygon(String),
    #[error("No file provided")]
    NoFile,
    #[error("Invalid file extension, expected .ppxml")]
    InvalidExtension,
    #[error("Unsupported PlanPro version: {0}")]
    UnsupportedVersion(String),
    #[error("Invalid signal type selection: {0}")]
    InvalidSignalSelection(String),
    #[error("Unknown output mode: {0}")]
    UnknownOutputMode(String),
    #[error("Unknown export format: {0}")]
    UnknownExportFormat(String),
    #[error("Unknown coordinate representation: {0}")]
    UnknownCoordinateRepresentation(String),
    #[error("No import id specified")]
    NoImportId,
    #[error("Invalid import id: {0}")]
    InvalidImportId(String),
}

lazy_static! {
    static ref COORDINATE_PAIR: Regex = Regex::new(
        r"[\(\[]\s*([-+]?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)\s*,\s*([-+]?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)\s*[\)\]]"
    )
    .expect("coordinate pattern is valid");
}

/// An ordered list of `(lat, lon)` pairs describing the import area
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon(Vec<(f64, f64)>);

impl Polygon {
    /// Parse the textual list form `[(lat, lon), (lat, lon), ...]`.
    /// Square brackets are accepted for the pairs as well.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| ValidationError::InvalidPolygon("expected a bracketed list".into()))?;

        let mut points = Vec::new();
        let mut consumed = 0;
        for captures in COORDINATE_PAIR.captures_iter(inner) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            if !is_separator(&inner[consumed..whole.start()]) {
                return Err(ValidationError::InvalidPolygon(format!(
                    "unexpected input near '{}'",
                    inner[consumed..whole.start()].trim()
                )));
            }
            consumed = whole.end();

            let lat = parse_coordinate(&captures[1])?;
            let lon = parse_coordinate(&captures[2])?;
            points.push((lat, lon));
        }
        if !is_separator(&inner[consumed..]) {
            return Err(ValidationError::InvalidPolygon(format!(
                "unexpected input near '{}'",
                inner[consumed..].trim()
            )));
        }

        if points.is_empty() {
            return Err(ValidationError::NoLocation);
        }
        Ok(Self(points))
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.0
    }

    /// Flatten to the space separated form the geometry importer expects:
    /// `[(0,0),(0,1)]` becomes `"0 0 0 1"`
    pub fn to_coordinate_string(&self) -> String {
        self.0
            .iter()
            .flat_map(|(lat, lon)| [lat.to_string(), lon.to_string()])
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn is_separator(text: &str) -> bool {
    text.chars().all(|c| c.is_whitespace() || c == ',')
}

fn parse_coordinate(raw: &str) -> Result<f64, ValidationError> {
    raw.parse::<f64>()
        .map_err(|_| ValidationError::InvalidPolygon(format!("'{raw}' is not a number")))
}

/// What the orchestrator produces from an imported topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    PlanExport,
    Routes,
    Schematic,
}

impl FromStr for OutputMode {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "planpro" | "plan_export" | "plan-export" => Ok(Self::PlanExport),
            "routes" => Ok(Self::Routes),
            "schematic" => Ok(Self::Schematic),
            _ => Err(ValidationError::UnknownOutputMode(raw.to_string())),
        }
    }
}

/// Formats offered by the cached-export download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Ppxml,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Ppxml => "ppxml",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Ppxml => "application/xml",
            ExportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ppxml" => Ok(Self::Ppxml),
            "json" => Ok(Self::Json),
            _ => Err(ValidationError::UnknownExportFormat(raw.to_string())),
        }
    }
}

/// A validated geometry conversion request
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRequest {
    pub polygon: Polygon,
    pub mode: OutputMode,
    pub option_types: Vec<String>,
}

/// Validate the geometry request parameters.
///
/// Checks run in a fixed order: location, then mode, then option types.
/// A polygon that is empty or cannot be parsed counts as a missing location.
/// Only the PlanPro export and route modes are offered for geometry
/// imports; anything else counts as a missing mode.
pub fn validate_geometry_request(
    location: Option<&str>,
    mode: Option<&str>,
    option_types: &[String],
) -> Result<GeometryRequest, ValidationError> {
    let location = location
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or(ValidationError::NoLocation)?;
    let polygon = Polygon::parse(location).map_err(|e| {
        tracing::debug!("Rejecting polygon {:?}: {}", location, e);
        ValidationError::NoLocation
    })?;

    let mode = match mode.map(str::trim).filter(|m| !m.is_empty()) {
        Some(raw) => match raw.parse::<OutputMode>() {
            Ok(mode @ (OutputMode::PlanExport | OutputMode::Routes)) => mode,
            _ => return Err(ValidationError::NoMode),
        },
        None => return Err(ValidationError::NoMode),
    };

    let option_types: Vec<String> = option_types
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if option_types.is_empty() {
        return Err(ValidationError::NoOptionTypes);
    }

    Ok(GeometryRequest {
        polygon,
        mode,
        option_types,
    })
}

/// A validated PlanPro upload
#[derive(Debug, Clone, PartialEq)]
pub struct PlanUpload {
    /// Sanitized file name, safe to join onto a directory
    pub filename: String,
    pub version: PlanProVersion,
    pub signal_filter: bool,
}

/// Interpret the signal type selection sent with an upload.
/// `true` keeps only main signals.
pub fn parse_signal_filter(raw: Option<&str>) -> Result<bool, ValidationError> {
    let Some(raw) = raw else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" | "ks" => Ok(true),
        "" | "false" | "0" | "off" | "no" | "all" => Ok(false),
        _ => Err(ValidationError::InvalidSignalSelection(raw.to_string())),
    }
}

pub fn validate_plan_upload(
    filename: Option<&str>,
    version: Option<&str>,
    signal_types: Option<&str>,
) -> Result<PlanUpload, ValidationError> {
    let raw_name = filename
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or(ValidationError::NoFile)?;
    if !has_extension(raw_name, "ppxml") {
        return Err(ValidationError::InvalidExtension);
    }
    let filename = sanitize_filename(raw_name).ok_or(ValidationError::InvalidExtension)?;
    if !has_extension(&filename, "ppxml") {
        return Err(ValidationError::InvalidExtension);
    }

    let version_raw = version.unwrap_or_default();
    let version = PlanProVersion::parse(version_raw)
        .ok_or_else(|| ValidationError::UnsupportedVersion(version_raw.to_string()))?;

    let signal_filter = parse_signal_filter(signal_types)?;

    Ok(PlanUpload {
        filename,
        version,
        signal_filter,
    })
}
