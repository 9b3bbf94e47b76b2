pub mod adapters;
pub mod config;
pub mod conversion;
pub mod file_area;
pub mod overpass;
pub mod planpro;
pub mod routes;
pub mod schematic;
pub mod topology_cache;
pub mod validation;
