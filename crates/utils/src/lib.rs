pub mod assets;
pub mod filename;
pub mod response;
