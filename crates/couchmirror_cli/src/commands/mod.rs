//! CLI command implementations.

pub mod assets;
pub mod manifest;
pub mod world;
