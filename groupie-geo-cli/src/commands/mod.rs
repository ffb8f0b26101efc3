//! CLI command implementations.

pub mod cache;
pub mod common;
pub mod map;
pub mod resolve;
pub mod tile;
