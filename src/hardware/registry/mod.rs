//! Registry Module
//!
//! Versioned, transactional inventory of discovered assets and composed nodes.

pub mod inventory;

pub use inventory::*;
