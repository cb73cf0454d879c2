//! Control Plane Module
//!
//! The node composer that drives allocation, post-commit assembly, recovery
//! and disassembly of composed nodes.

pub mod composer;

pub use composer::*;
