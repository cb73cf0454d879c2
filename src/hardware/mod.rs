//! Hardware Module
//!
//! Allocation of pooled rack assets to composed nodes, recovery of failed
//! nodes as their assets are rediscovered, and the inventory both work on.

pub mod allocation;
pub mod recovery;
pub mod registry;

pub use allocation::*;
pub use recovery::*;
pub use registry::*;
