//! Recovery Module
//!
//! Reconciles composed nodes with freshly rediscovered assets.

pub mod updater;

pub use updater::*;
