//! Domain Module
//!
//! Core domain types and collaborator traits.

pub mod model;
pub mod ports;
pub mod request;

pub use model::*;
pub use ports::*;
pub use request::*;
