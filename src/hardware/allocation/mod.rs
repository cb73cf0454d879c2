//! Allocation Module
//!
//! Resource selection and reservation for composed nodes: remote drive and
//! computer system strategies, the finders and matchers behind them, and the
//! deferred tasks they emit.

pub mod computer_system;
pub mod ethernet;
pub mod finder;
pub mod matcher;
pub mod remote_drive;
pub mod tasks;
pub mod violations;

pub use computer_system::*;
pub use ethernet::*;
pub use finder::*;
pub use matcher::*;
pub use remote_drive::*;
pub use tasks::*;
pub use violations::*;
