//! Node Composer - Resource Allocation & Recovery Reconciliation
//!
//! Builds composed nodes (logical servers) out of pooled rack assets and keeps
//! them in step with discovery.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           Node Composer                             │
//! │        compose → assemble (post-commit) │ recover │ disassemble     │
//! ├───────────────────────────────┬─────────────────────────────────────┤
//! │        Allocation             │            Recovery                 │
//! │  ┌─────────────────────────┐  │  ┌───────────────────────────────┐  │
//! │  │ Remote drive strategies │  │  │   Composed node updater       │  │
//! │  │ (none/existing/new)     │  │  │   (identity-guarded rebind)   │  │
//! │  ├─────────────────────────┤  │  └───────────────────────────────┘  │
//! │  │ Computer system + NICs  │  │                                     │
//! │  └─────────────────────────┘  │                                     │
//! ├───────────────────────────────┴─────────────────────────────────────┤
//! │             Transactional inventory (optimistic, versioned)         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: The node composer
//! - [`hardware`]: Allocation strategies, recovery and the inventory
//! - [`domain`]: Domain model, requests and collaborator traits
//! - [`config`]: Composer configuration
//! - [`error`]: Error types and handling

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod hardware;

// Re-export commonly used types
pub use config::{ComposerConfig, TransactionRetryConfig};

pub use controlplane::{ComposeOutcome, NodeComposer};

pub use domain::{
    AssemblyTaskExecutor, ComposedNode, ComposedNodeState, ComputerSystem, ComputerSystemMatcher,
    EthernetInterfacesAllocationMapper, Id, RemoteTarget, RequestedNode, Status,
};

pub use error::{Error, ErrorAction, Result};

pub use hardware::{
    AssemblyTask, ComposedNodeUpdater, DiscoveredAsset, Inventory, InventorySnapshot,
    RecoveryReport, RemoteDriveAllocationStrategy, RemoteDriveAllocationStrategyFactory,
    Transaction, Violations,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
