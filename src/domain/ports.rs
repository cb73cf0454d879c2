//! Domain Ports - Collaborator traits for the composer
//!
//! These traits define the boundaries between the allocation core and the
//! systems around it. The crate ships default adapters for the two matchers;
//! task execution is always supplied by the caller.

use super::model::{ComputerSystem, EthernetInterface, Id};
use super::request::{RequestedEthernetInterface, RequestedNode};
use crate::error::Result;
use crate::hardware::allocation::AssemblyTask;
use async_trait::async_trait;
use indexmap::IndexMap;

// =============================================================================
// Computer System Matcher Port
// =============================================================================

/// Filters candidate computer systems against a request
///
/// Only filtering is expected. Callers take the first survivor, so the
/// returned order must follow the candidate order.
pub trait ComputerSystemMatcher: Send + Sync {
    fn matches(&self, request: &RequestedNode, candidates: Vec<ComputerSystem>) -> Vec<ComputerSystem>;
}

// =============================================================================
// Ethernet Interfaces Allocation Mapper Port
// =============================================================================

/// Pairs requested NICs with physical NICs
pub trait EthernetInterfacesAllocationMapper: Send + Sync {
    /// Map available interface id to the request it serves.
    ///
    /// Returns `None` when no total, conflict-free pairing exists.
    fn map(
        &self,
        available: &[EthernetInterface],
        requested: &[RequestedEthernetInterface],
    ) -> Option<IndexMap<Id, RequestedEthernetInterface>>;
}

// =============================================================================
// Assembly Task Executor Port
// =============================================================================

/// Runs deferred assembly work once the allocation transaction committed
#[async_trait]
pub trait AssemblyTaskExecutor: Send + Sync {
    async fn execute(&self, node: Id, task: &AssemblyTask) -> Result<()>;
}
