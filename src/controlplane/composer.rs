//! Node Composer - The allocation orchestrator
//!
//! Drives a node request through every allocation strategy inside one
//! inventory transaction:
//! - validate the request (remote drive strategy, node name)
//! - find resources (remote drive, then computer system)
//! - allocate and mark the node Assembled
//!
//! Any violation or fault drops the transaction, so nothing is reserved
//! unless everything is. Deferred assembly tasks are handed back to the
//! caller and run through [`NodeComposer::assemble`] after commit.

use crate::domain::{
    AssemblyTaskExecutor, ComposedNode, ComputerSystem, ComputerSystemMatcher,
    EthernetInterfacesAllocationMapper, Id, RemoteTarget, RequestedNode,
};
use crate::error::{Error, Result};
use crate::hardware::allocation::{
    AssemblyTask, BasicComputerSystemMatcher, ComputerSystemAllocationStrategy,
    EthernetInterfaceAllocator, RemoteDriveAllocationStrategyFactory,
    SpeedAwareEthernetInterfacesMapper, Violations,
};
use crate::hardware::recovery::{ComposedNodeUpdater, DiscoveredAsset, RecoveryReport};
use crate::hardware::registry::{Inventory, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// =============================================================================
// Compose Outcome
// =============================================================================

/// Result of a committed allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposeOutcome {
    pub node_id: Id,
    pub node_name: String,
    /// Deferred work in emission order
    pub tasks: Vec<AssemblyTask>,
    pub composed_at: DateTime<Utc>,
}

// =============================================================================
// Node Composer
// =============================================================================

/// Allocates, assembles, recovers and releases composed nodes
pub struct NodeComposer {
    inventory: Arc<Inventory>,
    matcher: Arc<dyn ComputerSystemMatcher>,
    mapper: Arc<dyn EthernetInterfacesAllocationMapper>,
    updater: ComposedNodeUpdater,
}

impl NodeComposer {
    /// Create a composer with the stock matchers
    pub fn new(inventory: Arc<Inventory>) -> Arc<Self> {
        let mapper: Arc<dyn EthernetInterfacesAllocationMapper> =
            Arc::new(SpeedAwareEthernetInterfacesMapper);
        let matcher = Arc::new(BasicComputerSystemMatcher::new(mapper.clone()));
        Self::with_matchers(inventory, matcher, mapper)
    }

    /// Create a composer with custom matchers
    pub fn with_matchers(
        inventory: Arc<Inventory>,
        matcher: Arc<dyn ComputerSystemMatcher>,
        mapper: Arc<dyn EthernetInterfacesAllocationMapper>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inventory,
            matcher,
            mapper,
            updater: ComposedNodeUpdater::new(),
        })
    }

    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inventory
    }

    /// Look up a composed node
    pub fn node(&self, id: Id) -> Option<ComposedNode> {
        self.inventory.get(id)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate resources for `request` and commit the new node.
    ///
    /// Violations come back as [`Error::AllocationRequestProcessing`]. Lost
    /// races rerun the whole allocation, including the resource search.
    pub fn compose(&self, request: &RequestedNode) -> Result<ComposeOutcome> {
        info!("Composing node {}", request.name);

        let outcome = self
            .inventory
            .transaction(|tx| self.compose_in(tx, request))
            .map_err(|err| {
                match &err {
                    Error::AllocationRequestProcessing(v) | Error::RemoteDriveValidation(v) => {
                        warn!("Request for node {} rejected with {} violations", request.name, v.len());
                    }
                    _ => error!("Composing node {} failed: {}", request.name, err),
                }
                err
            })?;

        info!(
            "Composed node {} ({}) with {} deferred tasks",
            outcome.node_id,
            outcome.node_name,
            outcome.tasks.len()
        );
        Ok(outcome)
    }

    fn compose_in(&self, tx: &mut Transaction<'_>, request: &RequestedNode) -> Result<ComposeOutcome> {
        let mut remote_drive = RemoteDriveAllocationStrategyFactory::create(request)?;
        let mut computer_system = ComputerSystemAllocationStrategy::new(
            request.clone(),
            self.matcher.clone(),
            EthernetInterfaceAllocator::new(self.mapper.clone()),
        );

        let mut violations = Violations::new();
        if request.name.trim().is_empty() {
            violations.add_missing_property_violation("name");
        }
        violations.extend(remote_drive.validate(tx));
        violations.into_result()?;

        remote_drive.find_resources(tx)?.into_result()?;
        let chosen = computer_system.find_resources(tx)?;
        debug!(
            "Using {} strategy and computer system {} for {}",
            remote_drive.name(),
            chosen.id,
            request.name
        );

        let mut node = ComposedNode::new(tx.allocate_id(), request.name.clone());
        node.description = request.description.clone();

        computer_system.allocate(tx, &mut node)?;
        remote_drive.allocate(tx, &mut node)?;
        node.mark_assembled();

        let tasks: Vec<AssemblyTask> = computer_system
            .tasks()
            .iter()
            .chain(remote_drive.tasks())
            .cloned()
            .collect();

        let outcome = ComposeOutcome {
            node_id: node.id,
            node_name: node.name.clone(),
            tasks,
            composed_at: node.created_at,
        };
        tx.put(node);
        Ok(outcome)
    }

    // =========================================================================
    // Assembly
    // =========================================================================

    /// Run the deferred tasks of a committed allocation in emission order.
    ///
    /// Stops at the first failing task. Returns how many tasks ran.
    pub async fn assemble(
        &self,
        outcome: &ComposeOutcome,
        executor: &dyn AssemblyTaskExecutor,
    ) -> Result<usize> {
        for (done, task) in outcome.tasks.iter().enumerate() {
            debug!("Executing {} for node {}", task, outcome.node_id);
            if let Err(err) = executor.execute(outcome.node_id, task).await {
                error!(
                    "Assembly of node {} stopped at task {} of {}: {}",
                    outcome.node_id,
                    done + 1,
                    outcome.tasks.len(),
                    err
                );
                return Err(Error::AssemblyTaskFailed {
                    task: task.to_string(),
                    reason: err.to_string(),
                });
            }
        }

        info!(
            "Assembled node {} with {} tasks",
            outcome.node_id,
            outcome.tasks.len()
        );
        Ok(outcome.tasks.len())
    }

    // =========================================================================
    // Recovery
    // =========================================================================

    /// Reconcile composed nodes with a batch of rediscovered assets
    pub fn recover(&self, assets: &[DiscoveredAsset]) -> Result<RecoveryReport> {
        let report = self
            .inventory
            .transaction(|tx| Ok(self.updater.update_related_composed_nodes(tx, assets)))?;

        if !report.recovered.is_empty() || !report.disabled.is_empty() {
            info!(
                "Reconciliation recovered {} and disabled {} composed nodes",
                report.recovered.len(),
                report.disabled.len()
            );
        }
        Ok(report)
    }

    // =========================================================================
    // Disassembly
    // =========================================================================

    /// Release a node's computer system and remote targets and delete it
    pub fn disassemble(&self, node_id: Id) -> Result<()> {
        self.inventory.transaction(|tx| {
            let node: ComposedNode = tx.get(node_id)?;

            if let Some(id) = node.computer_system {
                if let Some(mut system) = tx.find::<ComputerSystem>(id) {
                    if system.composed_node == Some(node_id) {
                        system.allocated = false;
                        system.composed_node = None;
                        tx.put(system);
                    }
                }
            }

            for id in &node.remote_targets {
                if let Some(mut target) = tx.find::<RemoteTarget>(*id) {
                    if target.composed_node == Some(node_id) {
                        target.allocated = false;
                        target.composed_node = None;
                        tx.put(target);
                    }
                }
            }

            tx.remove::<ComposedNode>(node_id);
            Ok(())
        })?;

        info!("Disassembled composed node {}", node_id);
        Ok(())
    }
}
