//! Computer System Allocation
//!
//! First-fit selection of a free computer system for a composed node and the
//! binding that reserves it.

use super::ethernet::EthernetInterfaceAllocator;
use super::tasks::AssemblyTask;
use crate::domain::{ComposedNode, ComputerSystem, ComputerSystemMatcher, RequestedNode};
use crate::error::{Error, Result};
use crate::hardware::registry::Transaction;
use std::sync::Arc;
use tracing::{debug, info};

/// Picks and binds the computer system of a composed node
pub struct ComputerSystemAllocationStrategy {
    request: RequestedNode,
    matcher: Arc<dyn ComputerSystemMatcher>,
    ethernet: EthernetInterfaceAllocator,
    system: Option<ComputerSystem>,
    tasks: Vec<AssemblyTask>,
}

impl ComputerSystemAllocationStrategy {
    pub fn new(
        request: RequestedNode,
        matcher: Arc<dyn ComputerSystemMatcher>,
        ethernet: EthernetInterfaceAllocator,
    ) -> Self {
        Self {
            request,
            matcher,
            ethernet,
            system: None,
            tasks: Vec::new(),
        }
    }

    /// Choose the first free system the matcher accepts.
    ///
    /// Having no candidate left is a hard failure rather than a violation.
    pub fn find_resources(&mut self, tx: &mut Transaction<'_>) -> Result<&ComputerSystem> {
        let candidates: Vec<ComputerSystem> = tx
            .not_allocated_computer_systems()
            .into_iter()
            .filter(ComputerSystem::can_be_allocated)
            .collect();
        debug!(
            "{} free computer systems considered for {}",
            candidates.len(),
            self.request.name
        );

        let chosen = self
            .matcher
            .matches(&self.request, candidates)
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoMatchingComputerSystem {
                node_name: self.request.name.clone(),
            })?;

        Ok(self.system.insert(chosen))
    }

    /// Bind the chosen system and its members to `node`
    pub fn allocate(&mut self, tx: &mut Transaction<'_>, node: &mut ComposedNode) -> Result<()> {
        let mut system = self.system.clone().ok_or_else(|| Error::InvalidStrategyState {
            strategy: "computer-system".to_string(),
            reason: "allocate called before find_resources".to_string(),
        })?;

        let tasks = self
            .ethernet
            .allocate(&system, &self.request.ethernet_interfaces)?;

        if node.description.is_none() {
            node.description = system.description.clone();
        }
        node.system_type = Some(system.system_type);
        node.status = system.status;
        node.computer_system = Some(system.id);
        node.ethernet_interfaces
            .extend(system.ethernet_interfaces.iter().map(|i| i.id));
        node.local_drives.extend(system.local_drives.iter().map(|d| d.id));
        node.simple_storages
            .extend(system.simple_storages.iter().map(|s| s.id));

        let service_uuid = tx.service_uuid(system.service);
        node.record_compute_identity(service_uuid, system.uuid);

        system.allocated = true;
        system.composed_node = Some(node.id);

        info!(
            "Bound computer system {} ({}) to composed node {} with {} deferred tasks",
            system.id,
            system.name,
            node.id,
            tasks.len()
        );
        tx.put(system);
        self.tasks.extend(tasks);
        Ok(())
    }

    pub fn tasks(&self) -> &[AssemblyTask] {
        &self.tasks
    }
}
