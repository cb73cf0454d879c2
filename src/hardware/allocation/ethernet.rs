//! Ethernet Interface Allocation
//!
//! Maps requested NICs onto a computer system's physical NICs and decides
//! which pairings need VLANs provisioned on the neighbouring switch.

use super::tasks::AssemblyTask;
use crate::domain::{ComputerSystem, EthernetInterfacesAllocationMapper, RequestedEthernetInterface};
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Turns a NIC mapping into deferred VLAN tasks
#[derive(Clone)]
pub struct EthernetInterfaceAllocator {
    mapper: Arc<dyn EthernetInterfacesAllocationMapper>,
}

impl EthernetInterfaceAllocator {
    pub fn new(mapper: Arc<dyn EthernetInterfacesAllocationMapper>) -> Self {
        Self { mapper }
    }

    /// Map `requested` onto the system's interfaces and emit one VLAN task for
    /// every pair that asks for VLANs on a switch-attached NIC.
    ///
    /// Pairs without VLANs, or on NICs with no neighbor port, are reserved by
    /// the mapping alone and produce nothing.
    pub fn allocate(
        &self,
        system: &ComputerSystem,
        requested: &[RequestedEthernetInterface],
    ) -> Result<Vec<AssemblyTask>> {
        let available = &system.ethernet_interfaces;
        let mapping = self.mapper.map(available, requested).ok_or_else(|| {
            Error::EthernetMappingFailed {
                computer_system: system.id.to_string(),
                reason: format!(
                    "{} requested, {} available",
                    requested.len(),
                    available.len()
                ),
            }
        })?;

        let mut tasks = Vec::new();
        for (interface_id, request) in &mapping {
            let Some(interface) = available.iter().find(|i| i.id == *interface_id) else {
                return Err(Error::EthernetMappingFailed {
                    computer_system: system.id.to_string(),
                    reason: format!("mapper returned unknown interface {}", interface_id),
                });
            };

            if request.has_vlans() && interface.has_neighbor_port() {
                debug!(
                    "Interface {} of system {} needs {} vlans",
                    interface.id,
                    system.id,
                    request.requested_vlans().len()
                );
                tasks.push(AssemblyTask::VlanCreation {
                    computer_system: system.id,
                    ethernet_interface: interface.id,
                    vlans: request.requested_vlans().to_vec(),
                });
            }
        }

        Ok(tasks)
    }
}
