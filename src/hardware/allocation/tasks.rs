//! Assembly Tasks
//!
//! Deferred work emitted by `allocate`. Tasks are plain values returned to the
//! caller and executed only after the allocation transaction committed.

use crate::domain::{Id, RequestedVlan};
use serde::{Deserialize, Serialize};

/// Work left for an external executor once resources are reserved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AssemblyTask {
    /// Create VLANs on the switch port facing a physical NIC
    #[serde(rename_all = "camelCase")]
    VlanCreation {
        computer_system: Id,
        ethernet_interface: Id,
        vlans: Vec<RequestedVlan>,
    },

    /// Carve a new logical drive from an LVG and expose it over iSCSI
    #[serde(rename_all = "camelCase")]
    NewRemoteDrive {
        lvg: Id,
        master: Id,
        master_source_uri: Option<String>,
        capacity_gib: f64,
        target_iqn: Option<String>,
    },
}

impl AssemblyTask {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            AssemblyTask::VlanCreation { .. } => "vlan-creation",
            AssemblyTask::NewRemoteDrive { .. } => "new-remote-drive",
        }
    }
}

impl std::fmt::Display for AssemblyTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssemblyTask::VlanCreation {
                ethernet_interface,
                vlans,
                ..
            } => write!(
                f,
                "{} (interface {}, {} vlans)",
                self.name(),
                ethernet_interface,
                vlans.len()
            ),
            AssemblyTask::NewRemoteDrive {
                lvg, capacity_gib, ..
            } => write!(f, "{} (lvg {}, {} GiB)", self.name(), lvg, capacity_gib),
        }
    }
}
