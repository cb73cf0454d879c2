//! Allocation Requests
//!
//! Declarative description of the node a client wants composed.

use super::model::Id;
use serde::{Deserialize, Serialize};

/// A VLAN to configure on a requested NIC
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedVlan {
    pub vlan_id: u32,
    #[serde(default)]
    pub tagged: bool,
}

/// A NIC the composed node should expose
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedEthernetInterface {
    /// Minimum link speed
    #[serde(default)]
    pub speed_mbps: Option<u32>,
    #[serde(default)]
    pub primary_vlan: Option<u32>,
    #[serde(default)]
    pub vlans: Option<Vec<RequestedVlan>>,
}

impl RequestedEthernetInterface {
    /// Requested VLANs, empty when none were given
    pub fn requested_vlans(&self) -> &[RequestedVlan] {
        self.vlans.as_deref().unwrap_or_default()
    }

    pub fn has_vlans(&self) -> bool {
        !self.requested_vlans().is_empty()
    }
}

/// How a new remote drive is derived from its master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ReplicationMethod {
    Clone,
    Snapshot,
}

/// Master drive a new remote drive is carved from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedMasterDrive {
    #[serde(rename = "type")]
    pub method: ReplicationMethod,
    /// Logical drive to replicate
    pub resource: Id,
}

/// A remote (iSCSI) drive the composed node should boot from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedRemoteDrive {
    #[serde(default, rename = "capacityGiB")]
    pub capacity_gib: Option<f64>,
    /// IQN of the target to attach, or to create for a new drive
    #[serde(default, rename = "iSCSIAddress")]
    pub iscsi_address: Option<String>,
    #[serde(default)]
    pub master: Option<RequestedMasterDrive>,
}

impl RequestedRemoteDrive {
    /// Attach to a pre-existing target rather than carve a new drive
    pub fn refers_to_existing_target(&self) -> bool {
        self.master.is_none()
    }
}

/// Declarative ask for a composed node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedNode {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ethernet_interfaces: Vec<RequestedEthernetInterface>,
    #[serde(default)]
    pub remote_drives: Vec<RequestedRemoteDrive>,
}

impl RequestedNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_ethernet_interface(mut self, interface: RequestedEthernetInterface) -> Self {
        self.ethernet_interfaces.push(interface);
        self
    }

    pub fn with_remote_drive(mut self, drive: RequestedRemoteDrive) -> Self {
        self.remote_drives.push(drive);
        self
    }
}
