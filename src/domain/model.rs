//! Domain Model
//!
//! Physical assets discovered in the rack and the composed nodes built out of
//! them. Entities reference each other by [`Id`] so they can live in the
//! transactional inventory as independent, versioned rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Inventory-local identifier of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub u64);

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// =============================================================================
// Status
// =============================================================================

/// Redfish resource state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum State {
    Enabled,
    Disabled,
    StandbyOffline,
    StandbySpare,
    InTest,
    Starting,
    Absent,
    UnavailableOffline,
    Deferring,
    Quiesced,
    Updating,
}

/// Redfish resource health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Health {
    Ok,
    Warning,
    Critical,
}

/// Status triple reported for every discoverable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub state: State,
    #[serde(default)]
    pub health: Option<Health>,
    #[serde(default)]
    pub health_rollup: Option<Health>,
}

impl Status {
    pub const fn new(state: State, health: Option<Health>, health_rollup: Option<Health>) -> Self {
        Self {
            state,
            health,
            health_rollup,
        }
    }

    /// (Enabled, Ok, Ok)
    pub const fn enabled_ok() -> Self {
        Self::new(State::Enabled, Some(Health::Ok), Some(Health::Ok))
    }

    pub fn is_enabled_and_healthy(&self) -> bool {
        self.state == State::Enabled && self.health == Some(Health::Ok)
    }

    /// An asset that should take its composed node down with it
    pub fn is_not_enabled(&self) -> bool {
        !matches!(self.state, State::Enabled | State::StandbyOffline)
            || self.health == Some(Health::Critical)
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::enabled_ok()
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:?}, {:?}, {:?})",
            self.state, self.health, self.health_rollup
        )
    }
}

/// Power state of a computer system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PowerState {
    On,
    #[default]
    Off,
    PoweringOn,
    PoweringOff,
}

// =============================================================================
// Services
// =============================================================================

/// Kind of management service an asset was discovered through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Compute,
    Storage,
    Network,
}

/// A management endpoint (agent) assets are discovered through
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalService {
    pub id: Id,
    /// Uuid reported by the service, stable across rediscovery
    #[serde(default)]
    pub uuid: Option<Uuid>,
    pub service_type: ServiceType,
}

/// A storage service exposing volume groups and iSCSI targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageService {
    pub id: Id,
    /// Owning external service
    pub service: Id,
    #[serde(default)]
    pub name: String,
    /// Logical drives in discovery order; LVGs are searched in this order
    #[serde(default)]
    pub logical_drives: Vec<Id>,
    #[serde(default)]
    pub remote_targets: Vec<Id>,
}

// =============================================================================
// Compute
// =============================================================================

/// Type of computer system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SystemType {
    #[default]
    Physical,
    Virtual,
}

/// A physical NIC of a computer system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthernetInterface {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub speed_mbps: Option<u32>,
    /// Switch port this NIC is cabled to, present only on manageable switches
    #[serde(default)]
    pub neighbor_port: Option<String>,
    #[serde(default)]
    pub status: Status,
}

impl EthernetInterface {
    pub fn has_neighbor_port(&self) -> bool {
        self.neighbor_port.is_some()
    }
}

/// Direct-attached drive of a computer system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDrive {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub capacity_gib: f64,
    #[serde(default)]
    pub status: Status,
}

/// Simple storage controller of a computer system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleStorage {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub device_count: u32,
    #[serde(default)]
    pub status: Status,
}

/// A discoverable physical server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputerSystem {
    pub id: Id,
    #[serde(default)]
    pub uuid: Option<Uuid>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_type: SystemType,
    /// External service this system was discovered through
    pub service: Id,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub power_state: PowerState,
    #[serde(default)]
    pub allocated: bool,
    /// Composed node currently holding this system
    #[serde(default)]
    pub composed_node: Option<Id>,
    #[serde(default)]
    pub ethernet_interfaces: Vec<EthernetInterface>,
    #[serde(default)]
    pub local_drives: Vec<LocalDrive>,
    #[serde(default)]
    pub simple_storages: Vec<SimpleStorage>,
}

impl ComputerSystem {
    pub fn is_enabled_and_healthy(&self) -> bool {
        self.status.is_enabled_and_healthy()
    }

    /// Free for a new allocation
    pub fn can_be_allocated(&self) -> bool {
        !self.allocated && self.is_enabled_and_healthy()
    }

    /// Free, or already held by `node`
    pub fn can_be_allocated_to(&self, node: Id) -> bool {
        self.is_enabled_and_healthy() && (!self.allocated || self.composed_node == Some(node))
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Kind of logical drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalDriveType {
    /// Logical volume group, a pool with free space
    Lvg,
    /// Logical volume carved from an LVG
    Lv,
    /// Physical volume backing an LVG
    Pv,
}

/// A logical drive managed by a storage service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalDrive {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    pub drive_type: LogicalDriveType,
    #[serde(default)]
    pub capacity_gib: f64,
    /// Unused capacity; tracked for LVGs only
    #[serde(default)]
    pub free_space_gib: f64,
    #[serde(default)]
    pub bootable: bool,
    /// Image location used when this drive is cloned or snapshotted
    #[serde(default)]
    pub source_uri: Option<String>,
    /// Parent storage service
    #[serde(default)]
    pub storage_service: Option<Id>,
    #[serde(default)]
    pub status: Status,
}

impl LogicalDrive {
    pub fn is_lvg(&self) -> bool {
        self.drive_type == LogicalDriveType::Lvg
    }

    pub fn has_free_space(&self, capacity_gib: f64) -> bool {
        self.free_space_gib >= capacity_gib
    }
}

/// An iSCSI target exposing one or more logical drives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTarget {
    pub id: Id,
    #[serde(default)]
    pub target_iqn: Option<String>,
    /// External service this target was discovered through
    pub service: Id,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub allocated: bool,
    #[serde(default)]
    pub composed_node: Option<Id>,
    /// Logical drives mapped behind this target's LUNs
    #[serde(default)]
    pub logical_drives: Vec<Id>,
}

impl RemoteTarget {
    pub fn is_enabled_and_healthy(&self) -> bool {
        self.status.is_enabled_and_healthy()
    }

    pub fn can_be_allocated(&self) -> bool {
        !self.allocated && self.is_enabled_and_healthy()
    }

    pub fn can_be_allocated_to(&self, node: Id) -> bool {
        self.is_enabled_and_healthy() && (!self.allocated || self.composed_node == Some(node))
    }
}

// =============================================================================
// Composed Node
// =============================================================================

/// Lifecycle state of a composed node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ComposedNodeState {
    Allocating,
    Assembled,
    Failed,
}

impl std::fmt::Display for ComposedNodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComposedNodeState::Allocating => write!(f, "Allocating"),
            ComposedNodeState::Assembled => write!(f, "Assembled"),
            ComposedNodeState::Failed => write!(f, "Failed"),
        }
    }
}

/// A logical server assembled from pooled resources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedNode {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub system_type: Option<SystemType>,
    pub composed_node_state: ComposedNodeState,
    pub status: Status,
    #[serde(default)]
    pub eligible_for_recovery: bool,

    // Identity of the assets this node was composed from. Written once.
    #[serde(default)]
    pub associated_compute_service_uuid: Option<Uuid>,
    #[serde(default)]
    pub associated_computer_system_uuid: Option<Uuid>,
    #[serde(default)]
    pub associated_storage_service_uuid: Option<Uuid>,
    #[serde(default)]
    pub associated_remote_target_iqn: Option<String>,

    #[serde(default)]
    pub computer_system: Option<Id>,
    #[serde(default)]
    pub remote_targets: BTreeSet<Id>,
    #[serde(default)]
    pub ethernet_interfaces: BTreeSet<Id>,
    #[serde(default)]
    pub local_drives: BTreeSet<Id>,
    #[serde(default)]
    pub simple_storages: BTreeSet<Id>,
    #[serde(default)]
    pub remote_drive_capacity_gib: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ComposedNode {
    /// Status of a node that lost one of its assets
    pub const OFFLINE_CRITICAL_STATUS: Status =
        Status::new(State::UnavailableOffline, Some(Health::Critical), None);

    /// A fresh node in the allocating state
    pub fn new(id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            system_type: None,
            composed_node_state: ComposedNodeState::Allocating,
            status: Status::new(State::Starting, Some(Health::Ok), None),
            eligible_for_recovery: false,
            associated_compute_service_uuid: None,
            associated_computer_system_uuid: None,
            associated_storage_service_uuid: None,
            associated_remote_target_iqn: None,
            computer_system: None,
            remote_targets: BTreeSet::new(),
            ethernet_interfaces: BTreeSet::new(),
            local_drives: BTreeSet::new(),
            simple_storages: BTreeSet::new(),
            remote_drive_capacity_gib: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_in_any_of_states(&self, states: &[ComposedNodeState]) -> bool {
        states.contains(&self.composed_node_state)
    }

    /// Record the compute identity; the first recorded value wins
    pub fn record_compute_identity(&mut self, service_uuid: Option<Uuid>, system_uuid: Option<Uuid>) {
        set_once(
            &mut self.associated_compute_service_uuid,
            service_uuid,
            self.id,
            "associated_compute_service_uuid",
        );
        set_once(
            &mut self.associated_computer_system_uuid,
            system_uuid,
            self.id,
            "associated_computer_system_uuid",
        );
    }

    /// Record the storage identity; the first recorded value wins
    pub fn record_storage_identity(&mut self, service_uuid: Option<Uuid>, target_iqn: Option<String>) {
        set_once(
            &mut self.associated_storage_service_uuid,
            service_uuid,
            self.id,
            "associated_storage_service_uuid",
        );
        set_once(
            &mut self.associated_remote_target_iqn,
            target_iqn,
            self.id,
            "associated_remote_target_iqn",
        );
    }

    /// Whether recovery needs a computer system bound
    pub fn requires_computer_system(&self) -> bool {
        self.associated_computer_system_uuid.is_some()
    }

    /// Whether recovery needs a remote target bound
    pub fn requires_remote_target(&self) -> bool {
        self.associated_storage_service_uuid.is_some() && self.associated_remote_target_iqn.is_some()
    }

    /// Transition into Failed / OFFLINE_CRITICAL
    pub fn mark_failed(&mut self) {
        if self.is_in_any_of_states(&[ComposedNodeState::Assembled]) {
            self.eligible_for_recovery = true;
        }
        self.composed_node_state = ComposedNodeState::Failed;
        self.status = Self::OFFLINE_CRITICAL_STATUS;
    }

    /// Transition into Assembled / (Enabled, Ok, Ok)
    pub fn mark_assembled(&mut self) {
        self.composed_node_state = ComposedNodeState::Assembled;
        self.status = Status::enabled_ok();
        self.eligible_for_recovery = false;
    }
}

fn set_once<T: PartialEq + std::fmt::Debug>(slot: &mut Option<T>, value: Option<T>, node: Id, field: &str) {
    match (slot.as_ref(), value) {
        (None, value) => *slot = value,
        (Some(current), Some(value)) if *current != value => {
            warn!(
                "Refusing to overwrite {} of composed node {}: {:?} -> {:?}",
                field, node, current, value
            );
        }
        _ => {}
    }
}
