//! Composed Node Updater
//!
//! Runs after every discovery pass. Rediscovered assets that match a failed
//! node's recorded identity are bound back to it, and the node returns to
//! Assembled once every slot it was composed with is filled again. Assets that
//! went down take their nodes to Failed.
//!
//! Bindings are only ever added, and the recovery predicate is recomputed from
//! the node's current bindings, so a batch may be split arbitrarily across
//! passes and a pass may be retried whole.

use crate::domain::{ComposedNode, ComputerSystem, Id, RemoteTarget, Status};
use crate::hardware::registry::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

/// An asset reported by a discovery pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum DiscoveredAsset {
    ComputerSystem(Id),
    RemoteTarget(Id),
}

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    /// Nodes put back into Assembled
    pub recovered: Vec<Id>,
    /// Nodes put into Failed because an asset went down
    pub disabled: Vec<Id>,
    pub bound_computer_systems: usize,
    pub bound_remote_targets: usize,
}

/// Reconciles composed nodes with rediscovered assets
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposedNodeUpdater;

impl ComposedNodeUpdater {
    pub fn new() -> Self {
        Self
    }

    /// Rebind and recover eligible nodes, then fail nodes of downed assets.
    ///
    /// Must run inside the transaction that commits its writes. Assets that
    /// are missing, unhealthy, ambiguous or do not match a node's identity
    /// are skipped without error.
    pub fn update_related_composed_nodes(
        &self,
        tx: &mut Transaction<'_>,
        assets: &[DiscoveredAsset],
    ) -> RecoveryReport {
        let mut system_ids = BTreeSet::new();
        let mut target_ids = BTreeSet::new();
        for asset in assets {
            match asset {
                DiscoveredAsset::ComputerSystem(id) => system_ids.insert(*id),
                DiscoveredAsset::RemoteTarget(id) => target_ids.insert(*id),
            };
        }

        let mut report = RecoveryReport::default();
        self.reattach(tx, &system_ids, &target_ids, &mut report);
        self.disable_nodes_of_not_enabled_assets(tx, &system_ids, &target_ids, &mut report);
        report
    }

    fn reattach(
        &self,
        tx: &mut Transaction<'_>,
        system_ids: &BTreeSet<Id>,
        target_ids: &BTreeSet<Id>,
        report: &mut RecoveryReport,
    ) {
        let eligible = tx.composed_nodes_eligible_for_recovery();
        debug!(
            "{} composed nodes eligible for recovery, {} systems and {} targets rediscovered",
            eligible.len(),
            system_ids.len(),
            target_ids.len()
        );

        for mut node in eligible {
            let mut changed = false;

            if self.reattach_computer_system(tx, &mut node, system_ids) {
                report.bound_computer_systems += 1;
                changed = true;
            }
            if self.reattach_remote_target(tx, &mut node, target_ids) {
                report.bound_remote_targets += 1;
                changed = true;
            }

            if fulfills_computer_system_requirements(tx, &node)
                && fulfills_remote_target_requirements(tx, &node)
            {
                node.mark_assembled();
                info!(
                    "Putting composed node {} into {} state and {} status",
                    node.id, node.composed_node_state, node.status
                );
                report.recovered.push(node.id);
                changed = true;
            }

            if changed {
                tx.put(node);
            }
        }
    }

    /// A node's compute slot holds one system. While the bound system still
    /// exists no other system is taken in its place, and a rediscovered system
    /// is only bound when it is the single system in the inventory carrying
    /// the node's identity.
    fn reattach_computer_system(
        &self,
        tx: &mut Transaction<'_>,
        node: &mut ComposedNode,
        system_ids: &BTreeSet<Id>,
    ) -> bool {
        let mut rediscovered = Vec::new();
        for id in system_ids {
            let Some(system) = tx.find::<ComputerSystem>(*id) else {
                trace!("Rediscovered computer system {} is gone", id);
                continue;
            };
            if is_bindable_computer_system(tx, node, &system) {
                rediscovered.push(system);
            }
        }
        if rediscovered.is_empty() {
            return false;
        }

        let held = node
            .computer_system
            .filter(|id| tx.find::<ComputerSystem>(*id).is_some());
        if let Some(held) = held {
            return match rediscovered.into_iter().find(|system| system.id == held) {
                Some(system) => bind_computer_system(tx, node, system),
                None => {
                    debug!(
                        "Composed node {} still holds computer system {}, not replacing it",
                        node.id, held
                    );
                    false
                }
            };
        }

        let Some(uuid) = node.associated_computer_system_uuid else {
            return false;
        };
        let mut candidates = Vec::new();
        for system in tx.computer_systems_by_uuid(uuid) {
            if is_bindable_computer_system(tx, node, &system) {
                candidates.push(system);
            }
        }

        match single_or_none(candidates) {
            Some(system) if rediscovered.iter().any(|s| s.id == system.id) => {
                bind_computer_system(tx, node, system)
            }
            _ => false,
        }
    }

    /// Same rules as the compute slot. Any held target that still carries the
    /// node's storage identity fills the slot.
    fn reattach_remote_target(
        &self,
        tx: &mut Transaction<'_>,
        node: &mut ComposedNode,
        target_ids: &BTreeSet<Id>,
    ) -> bool {
        let mut rediscovered = Vec::new();
        for id in target_ids {
            let Some(target) = tx.find::<RemoteTarget>(*id) else {
                trace!("Rediscovered remote target {} is gone", id);
                continue;
            };
            if target.can_be_allocated_to(node.id) && carries_storage_identity(tx, node, &target) {
                rediscovered.push(target);
            }
        }
        if rediscovered.is_empty() {
            return false;
        }

        let mut held = Vec::new();
        for id in node.remote_targets.clone() {
            if let Some(target) = tx.find::<RemoteTarget>(id) {
                if carries_storage_identity(tx, node, &target) {
                    held.push(id);
                }
            }
        }
        if !held.is_empty() {
            return match rediscovered.into_iter().find(|target| held.contains(&target.id)) {
                Some(target) => bind_remote_target(tx, node, target),
                None => {
                    debug!(
                        "Composed node {} still holds remote targets {:?}, not adding another",
                        node.id, held
                    );
                    false
                }
            };
        }

        let Some(iqn) = node.associated_remote_target_iqn.clone() else {
            return false;
        };
        let mut candidates = Vec::new();
        for target in tx.remote_targets_by_iqn(&iqn) {
            if target.can_be_allocated_to(node.id) && carries_storage_identity(tx, node, &target) {
                candidates.push(target);
            }
        }

        match single_or_none(candidates) {
            Some(target) if rediscovered.iter().any(|t| t.id == target.id) => {
                bind_remote_target(tx, node, target)
            }
            _ => false,
        }
    }

    fn disable_nodes_of_not_enabled_assets(
        &self,
        tx: &mut Transaction<'_>,
        system_ids: &BTreeSet<Id>,
        target_ids: &BTreeSet<Id>,
        report: &mut RecoveryReport,
    ) {
        let mut affected = BTreeSet::new();
        for id in system_ids {
            if let Some(system) = tx.find::<ComputerSystem>(*id) {
                collect_if_not_enabled(&mut affected, &system.status, system.composed_node, "computer system", *id);
            }
        }
        for id in target_ids {
            if let Some(target) = tx.find::<RemoteTarget>(*id) {
                collect_if_not_enabled(&mut affected, &target.status, target.composed_node, "remote target", *id);
            }
        }

        for node_id in affected {
            let Some(mut node) = tx.find::<ComposedNode>(node_id) else {
                debug!("Composed node {} of a not enabled asset no longer exists", node_id);
                continue;
            };
            let before = (node.composed_node_state, node.status, node.eligible_for_recovery);
            self.disable_composed_node(&mut node);
            if before != (node.composed_node_state, node.status, node.eligible_for_recovery) {
                report.disabled.push(node.id);
                tx.put(node);
            }
        }
    }

    /// Put a node into Failed / OFFLINE_CRITICAL.
    ///
    /// Only a node that was Assembled becomes eligible for recovery.
    pub fn disable_composed_node(&self, node: &mut ComposedNode) {
        node.mark_failed();
        info!(
            "Putting composed node {} into {} state and {} status",
            node.id, node.composed_node_state, node.status
        );
    }
}

fn is_bindable_computer_system(
    tx: &mut Transaction<'_>,
    node: &ComposedNode,
    system: &ComputerSystem,
) -> bool {
    system.can_be_allocated_to(node.id)
        && same_key(tx.service_uuid(system.service), node.associated_compute_service_uuid)
        && same_key(system.uuid, node.associated_computer_system_uuid)
}

fn carries_storage_identity(tx: &mut Transaction<'_>, node: &ComposedNode, target: &RemoteTarget) -> bool {
    same_key(tx.service_uuid(target.service), node.associated_storage_service_uuid)
        && same_key(target.target_iqn.as_deref(), node.associated_remote_target_iqn.as_deref())
}

fn bind_computer_system(tx: &mut Transaction<'_>, node: &mut ComposedNode, mut system: ComputerSystem) -> bool {
    if system.allocated && system.composed_node == Some(node.id) && node.computer_system == Some(system.id) {
        return false;
    }
    system.allocated = true;
    system.composed_node = Some(node.id);
    node.computer_system = Some(system.id);
    debug!("Reattached computer system {} to composed node {}", system.id, node.id);
    tx.put(system);
    true
}

fn bind_remote_target(tx: &mut Transaction<'_>, node: &mut ComposedNode, mut target: RemoteTarget) -> bool {
    if target.allocated && target.composed_node == Some(node.id) && node.remote_targets.contains(&target.id) {
        return false;
    }
    target.allocated = true;
    target.composed_node = Some(node.id);
    node.remote_targets.insert(target.id);
    debug!("Reattached remote target {} to composed node {}", target.id, node.id);
    tx.put(target);
    true
}

fn collect_if_not_enabled(
    affected: &mut BTreeSet<Id>,
    status: &Status,
    composed_node: Option<Id>,
    what: &str,
    id: Id,
) {
    if !status.is_not_enabled() {
        return;
    }
    trace!("Not enabled {} {}: {}", what, id, status);
    if let Some(node) = composed_node {
        affected.insert(node);
    }
}

/// A recorded key only matches an equal, present value
fn same_key<T: PartialEq>(actual: Option<T>, recorded: Option<T>) -> bool {
    actual.is_some() && actual == recorded
}

fn single_or_none<T: Candidate>(mut candidates: Vec<T>) -> Option<T> {
    match candidates.len() {
        0 => None,
        1 => candidates.pop(),
        n => {
            error!(
                "There is more than one {} with identity {} ({} candidates), none will be bound",
                T::WHAT,
                candidates[0].identity(),
                n
            );
            None
        }
    }
}

trait Candidate {
    const WHAT: &'static str;
    fn identity(&self) -> String;
}

impl Candidate for ComputerSystem {
    const WHAT: &'static str = "computer system";

    fn identity(&self) -> String {
        self.uuid.map(|u: Uuid| u.to_string()).unwrap_or_default()
    }
}

impl Candidate for RemoteTarget {
    const WHAT: &'static str = "remote target";

    fn identity(&self) -> String {
        self.target_iqn.clone().unwrap_or_default()
    }
}

fn fulfills_computer_system_requirements(tx: &mut Transaction<'_>, node: &ComposedNode) -> bool {
    if !node.requires_computer_system() {
        return true;
    }
    node.computer_system
        .and_then(|id| tx.find::<ComputerSystem>(id))
        .map_or(false, |system| system.is_enabled_and_healthy())
}

fn fulfills_remote_target_requirements(tx: &mut Transaction<'_>, node: &ComposedNode) -> bool {
    if !node.requires_remote_target() {
        return true;
    }
    !node.remote_targets.is_empty()
        && node.remote_targets.iter().all(|id| {
            tx.find::<RemoteTarget>(*id)
                .map_or(false, |target| target.is_enabled_and_healthy())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransactionRetryConfig;
    use crate::domain::{ComposedNodeState, ExternalService, Health, PowerState, ServiceType, State};
    use crate::hardware::registry::Inventory;
    use std::sync::Arc;

    const COMPUTE_SERVICE_UUID: Uuid = Uuid::from_u128(0x71f7888a_fec8_44f5_8c0f_c15312ad4f9b);
    const COMPUTER_SYSTEM_UUID: Uuid = Uuid::from_u128(0x81f7888a_fec8_44f5_8c0f_c15312ad4f9b);
    const STORAGE_SERVICE_UUID: Uuid = Uuid::from_u128(0x91f7888a_fec8_44f5_8c0f_c15312ad4f9b);
    const ANOTHER_COMPUTE_SERVICE_UUID: Uuid = Uuid::from_u128(0x22222222_fec8_44f5_8c0f_c15312ad4f9b);
    const REMOTE_TARGET_IQN: &str = "remote_target_iqn";

    const COMPUTE_SERVICE: Id = Id(1);
    const STORAGE_SERVICE: Id = Id(2);
    const OTHER_COMPUTE_SERVICE: Id = Id(3);
    const NODE: Id = Id(100);

    fn inventory() -> Arc<Inventory> {
        let inventory = Inventory::new(TransactionRetryConfig::default());
        for (id, uuid, service_type) in [
            (COMPUTE_SERVICE, COMPUTE_SERVICE_UUID, ServiceType::Compute),
            (STORAGE_SERVICE, STORAGE_SERVICE_UUID, ServiceType::Storage),
            (OTHER_COMPUTE_SERVICE, ANOTHER_COMPUTE_SERVICE_UUID, ServiceType::Compute),
        ] {
            inventory.upsert(ExternalService {
                id,
                uuid: Some(uuid),
                service_type,
            });
        }
        inventory
    }

    fn computer_system(id: u64, service: Id) -> ComputerSystem {
        ComputerSystem {
            id: Id(id),
            uuid: Some(COMPUTER_SYSTEM_UUID),
            name: "rediscovered".into(),
            description: None,
            system_type: Default::default(),
            service,
            status: Status::enabled_ok(),
            power_state: PowerState::Off,
            allocated: false,
            composed_node: None,
            ethernet_interfaces: Vec::new(),
            local_drives: Vec::new(),
            simple_storages: Vec::new(),
        }
    }

    fn remote_target(id: u64) -> RemoteTarget {
        RemoteTarget {
            id: Id(id),
            target_iqn: Some(REMOTE_TARGET_IQN.into()),
            service: STORAGE_SERVICE,
            status: Status::enabled_ok(),
            allocated: false,
            composed_node: None,
            logical_drives: Vec::new(),
        }
    }

    fn disabled_node(with_storage: bool) -> ComposedNode {
        let mut node = ComposedNode::new(NODE, "node");
        node.mark_assembled();
        node.record_compute_identity(Some(COMPUTE_SERVICE_UUID), Some(COMPUTER_SYSTEM_UUID));
        if with_storage {
            node.record_storage_identity(Some(STORAGE_SERVICE_UUID), Some(REMOTE_TARGET_IQN.into()));
        }
        node.mark_failed();
        node
    }

    fn reconcile(inventory: &Inventory, assets: &[DiscoveredAsset]) -> RecoveryReport {
        inventory
            .transaction(|tx| Ok(ComposedNodeUpdater.update_related_composed_nodes(tx, assets)))
            .unwrap()
    }

    fn node(inventory: &Inventory) -> ComposedNode {
        inventory.get(NODE).unwrap()
    }

    #[test]
    fn test_matching_computer_system_recovers_node() {
        let inventory = inventory();
        inventory.upsert(computer_system(10, COMPUTE_SERVICE));
        inventory.upsert(disabled_node(false));

        let report = reconcile(&inventory, &[DiscoveredAsset::ComputerSystem(Id(10))]);

        let node = node(&inventory);
        assert_eq!(report.recovered, vec![NODE]);
        assert_eq!(node.composed_node_state, ComposedNodeState::Assembled);
        assert_eq!(node.status, Status::enabled_ok());
        assert!(!node.eligible_for_recovery);
        assert_eq!(node.computer_system, Some(Id(10)));
        assert!(inventory.get::<ComputerSystem>(Id(10)).unwrap().allocated);
    }

    #[test]
    fn test_system_from_another_service_is_never_bound() {
        let inventory = inventory();
        inventory.upsert(computer_system(10, OTHER_COMPUTE_SERVICE));
        inventory.upsert(disabled_node(false));

        let report = reconcile(&inventory, &[DiscoveredAsset::ComputerSystem(Id(10))]);

        let node = node(&inventory);
        assert!(report.recovered.is_empty());
        assert_eq!(node.composed_node_state, ComposedNodeState::Failed);
        assert_eq!(node.status, ComposedNode::OFFLINE_CRITICAL_STATUS);
        assert_eq!(node.computer_system, None);
        assert!(!inventory.get::<ComputerSystem>(Id(10)).unwrap().allocated);
    }

    #[test]
    fn test_two_slot_node_recovers_once_both_are_back() {
        let inventory = inventory();
        inventory.upsert(computer_system(10, COMPUTE_SERVICE));
        inventory.upsert(remote_target(20));
        inventory.upsert(disabled_node(true));

        reconcile(&inventory, &[DiscoveredAsset::ComputerSystem(Id(10))]);

        let partial = node(&inventory);
        assert_eq!(partial.composed_node_state, ComposedNodeState::Failed);
        assert_eq!(partial.computer_system, Some(Id(10)));
        assert!(inventory.get::<ComputerSystem>(Id(10)).unwrap().allocated);

        reconcile(&inventory, &[DiscoveredAsset::RemoteTarget(Id(20))]);

        let recovered = node(&inventory);
        assert_eq!(recovered.composed_node_state, ComposedNodeState::Assembled);
        assert_eq!(recovered.computer_system, Some(Id(10)));
        assert_eq!(recovered.remote_targets.len(), 1);
        assert!(inventory.get::<RemoteTarget>(Id(20)).unwrap().allocated);
    }

    #[test]
    fn test_repeated_target_is_added_once() {
        let inventory = inventory();
        inventory.upsert(remote_target(20));
        inventory.upsert(disabled_node(true));

        reconcile(&inventory, &[DiscoveredAsset::RemoteTarget(Id(20))]);
        reconcile(&inventory, &[DiscoveredAsset::RemoteTarget(Id(20))]);

        let node = node(&inventory);
        assert_eq!(node.remote_targets.len(), 1);
        assert_eq!(node.composed_node_state, ComposedNodeState::Failed);
        assert!(node.eligible_for_recovery);
    }

    #[test]
    fn test_split_batches_match_union() {
        let batches = [
            DiscoveredAsset::ComputerSystem(Id(10)),
            DiscoveredAsset::RemoteTarget(Id(20)),
        ];
        let setup = || {
            let inventory = inventory();
            inventory.upsert(computer_system(10, COMPUTE_SERVICE));
            inventory.upsert(remote_target(20));
            inventory.upsert(disabled_node(true));
            inventory
        };
        let summary = |node: ComposedNode| {
            (
                node.composed_node_state,
                node.status,
                node.eligible_for_recovery,
                node.computer_system,
                node.remote_targets,
            )
        };

        let union = setup();
        reconcile(&union, &batches);

        let forward = setup();
        reconcile(&forward, &batches[..1]);
        reconcile(&forward, &batches[1..]);

        let backward = setup();
        reconcile(&backward, &batches[1..]);
        reconcile(&backward, &batches[..1]);

        assert_eq!(summary(node(&union)), summary(node(&forward)));
        assert_eq!(summary(node(&union)), summary(node(&backward)));
        assert_eq!(node(&union).composed_node_state, ComposedNodeState::Assembled);
    }

    type EndState = (
        ComposedNodeState,
        Option<Id>,
        BTreeSet<Id>,
        Vec<(Id, bool, Option<Id>)>,
    );

    fn end_state(inventory: &Inventory, assets: &[DiscoveredAsset]) -> EndState {
        let node = node(inventory);
        let bindings = assets
            .iter()
            .map(|asset| match asset {
                DiscoveredAsset::ComputerSystem(id) => {
                    let system: ComputerSystem = inventory.get(*id).unwrap();
                    (*id, system.allocated, system.composed_node)
                }
                DiscoveredAsset::RemoteTarget(id) => {
                    let target: RemoteTarget = inventory.get(*id).unwrap();
                    (*id, target.allocated, target.composed_node)
                }
            })
            .collect();
        (
            node.composed_node_state,
            node.computer_system,
            node.remote_targets,
            bindings,
        )
    }

    /// Reconcile both batches at once, then split in either order
    fn assert_split_matches_union(
        setup: impl Fn() -> Arc<Inventory>,
        first: &[DiscoveredAsset],
        second: &[DiscoveredAsset],
    ) -> EndState {
        let all: Vec<DiscoveredAsset> = first.iter().chain(second).copied().collect();

        let union = setup();
        reconcile(&union, &all);

        let forward = setup();
        reconcile(&forward, first);
        reconcile(&forward, second);

        let backward = setup();
        reconcile(&backward, second);
        reconcile(&backward, first);

        let expected = end_state(&union, &all);
        assert_eq!(expected, end_state(&forward, &all));
        assert_eq!(expected, end_state(&backward, &all));
        expected
    }

    #[test]
    fn test_targets_sharing_an_iqn_bind_in_no_order() {
        let setup = || {
            let inventory = inventory();
            inventory.upsert(remote_target(20));
            inventory.upsert(remote_target(21));
            inventory.upsert(disabled_node(true));
            inventory
        };

        let (state, _, targets, bindings) = assert_split_matches_union(
            setup,
            &[DiscoveredAsset::RemoteTarget(Id(20))],
            &[DiscoveredAsset::RemoteTarget(Id(21))],
        );

        assert_eq!(state, ComposedNodeState::Failed);
        assert!(targets.is_empty());
        assert!(bindings.iter().all(|(_, allocated, owner)| !allocated && owner.is_none()));
    }

    #[test]
    fn test_systems_sharing_a_uuid_bind_in_no_order() {
        let setup = || {
            let inventory = inventory();
            inventory.upsert(computer_system(10, COMPUTE_SERVICE));
            inventory.upsert(computer_system(11, COMPUTE_SERVICE));
            inventory.upsert(remote_target(20));
            inventory.upsert(disabled_node(true));
            inventory
        };

        let (state, system, targets, bindings) = assert_split_matches_union(
            setup,
            &[
                DiscoveredAsset::ComputerSystem(Id(10)),
                DiscoveredAsset::RemoteTarget(Id(20)),
            ],
            &[DiscoveredAsset::ComputerSystem(Id(11))],
        );

        assert_eq!(state, ComposedNodeState::Failed);
        assert_eq!(system, None);
        assert_eq!(targets, BTreeSet::from([Id(20)]));
        assert_eq!(
            bindings,
            vec![(Id(10), false, None), (Id(20), true, Some(NODE)), (Id(11), false, None)]
        );
    }

    #[test]
    fn test_held_system_is_never_replaced() {
        let inventory = inventory();
        let mut held = computer_system(10, COMPUTE_SERVICE);
        held.allocated = true;
        held.composed_node = Some(NODE);
        held.status = Status::new(State::Enabled, Some(Health::Warning), None);
        inventory.upsert(held);
        inventory.upsert(computer_system(11, COMPUTE_SERVICE));
        let mut node = disabled_node(false);
        node.computer_system = Some(Id(10));
        inventory.upsert(node);

        let report = reconcile(&inventory, &[DiscoveredAsset::ComputerSystem(Id(11))]);

        assert_eq!(report.bound_computer_systems, 0);
        assert_eq!(self::node(&inventory).computer_system, Some(Id(10)));
        let replacement: ComputerSystem = inventory.get(Id(11)).unwrap();
        assert!(!replacement.allocated);
        assert_eq!(replacement.composed_node, None);
    }

    #[test]
    fn test_held_target_fills_the_storage_slot() {
        let inventory = inventory();
        let mut held = remote_target(20);
        held.allocated = true;
        held.composed_node = Some(NODE);
        held.status = Status::new(State::Enabled, Some(Health::Critical), None);
        inventory.upsert(held);
        inventory.upsert(remote_target(21));
        let mut node = disabled_node(true);
        node.remote_targets.insert(Id(20));
        inventory.upsert(node);

        let report = reconcile(&inventory, &[DiscoveredAsset::RemoteTarget(Id(21))]);

        assert_eq!(report.bound_remote_targets, 0);
        assert_eq!(self::node(&inventory).remote_targets, BTreeSet::from([Id(20)]));
        assert!(!inventory.get::<RemoteTarget>(Id(21)).unwrap().allocated);
    }

    #[test]
    fn test_unhealthy_or_ambiguous_assets_are_skipped() {
        let inventory = inventory();
        let mut unhealthy = computer_system(10, COMPUTE_SERVICE);
        unhealthy.status = Status::new(State::Enabled, Some(Health::Warning), None);
        inventory.upsert(unhealthy);
        inventory.upsert(remote_target(20));
        inventory.upsert(remote_target(21));
        inventory.upsert(disabled_node(true));

        let report = reconcile(
            &inventory,
            &[
                DiscoveredAsset::ComputerSystem(Id(10)),
                DiscoveredAsset::RemoteTarget(Id(20)),
                DiscoveredAsset::RemoteTarget(Id(21)),
            ],
        );

        assert_eq!(report.bound_computer_systems, 0);
        assert_eq!(report.bound_remote_targets, 0);
        assert!(node(&inventory).remote_targets.is_empty());
        assert!(!inventory.get::<RemoteTarget>(Id(20)).unwrap().allocated);
    }

    #[test]
    fn test_failing_asset_disables_its_node() {
        let inventory = inventory();
        let mut node = ComposedNode::new(NODE, "node");
        node.mark_assembled();
        node.computer_system = Some(Id(10));
        inventory.upsert(node);
        let mut system = computer_system(10, COMPUTE_SERVICE);
        system.allocated = true;
        system.composed_node = Some(NODE);
        system.status = Status::new(State::Enabled, Some(Health::Critical), None);
        inventory.upsert(system);

        let report = reconcile(&inventory, &[DiscoveredAsset::ComputerSystem(Id(10))]);

        let node = self::node(&inventory);
        assert_eq!(report.disabled, vec![NODE]);
        assert_eq!(node.composed_node_state, ComposedNodeState::Failed);
        assert_eq!(node.status, ComposedNode::OFFLINE_CRITICAL_STATUS);
        assert!(node.eligible_for_recovery);
    }

    #[test]
    fn test_returning_bound_system_recovers_node() {
        let inventory = inventory();
        let mut system = computer_system(10, COMPUTE_SERVICE);
        system.allocated = true;
        system.composed_node = Some(NODE);
        inventory.upsert(system);
        let mut node = disabled_node(false);
        node.computer_system = Some(Id(10));
        inventory.upsert(node);

        let report = reconcile(&inventory, &[DiscoveredAsset::ComputerSystem(Id(10))]);

        assert_eq!(report.recovered, vec![NODE]);
        assert_eq!(report.bound_computer_systems, 0);
        assert_eq!(self::node(&inventory).composed_node_state, ComposedNodeState::Assembled);
    }

    #[test]
    fn test_standby_offline_asset_does_not_disable() {
        let inventory = inventory();
        let mut node = ComposedNode::new(NODE, "node");
        node.mark_assembled();
        inventory.upsert(node);
        let mut system = computer_system(10, COMPUTE_SERVICE);
        system.composed_node = Some(NODE);
        system.allocated = true;
        system.status = Status::new(State::StandbyOffline, Some(Health::Ok), None);
        inventory.upsert(system);

        let report = reconcile(&inventory, &[DiscoveredAsset::ComputerSystem(Id(10))]);

        assert!(report.disabled.is_empty());
        assert_eq!(self::node(&inventory).composed_node_state, ComposedNodeState::Assembled);
    }
}
