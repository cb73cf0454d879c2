//! Remote Drive Allocation Strategies
//!
//! A request carries at most one remote drive, provisioned in one of two
//! mutually exclusive ways: attach an existing iSCSI target, or carve a new
//! drive from a logical volume group. Each way is a strategy running the
//! validate → find → allocate protocol inside the caller's transaction.

use super::finder::{
    single_target, ExistingRemoteDriveResourcesFinder, NewRemoteDriveResources,
    NewRemoteDriveResourcesFinder,
};
use super::tasks::AssemblyTask;
use super::violations::Violations;
use crate::domain::{
    ComposedNode, LogicalDrive, LogicalDriveType, RemoteTarget, RequestedNode, RequestedRemoteDrive,
    StorageService,
};
use crate::error::{Error, Result};
use crate::hardware::registry::Transaction;
use tracing::{debug, info};

// =============================================================================
// Strategy Trait
// =============================================================================

/// Three-phase allocation of a node's remote drive
///
/// Phases run in order within one transaction: `validate` checks the request
/// itself, `find_resources` searches the inventory and caches what it found,
/// `allocate` reserves the cached resources for the node.
pub trait RemoteDriveAllocationStrategy: Send + std::fmt::Debug {
    /// Strategy name used in logs and errors
    fn name(&self) -> &'static str;

    fn validate(&mut self, tx: &mut Transaction<'_>) -> Violations;

    fn find_resources(&mut self, tx: &mut Transaction<'_>) -> Result<Violations>;

    fn allocate(&mut self, tx: &mut Transaction<'_>, node: &mut ComposedNode) -> Result<()>;

    /// Deferred work produced by `allocate`
    fn tasks(&self) -> &[AssemblyTask];
}

fn out_of_order(strategy: &str, reason: &str) -> Error {
    Error::InvalidStrategyState {
        strategy: strategy.to_string(),
        reason: reason.to_string(),
    }
}

// =============================================================================
// No Remote Drive
// =============================================================================

/// Used when the request asks for no remote drive
#[derive(Debug, Default)]
pub struct NoRemoteDriveAllocationStrategy;

impl RemoteDriveAllocationStrategy for NoRemoteDriveAllocationStrategy {
    fn name(&self) -> &'static str {
        "no-remote-drive"
    }

    fn validate(&mut self, _tx: &mut Transaction<'_>) -> Violations {
        Violations::new()
    }

    fn find_resources(&mut self, _tx: &mut Transaction<'_>) -> Result<Violations> {
        Ok(Violations::new())
    }

    fn allocate(&mut self, _tx: &mut Transaction<'_>, _node: &mut ComposedNode) -> Result<()> {
        Ok(())
    }

    fn tasks(&self) -> &[AssemblyTask] {
        &[]
    }
}

// =============================================================================
// Existing Remote Drive
// =============================================================================

/// Attaches a pre-existing iSCSI target
#[derive(Debug)]
pub struct ExistingRemoteDriveAllocationStrategy {
    drive: RequestedRemoteDrive,
    target: Option<RemoteTarget>,
}

impl ExistingRemoteDriveAllocationStrategy {
    pub fn new(drive: RequestedRemoteDrive) -> Self {
        Self {
            drive,
            target: None,
        }
    }
}

impl RemoteDriveAllocationStrategy for ExistingRemoteDriveAllocationStrategy {
    fn name(&self) -> &'static str {
        "existing-remote-drive"
    }

    fn validate(&mut self, tx: &mut Transaction<'_>) -> Violations {
        let mut violations = Violations::new();

        let Some(iqn) = self.drive.iscsi_address.as_deref() else {
            violations.add_missing_property_violation("iSCSIAddress");
            return violations;
        };

        let Some(target) = single_target(tx, iqn) else {
            violations.add_violation(format!("Specified remote target ({}) does not exist.", iqn));
            return violations;
        };

        for id in &target.logical_drives {
            match tx.find::<LogicalDrive>(*id) {
                Some(drive) if !drive.bootable => {
                    violations.add_violation(format!(
                        "Logical drive {} behind remote target {} is not bootable.",
                        drive.id, iqn
                    ));
                }
                Some(_) => {}
                None => {
                    violations.add_violation(format!(
                        "Logical drive {} behind remote target {} does not exist.",
                        id, iqn
                    ));
                }
            }
        }

        if !target.is_enabled_and_healthy() {
            violations.add_violation(format!(
                "Remote target {} is not enabled and healthy.",
                iqn
            ));
        }

        violations
    }

    fn find_resources(&mut self, tx: &mut Transaction<'_>) -> Result<Violations> {
        let found = ExistingRemoteDriveResourcesFinder::find(tx, &self.drive)?;
        self.target = Some(found.target);
        Ok(found.violations)
    }

    fn allocate(&mut self, tx: &mut Transaction<'_>, node: &mut ComposedNode) -> Result<()> {
        let mut target = self
            .target
            .clone()
            .ok_or_else(|| out_of_order(self.name(), "allocate called before find_resources"))?;

        target.allocated = true;
        target.composed_node = Some(node.id);

        let service_uuid = tx.service_uuid(target.service);
        node.remote_targets.insert(target.id);
        node.record_storage_identity(service_uuid, target.target_iqn.clone());

        info!(
            "Attached remote target {:?} to composed node {}",
            target.target_iqn, node.id
        );
        tx.put(target);
        Ok(())
    }

    fn tasks(&self) -> &[AssemblyTask] {
        &[]
    }
}

// =============================================================================
// New Remote Drive
// =============================================================================

/// Carves a new drive out of an LVG, cloned or snapshotted from a master
#[derive(Debug)]
pub struct NewRemoteDriveAllocationStrategy {
    drive: RequestedRemoteDrive,
    resources: Option<NewRemoteDriveResources>,
    tasks: Vec<AssemblyTask>,
}

impl NewRemoteDriveAllocationStrategy {
    pub fn new(drive: RequestedRemoteDrive) -> Self {
        Self {
            drive,
            resources: None,
            tasks: Vec::new(),
        }
    }
}

impl RemoteDriveAllocationStrategy for NewRemoteDriveAllocationStrategy {
    fn name(&self) -> &'static str {
        "new-remote-drive"
    }

    fn validate(&mut self, tx: &mut Transaction<'_>) -> Violations {
        let mut violations = Violations::new();

        match self.drive.capacity_gib {
            None => {
                violations.add_missing_property_violation("capacityGiB");
            }
            Some(capacity) if capacity <= 0.0 => {
                violations.add_violation("capacityGiB must be greater than 0.");
            }
            Some(_) => {}
        }

        let Some(master) = self.drive.master.as_ref() else {
            violations.add_missing_property_violation("master");
            return violations;
        };

        match tx.find::<LogicalDrive>(master.resource) {
            None => {
                violations.add_violation(format!(
                    "Specified master drive ({}) does not exist.",
                    master.resource
                ));
            }
            Some(drive) => {
                if drive.drive_type != LogicalDriveType::Lv {
                    violations.add_violation(format!(
                        "Master drive {} is not a logical volume.",
                        drive.id
                    ));
                }
                if drive.storage_service.is_none() {
                    violations.add_violation(format!(
                        "Master drive {} is not managed by any storage service.",
                        drive.id
                    ));
                }
            }
        }

        violations
    }

    fn find_resources(&mut self, tx: &mut Transaction<'_>) -> Result<Violations> {
        let found = NewRemoteDriveResourcesFinder::find(tx, &self.drive)?;
        let violations = found.violations.clone();
        self.resources = Some(found);
        Ok(violations)
    }

    fn allocate(&mut self, tx: &mut Transaction<'_>, node: &mut ComposedNode) -> Result<()> {
        let name = self.name();
        let resources = self
            .resources
            .as_ref()
            .ok_or_else(|| out_of_order(name, "allocate called before find_resources"))?;
        let mut lvg = resources
            .lvg
            .clone()
            .ok_or_else(|| out_of_order(name, "no LVG was found"))?;
        let master = resources
            .master
            .clone()
            .ok_or_else(|| out_of_order(name, "no master drive was found"))?;
        let capacity_gib = resources.capacity_gib;

        if !lvg.has_free_space(capacity_gib) {
            return Err(out_of_order(name, "LVG lost its free space after find_resources"));
        }

        lvg.free_space_gib -= capacity_gib;
        debug!(
            "Reserved {} GiB on LVG {}, {} GiB left",
            capacity_gib, lvg.id, lvg.free_space_gib
        );

        node.remote_drive_capacity_gib = Some(capacity_gib);
        if let Some(iqn) = self.drive.iscsi_address.clone() {
            let service_uuid = match lvg.storage_service {
                Some(id) => {
                    let service: StorageService = tx.get(id)?;
                    tx.service_uuid(service.service)
                }
                None => None,
            };
            node.record_storage_identity(service_uuid, Some(iqn));
        }

        self.tasks.push(AssemblyTask::NewRemoteDrive {
            lvg: lvg.id,
            master: master.id,
            master_source_uri: master.source_uri.clone(),
            capacity_gib,
            target_iqn: self.drive.iscsi_address.clone(),
        });

        info!(
            "Reserved new {} GiB remote drive on LVG {} for composed node {}",
            capacity_gib, lvg.id, node.id
        );
        tx.put(lvg);
        Ok(())
    }

    fn tasks(&self) -> &[AssemblyTask] {
        &self.tasks
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Picks the remote drive strategy for a request
pub struct RemoteDriveAllocationStrategyFactory;

impl RemoteDriveAllocationStrategyFactory {
    /// Fails with [`Error::RemoteDriveValidation`] for more than one drive
    pub fn create(request: &RequestedNode) -> Result<Box<dyn RemoteDriveAllocationStrategy>> {
        match request.remote_drives.as_slice() {
            [] => Ok(Box::new(NoRemoteDriveAllocationStrategy)),
            [drive] if drive.refers_to_existing_target() => {
                Ok(Box::new(ExistingRemoteDriveAllocationStrategy::new(drive.clone())))
            }
            [drive] => Ok(Box::new(NewRemoteDriveAllocationStrategy::new(drive.clone()))),
            _ => Err(Error::RemoteDriveValidation(Violations::of(
                "Allocation of more than one remote drive is not supported.",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransactionRetryConfig;
    use crate::domain::{
        ExternalService, Health, Id, ReplicationMethod, RequestedMasterDrive, ServiceType, State,
        Status,
    };
    use crate::hardware::registry::Inventory;
    use assert_matches::assert_matches;
    use std::sync::Arc;
    use uuid::Uuid;

    const STORAGE_UUID: Uuid = Uuid::from_u128(0x91f7888a_fec8_44f5_8c0f_c15312ad4f9b);

    fn inventory() -> Arc<Inventory> {
        let inventory = Inventory::new(TransactionRetryConfig::default());
        inventory.upsert(ExternalService {
            id: Id(1),
            uuid: Some(STORAGE_UUID),
            service_type: ServiceType::Storage,
        });
        inventory.upsert(StorageService {
            id: Id(2),
            service: Id(1),
            name: "storage".into(),
            logical_drives: vec![Id(10), Id(11)],
            remote_targets: vec![Id(30)],
        });
        inventory.upsert(LogicalDrive {
            id: Id(10),
            name: "master".into(),
            drive_type: LogicalDriveType::Lv,
            capacity_gib: 10.0,
            free_space_gib: 0.0,
            bootable: true,
            source_uri: Some("/dev/vg/master".into()),
            storage_service: Some(Id(2)),
            status: Status::enabled_ok(),
        });
        inventory.upsert(LogicalDrive {
            id: Id(11),
            name: "lvg".into(),
            drive_type: LogicalDriveType::Lvg,
            capacity_gib: 100.0,
            free_space_gib: 40.0,
            bootable: false,
            source_uri: None,
            storage_service: Some(Id(2)),
            status: Status::enabled_ok(),
        });
        inventory.upsert(RemoteTarget {
            id: Id(30),
            target_iqn: Some("iqn.existing".into()),
            service: Id(1),
            status: Status::enabled_ok(),
            allocated: false,
            composed_node: None,
            logical_drives: vec![Id(10)],
        });
        inventory
    }

    fn existing(iqn: Option<&str>) -> RequestedRemoteDrive {
        RequestedRemoteDrive {
            capacity_gib: None,
            iscsi_address: iqn.map(str::to_string),
            master: None,
        }
    }

    fn new_drive(capacity: f64, master: u64) -> RequestedRemoteDrive {
        RequestedRemoteDrive {
            capacity_gib: Some(capacity),
            iscsi_address: Some("iqn.new".into()),
            master: Some(RequestedMasterDrive {
                method: ReplicationMethod::Clone,
                resource: Id(master),
            }),
        }
    }

    #[test]
    fn test_factory_routes_by_master() {
        let none = RemoteDriveAllocationStrategyFactory::create(&RequestedNode::new("n")).unwrap();
        assert_eq!(none.name(), "no-remote-drive");

        let request = RequestedNode::new("n").with_remote_drive(existing(Some("iqn.existing")));
        let strategy = RemoteDriveAllocationStrategyFactory::create(&request).unwrap();
        assert_eq!(strategy.name(), "existing-remote-drive");

        let request = RequestedNode::new("n").with_remote_drive(new_drive(1.0, 10));
        let strategy = RemoteDriveAllocationStrategyFactory::create(&request).unwrap();
        assert_eq!(strategy.name(), "new-remote-drive");
    }

    #[test]
    fn test_factory_rejects_two_drives() {
        let request = RequestedNode::new("n")
            .with_remote_drive(existing(Some("a")))
            .with_remote_drive(existing(Some("b")));

        let result = RemoteDriveAllocationStrategyFactory::create(&request);

        assert_matches!(result, Err(Error::RemoteDriveValidation(v)) if v.len() == 1);
    }

    #[test]
    fn test_existing_requires_iscsi_address() {
        let inventory = inventory();
        let mut tx = inventory.begin();
        let mut strategy = ExistingRemoteDriveAllocationStrategy::new(existing(None));

        let violations = strategy.validate(&mut tx);

        assert_eq!(
            violations.iter().collect::<Vec<_>>(),
            vec!["Missing required property: iSCSIAddress"]
        );
    }

    #[test]
    fn test_existing_accumulates_bootable_and_health_violations() {
        let inventory = inventory();
        let mut master: LogicalDrive = inventory.get(Id(10)).unwrap();
        master.bootable = false;
        inventory.upsert(master);
        let mut target: RemoteTarget = inventory.get(Id(30)).unwrap();
        target.status = Status::new(State::Enabled, Some(Health::Warning), None);
        inventory.upsert(target);

        let mut tx = inventory.begin();
        let mut strategy = ExistingRemoteDriveAllocationStrategy::new(existing(Some("iqn.existing")));

        assert_eq!(strategy.validate(&mut tx).len(), 2);
    }

    #[test]
    fn test_existing_unknown_target_is_violation() {
        let inventory = inventory();
        let mut tx = inventory.begin();
        let mut strategy = ExistingRemoteDriveAllocationStrategy::new(existing(Some("iqn.nope")));

        let violations = strategy.validate(&mut tx);

        assert_eq!(
            violations.iter().collect::<Vec<_>>(),
            vec!["Specified remote target (iqn.nope) does not exist."]
        );
    }

    #[test]
    fn test_existing_allocate_links_target() {
        let inventory = inventory();
        let mut tx = inventory.begin();
        let mut node = ComposedNode::new(Id(100), "node");
        let mut strategy = ExistingRemoteDriveAllocationStrategy::new(existing(Some("iqn.existing")));

        assert!(strategy.validate(&mut tx).is_empty());
        assert!(strategy.find_resources(&mut tx).unwrap().is_empty());
        strategy.allocate(&mut tx, &mut node).unwrap();
        tx.commit().unwrap();

        let target: RemoteTarget = inventory.get(Id(30)).unwrap();
        assert!(target.allocated);
        assert_eq!(target.composed_node, Some(Id(100)));
        assert!(node.remote_targets.contains(&Id(30)));
        assert_eq!(node.associated_storage_service_uuid, Some(STORAGE_UUID));
        assert_eq!(node.associated_remote_target_iqn.as_deref(), Some("iqn.existing"));
        assert!(strategy.tasks().is_empty());
    }

    #[test]
    fn test_allocate_before_find_is_a_fault() {
        let inventory = inventory();
        let mut tx = inventory.begin();
        let mut node = ComposedNode::new(Id(100), "node");
        let mut strategy = ExistingRemoteDriveAllocationStrategy::new(existing(Some("iqn.existing")));

        let result = strategy.allocate(&mut tx, &mut node);

        assert_matches!(result, Err(Error::InvalidStrategyState { .. }));
    }

    #[test]
    fn test_new_drive_validation() {
        let inventory = inventory();
        let mut tx = inventory.begin();

        let mut missing_master = NewRemoteDriveAllocationStrategy::new(RequestedRemoteDrive {
            capacity_gib: Some(1.0),
            iscsi_address: None,
            master: None,
        });
        assert_eq!(
            missing_master.validate(&mut tx).iter().collect::<Vec<_>>(),
            vec!["Missing required property: master"]
        );

        let mut lvg_as_master = NewRemoteDriveAllocationStrategy::new(new_drive(0.0, 11));
        assert_eq!(lvg_as_master.validate(&mut tx).len(), 2);
    }

    #[test]
    fn test_new_drive_reserves_capacity_and_emits_task() {
        let inventory = inventory();
        let mut tx = inventory.begin();
        let mut node = ComposedNode::new(Id(100), "node");
        let mut strategy = NewRemoteDriveAllocationStrategy::new(new_drive(15.0, 10));

        assert!(strategy.validate(&mut tx).is_empty());
        assert!(strategy.find_resources(&mut tx).unwrap().is_empty());
        strategy.allocate(&mut tx, &mut node).unwrap();
        tx.commit().unwrap();

        let lvg: LogicalDrive = inventory.get(Id(11)).unwrap();
        assert_eq!(lvg.free_space_gib, 25.0);
        assert_eq!(node.remote_drive_capacity_gib, Some(15.0));
        assert_eq!(node.associated_storage_service_uuid, Some(STORAGE_UUID));
        assert_eq!(strategy.tasks().len(), 1);
        assert_matches!(
            &strategy.tasks()[0],
            AssemblyTask::NewRemoteDrive { lvg, master, master_source_uri, .. }
                if *lvg == Id(11) && *master == Id(10)
                    && master_source_uri.as_deref() == Some("/dev/vg/master")
        );
    }

    #[test]
    fn test_new_drive_without_space_reports_violation() {
        let inventory = inventory();
        let mut tx = inventory.begin();
        let mut strategy = NewRemoteDriveAllocationStrategy::new(new_drive(41.0, 10));

        assert!(strategy.validate(&mut tx).is_empty());
        let violations = strategy.find_resources(&mut tx).unwrap();

        assert_eq!(
            violations.iter().collect::<Vec<_>>(),
            vec!["LVG with sufficient space was not found."]
        );
    }
}
