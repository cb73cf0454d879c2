//! Remote Drive Resource Finders
//!
//! Read-only inventory searches backing the `find_resources` phase of the
//! remote drive strategies. Constraint failures come back as [`Violations`];
//! resources that validation already proved to exist but that vanished since
//! are reported as hard errors.

use super::violations::Violations;
use crate::domain::{LogicalDrive, RemoteTarget, RequestedRemoteDrive, StorageService};
use crate::error::{Error, Result};
use crate::hardware::registry::Transaction;
use tracing::debug;

// =============================================================================
// Existing Remote Drive
// =============================================================================

/// Outcome of looking up an existing target
#[derive(Debug, Clone)]
pub struct ExistingRemoteDriveResources {
    pub target: RemoteTarget,
    pub violations: Violations,
}

/// Locates the iSCSI target an existing-drive request refers to
pub struct ExistingRemoteDriveResourcesFinder;

impl ExistingRemoteDriveResourcesFinder {
    pub fn find(tx: &mut Transaction<'_>, drive: &RequestedRemoteDrive) -> Result<ExistingRemoteDriveResources> {
        let iqn = drive
            .iscsi_address
            .as_deref()
            .ok_or_else(|| Error::Internal("existing remote drive request without iSCSI address".into()))?;

        let target = single_target(tx, iqn).ok_or_else(|| Error::not_found("RemoteTarget", iqn))?;

        let mut violations = Violations::new();
        if target.allocated {
            violations.add_violation(format!(
                "Remote target with IQN {} is currently in use.",
                iqn
            ));
        }

        Ok(ExistingRemoteDriveResources { target, violations })
    }
}

/// The only target with this IQN; ambiguity counts as absence
pub(crate) fn single_target(tx: &mut Transaction<'_>, iqn: &str) -> Option<RemoteTarget> {
    let mut targets = tx.remote_targets_by_iqn(iqn);
    if targets.len() > 1 {
        debug!("{} remote targets share IQN {}", targets.len(), iqn);
        return None;
    }
    targets.pop()
}

// =============================================================================
// New Remote Drive
// =============================================================================

/// Outcome of searching capacity for a new drive
#[derive(Debug, Clone)]
pub struct NewRemoteDriveResources {
    pub master: Option<LogicalDrive>,
    pub lvg: Option<LogicalDrive>,
    pub capacity_gib: f64,
    pub violations: Violations,
}

/// Finds an LVG with room for a new drive next to its master
pub struct NewRemoteDriveResourcesFinder;

impl NewRemoteDriveResourcesFinder {
    pub fn find(tx: &mut Transaction<'_>, drive: &RequestedRemoteDrive) -> Result<NewRemoteDriveResources> {
        let master_id = drive
            .master
            .as_ref()
            .map(|m| m.resource)
            .ok_or_else(|| Error::Internal("new remote drive request without master".into()))?;
        let capacity_gib = drive
            .capacity_gib
            .ok_or_else(|| Error::Internal("new remote drive request without capacity".into()))?;

        let master_reference: LogicalDrive = tx.get(master_id)?;
        let service_id = master_reference
            .storage_service
            .ok_or_else(|| Error::not_found("StorageService", format!("parent of {}", master_id)))?;
        let service: StorageService = tx.get(service_id)?;

        let mut violations = Violations::new();
        let lvg = first_lvg_with_free_space(tx, &service, capacity_gib);
        if lvg.is_none() {
            violations.add_violation("LVG with sufficient space was not found.");
        }

        let master: LogicalDrive = tx.get(master_id)?;

        Ok(NewRemoteDriveResources {
            master: Some(master),
            lvg,
            capacity_gib,
            violations,
        })
    }
}

/// First-fit: the earliest LVG in the service's order that is large enough
fn first_lvg_with_free_space(
    tx: &mut Transaction<'_>,
    service: &StorageService,
    capacity_gib: f64,
) -> Option<LogicalDrive> {
    service
        .logical_drives
        .iter()
        .filter_map(|id| tx.find::<LogicalDrive>(*id))
        .filter(LogicalDrive::is_lvg)
        .find(|lvg| lvg.has_free_space(capacity_gib))
}
