//! Transactional Inventory
//!
//! Versioned store for every discovered asset and composed node. All
//! allocation and recovery work runs inside a [`Transaction`]: reads remember
//! the version they saw, writes are buffered, and [`Transaction::commit`]
//! applies them only if none of the written rows changed underneath. A losing
//! transaction is rerun from scratch by [`Inventory::transaction`].

use crate::config::TransactionRetryConfig;
use crate::domain::{
    ComposedNode, ComputerSystem, ExternalService, Id, LogicalDrive, RemoteTarget, StorageService,
};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

// =============================================================================
// Rows
// =============================================================================

/// Table an entity lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    ExternalService,
    StorageService,
    ComputerSystem,
    RemoteTarget,
    LogicalDrive,
    ComposedNode,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::ExternalService => write!(f, "ExternalService"),
            EntityKind::StorageService => write!(f, "StorageService"),
            EntityKind::ComputerSystem => write!(f, "ComputerSystem"),
            EntityKind::RemoteTarget => write!(f, "RemoteTarget"),
            EntityKind::LogicalDrive => write!(f, "LogicalDrive"),
            EntityKind::ComposedNode => write!(f, "ComposedNode"),
        }
    }
}

/// Any stored entity
#[derive(Debug, Clone)]
pub enum Row {
    ExternalService(ExternalService),
    StorageService(StorageService),
    ComputerSystem(ComputerSystem),
    RemoteTarget(RemoteTarget),
    LogicalDrive(LogicalDrive),
    ComposedNode(ComposedNode),
}

/// An entity that can be stored in the inventory
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> Id;
    fn into_row(self) -> Row;
    fn from_row(row: &Row) -> Option<&Self>;
}

macro_rules! impl_entity {
    ($ty:ident) => {
        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$ty;

            fn id(&self) -> Id {
                self.id
            }

            fn into_row(self) -> Row {
                Row::$ty(self)
            }

            fn from_row(row: &Row) -> Option<&Self> {
                match row {
                    Row::$ty(entity) => Some(entity),
                    _ => None,
                }
            }
        }
    };
}

impl_entity!(ExternalService);
impl_entity!(StorageService);
impl_entity!(ComputerSystem);
impl_entity!(RemoteTarget);
impl_entity!(LogicalDrive);
impl_entity!(ComposedNode);

type Key = (EntityKind, Id);

/// Version 0 means "row absent"
const ABSENT: u64 = 0;

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    row: Row,
}

#[derive(Debug, Default)]
struct Rows {
    rows: BTreeMap<Key, Versioned>,
    /// Last version handed out; every write gets a fresh one
    last_version: u64,
}

impl Rows {
    fn version_of(&self, key: &Key) -> u64 {
        self.rows.get(key).map(|v| v.version).unwrap_or(ABSENT)
    }

    fn next_version(&mut self) -> u64 {
        self.last_version += 1;
        self.last_version
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Plain, serializable view of the whole inventory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySnapshot {
    #[serde(default)]
    pub external_services: Vec<ExternalService>,
    #[serde(default)]
    pub storage_services: Vec<StorageService>,
    #[serde(default)]
    pub computer_systems: Vec<ComputerSystem>,
    #[serde(default)]
    pub remote_targets: Vec<RemoteTarget>,
    #[serde(default)]
    pub logical_drives: Vec<LogicalDrive>,
    #[serde(default)]
    pub composed_nodes: Vec<ComposedNode>,
}

// =============================================================================
// Statistics
// =============================================================================

/// Transaction counters
#[derive(Debug, Default)]
pub struct InventoryStats {
    pub commits: AtomicU64,
    pub conflicts: AtomicU64,
    pub rollbacks: AtomicU64,
}

impl InventoryStats {
    pub fn snapshot(&self) -> InventoryStatsSnapshot {
        InventoryStatsSnapshot {
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of transaction counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryStatsSnapshot {
    pub commits: u64,
    pub conflicts: u64,
    pub rollbacks: u64,
}

// =============================================================================
// Inventory
// =============================================================================

/// Shared store of assets and composed nodes
pub struct Inventory {
    state: RwLock<Rows>,
    next_id: AtomicU64,
    retry: TransactionRetryConfig,
    stats: InventoryStats,
}

impl std::fmt::Debug for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inventory")
            .field("rows", &self.state.read().rows.len())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl Inventory {
    /// Create an empty inventory
    pub fn new(retry: TransactionRetryConfig) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(Rows::default()),
            next_id: AtomicU64::new(1),
            retry,
            stats: InventoryStats::default(),
        })
    }

    /// Create an inventory pre-populated from a snapshot
    pub fn from_snapshot(snapshot: InventorySnapshot, retry: TransactionRetryConfig) -> Arc<Self> {
        let inventory = Self::new(retry);
        let InventorySnapshot {
            external_services,
            storage_services,
            computer_systems,
            remote_targets,
            logical_drives,
            composed_nodes,
        } = snapshot;

        external_services.into_iter().for_each(|e| inventory.upsert(e));
        storage_services.into_iter().for_each(|e| inventory.upsert(e));
        computer_systems.into_iter().for_each(|e| inventory.upsert(e));
        remote_targets.into_iter().for_each(|e| inventory.upsert(e));
        logical_drives.into_iter().for_each(|e| inventory.upsert(e));
        composed_nodes.into_iter().for_each(|e| inventory.upsert(e));

        inventory
    }

    /// Export every row
    pub fn snapshot(&self) -> InventorySnapshot {
        let state = self.state.read();
        let mut snapshot = InventorySnapshot::default();
        for versioned in state.rows.values() {
            match versioned.row.clone() {
                Row::ExternalService(e) => snapshot.external_services.push(e),
                Row::StorageService(e) => snapshot.storage_services.push(e),
                Row::ComputerSystem(e) => snapshot.computer_systems.push(e),
                Row::RemoteTarget(e) => snapshot.remote_targets.push(e),
                Row::LogicalDrive(e) => snapshot.logical_drives.push(e),
                Row::ComposedNode(e) => snapshot.composed_nodes.push(e),
            }
        }
        snapshot
    }

    /// Hand out an unused id
    pub fn allocate_id(&self) -> Id {
        Id(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Insert or replace an entity outside of any transaction.
    ///
    /// This is how discovery publishes fresh asset state; the version bump
    /// makes any in-flight transaction that wrote the same row lose.
    pub fn upsert<T: Entity>(&self, entity: T) {
        let key = (T::KIND, entity.id());
        self.next_id.fetch_max(key.1 .0 + 1, Ordering::SeqCst);

        let mut state = self.state.write();
        let version = state.next_version();
        state.rows.insert(
            key,
            Versioned {
                version,
                row: entity.into_row(),
            },
        );
    }

    /// Read an entity outside of any transaction
    pub fn get<T: Entity>(&self, id: Id) -> Option<T> {
        self.state
            .read()
            .rows
            .get(&(T::KIND, id))
            .and_then(|v| T::from_row(&v.row))
            .cloned()
    }

    /// Begin a transaction
    pub fn begin(&self) -> Transaction<'_> {
        Transaction {
            inventory: self,
            observed: BTreeMap::new(),
            writes: BTreeMap::new(),
            finished: false,
        }
    }

    /// Run `work` in a transaction, rerunning it whole after a lost race.
    ///
    /// Any error from `work` rolls the transaction back. Only
    /// [`Error::TransactionConflict`] is retried.
    pub fn transaction<T, F>(&self, mut work: F) -> Result<T>
    where
        F: FnMut(&mut Transaction<'_>) -> Result<T>,
    {
        let classify = |err: Error| {
            if err.is_transient() {
                warn!("Retrying transaction: {}", err);
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            }
        };

        backoff::retry(self.retry.backoff(), || {
            let mut tx = self.begin();
            let value = work(&mut tx).map_err(classify)?;
            tx.commit().map_err(classify)?;
            Ok(value)
        })
        .map_err(|err| match err {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }

    /// Get transaction statistics
    pub fn stats(&self) -> InventoryStatsSnapshot {
        self.stats.snapshot()
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A unit of work over the inventory
///
/// Dropping a transaction without committing discards its writes.
pub struct Transaction<'a> {
    inventory: &'a Inventory,
    /// Version of every row at the moment this transaction first saw it
    observed: BTreeMap<Key, u64>,
    /// Buffered writes; `None` deletes the row
    writes: BTreeMap<Key, Option<Row>>,
    finished: bool,
}

impl<'a> Transaction<'a> {
    /// Read an entity, or `None` if it does not exist
    pub fn find<T: Entity>(&mut self, id: Id) -> Option<T> {
        let key = (T::KIND, id);
        if let Some(pending) = self.writes.get(&key) {
            return pending.as_ref().and_then(T::from_row).cloned();
        }

        let state = self.inventory.state.read();
        let stored = state.rows.get(&key);
        self.observed
            .entry(key)
            .or_insert_with(|| stored.map(|v| v.version).unwrap_or(ABSENT));
        stored.and_then(|v| T::from_row(&v.row)).cloned()
    }

    /// Read an entity that must exist
    pub fn get<T: Entity>(&mut self, id: Id) -> Result<T> {
        self.find(id)
            .ok_or_else(|| Error::not_found(&T::KIND.to_string(), id))
    }

    /// All entities of a kind, in id order, including this transaction's writes
    pub fn scan<T: Entity>(&mut self) -> Vec<T> {
        let mut merged: BTreeMap<Id, T> = BTreeMap::new();
        {
            let state = self.inventory.state.read();
            let range = (T::KIND, Id(u64::MIN))..=(T::KIND, Id(u64::MAX));
            for (key, versioned) in state.rows.range(range) {
                self.observed.entry(*key).or_insert(versioned.version);
                if let Some(entity) = T::from_row(&versioned.row) {
                    merged.insert(key.1, entity.clone());
                }
            }
        }

        for (key, pending) in &self.writes {
            if key.0 != T::KIND {
                continue;
            }
            match pending.as_ref().and_then(T::from_row) {
                Some(entity) => {
                    merged.insert(key.1, entity.clone());
                }
                None => {
                    merged.remove(&key.1);
                }
            }
        }

        merged.into_values().collect()
    }

    /// Buffer an insert or update
    pub fn put<T: Entity>(&mut self, entity: T) {
        let key = (T::KIND, entity.id());
        self.observe_for_write(key);
        self.writes.insert(key, Some(entity.into_row()));
    }

    /// Buffer a delete
    pub fn remove<T: Entity>(&mut self, id: Id) {
        let key = (T::KIND, id);
        self.observe_for_write(key);
        self.writes.insert(key, None);
    }

    /// Id for an entity created in this transaction
    pub fn allocate_id(&self) -> Id {
        self.inventory.allocate_id()
    }

    fn observe_for_write(&mut self, key: Key) {
        if !self.observed.contains_key(&key) {
            let version = self.inventory.state.read().version_of(&key);
            self.observed.insert(key, version);
        }
    }

    /// Apply buffered writes if no written row changed since it was observed
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let writes = std::mem::take(&mut self.writes);
        let mut state = self.inventory.state.write();

        for key in writes.keys() {
            let expected = self.observed.get(key).copied().unwrap_or(ABSENT);
            let found = state.version_of(key);
            if expected != found {
                self.inventory.stats.conflicts.fetch_add(1, Ordering::Relaxed);
                return Err(Error::TransactionConflict {
                    kind: key.0.to_string(),
                    id: key.1.to_string(),
                    expected,
                    found,
                });
            }
        }

        let write_count = writes.len();
        let version = state.next_version();
        for (key, pending) in writes {
            match pending {
                Some(row) => {
                    state.rows.insert(key, Versioned { version, row });
                }
                None => {
                    state.rows.remove(&key);
                }
            }
        }

        self.inventory.stats.commits.fetch_add(1, Ordering::Relaxed);
        debug!("Committed {} writes at version {}", write_count, version);
        Ok(())
    }

    /// Discard buffered writes
    pub fn rollback(mut self) {
        self.finished = true;
        self.inventory.stats.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Computer systems nobody holds yet
    pub fn not_allocated_computer_systems(&mut self) -> Vec<ComputerSystem> {
        self.scan::<ComputerSystem>()
            .into_iter()
            .filter(|system| !system.allocated)
            .collect()
    }

    /// Computer systems reporting the given system uuid
    pub fn computer_systems_by_uuid(&mut self, uuid: Uuid) -> Vec<ComputerSystem> {
        self.scan::<ComputerSystem>()
            .into_iter()
            .filter(|system| system.uuid == Some(uuid))
            .collect()
    }

    /// Remote targets exposing the given IQN
    pub fn remote_targets_by_iqn(&mut self, iqn: &str) -> Vec<RemoteTarget> {
        self.scan::<RemoteTarget>()
            .into_iter()
            .filter(|target| target.target_iqn.as_deref() == Some(iqn))
            .collect()
    }

    /// Nodes waiting for their assets to come back
    pub fn composed_nodes_eligible_for_recovery(&mut self) -> Vec<ComposedNode> {
        self.scan::<ComposedNode>()
            .into_iter()
            .filter(|node| node.eligible_for_recovery)
            .collect()
    }

    /// Uuid of the external service behind an asset
    pub fn service_uuid(&mut self, service: Id) -> Option<Uuid> {
        self.find::<ExternalService>(service).and_then(|s| s.uuid)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if !self.writes.is_empty() {
                debug!("Discarding {} uncommitted writes", self.writes.len());
            }
            self.inventory.stats.rollbacks.fetch_add(1, Ordering::Relaxed);
        }
    }
}
