//! Grant Registry
//!
//! The set of grant tables of all processes, keyed by owner endpoint.
//!
//! # Locking
//! - The map of tables sits behind a reader-writer lock
//! - Each table sits behind its own spinlock
//! - No operation holds two table locks at once: an entry needed from a
//!   second table is copied out and the first lock released beforehand,
//!   so there is no lock order to get wrong
//!
//! # Table Epochs
//! When a table is destroyed, its sequence high-water mark is remembered.
//! A later table for the same endpoint starts above it, so ids issued by
//! the old table never match the new one.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;

use spin::{Mutex, RwLock};

use super::endpoint::Endpoint;
use super::error::GrantError;
use super::id::{next_sequence, GrantId};
use super::rights::GrantFlags;
use super::slot::{GrantEntry, Payload};
use super::table::{GrantTable, DEFAULT_CAPACITY, MAX_CAPACITY};
use crate::mm::VirtAddr;

/// Indirect levels allowed between a presented grant and the grant that
/// names memory. With 1, an indirect grant may only re-export a direct or
/// magic grant.
pub const MAX_INDIRECTION: usize = 1;

/// Registry tunables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Capacity of tables created without an explicit one.
    pub default_capacity: usize,
}

impl RegistryConfig {
    /// Check the tunables against the limits of the id encoding.
    pub const fn validate(self) -> Result<Self, GrantError> {
        if self.default_capacity == 0 || self.default_capacity > MAX_CAPACITY {
            return Err(GrantError::InvalidCapacity);
        }
        Ok(self)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CAPACITY,
        }
    }
}

type SharedTable = Arc<Mutex<GrantTable>>;

/// All grant tables in the system.
#[derive(Debug)]
pub struct GrantRegistry {
    config: RegistryConfig,
    tables: RwLock<BTreeMap<Endpoint, SharedTable>>,
    /// Sequence floors for endpoints whose table was destroyed.
    floors: Mutex<BTreeMap<Endpoint, u64>>,
    /// Endpoints allowed to create magic grants.
    trusted: RwLock<BTreeSet<Endpoint>>,
}

impl GrantRegistry {
    /// Create a registry with the given tunables.
    pub fn new(config: RegistryConfig) -> Result<Self, GrantError> {
        Ok(Self {
            config: config.validate()?,
            tables: RwLock::new(BTreeMap::new()),
            floors: Mutex::new(BTreeMap::new()),
            trusted: RwLock::new(BTreeSet::new()),
        })
    }

    /// Tunables in effect.
    #[inline]
    pub const fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Give `owner` a table of the default capacity.
    pub fn create_table(&self, owner: Endpoint) -> Result<(), GrantError> {
        self.create_table_with_capacity(owner, self.config.default_capacity)
    }

    /// Give `owner` a table with room for `capacity` grants.
    pub fn create_table_with_capacity(
        &self,
        owner: Endpoint,
        capacity: usize,
    ) -> Result<(), GrantError> {
        let mut tables = self.tables.write();
        if tables.contains_key(&owner) {
            return Err(GrantError::TableExists);
        }
        let floor = self.floors.lock().get(&owner).copied().unwrap_or(0);
        let table = GrantTable::with_sequence_floor(owner, capacity, floor)?;
        tables.insert(owner, Arc::new(Mutex::new(table)));

        log::debug!("{}: grant table created ({} slots, floor {})", owner, capacity, floor);
        Ok(())
    }

    /// Destroy `owner`'s table, invalidating all of its grants at once.
    ///
    /// Does nothing if there is no table.
    pub fn destroy_table(&self, owner: Endpoint) {
        let Some(table) = self.tables.write().remove(&owner) else {
            return;
        };
        let high_water = table.lock().sequence_high_water();
        self.floors.lock().insert(owner, next_sequence(high_water));
        log::debug!("{}: grant table destroyed", owner);
    }

    /// Check if `owner` has a table.
    pub fn has_table(&self, owner: Endpoint) -> bool {
        self.tables.read().contains_key(&owner)
    }

    fn table(&self, owner: Endpoint) -> Option<SharedTable> {
        self.tables.read().get(&owner).cloned()
    }

    /// Run `f` on `owner`'s table with its lock held.
    pub fn with_table<R>(
        &self,
        owner: Endpoint,
        f: impl FnOnce(&mut GrantTable) -> R,
    ) -> Result<R, GrantError> {
        let table = self.table(owner).ok_or(GrantError::NoTable)?;
        let mut guard = table.lock();
        Ok(f(&mut guard))
    }

    /// Copy out a live grant of `owner`'s table.
    ///
    /// The table lock is released before this returns.
    pub fn entry(&self, owner: Endpoint, id: GrantId) -> Result<GrantEntry, GrantError> {
        self.with_table(owner, |table| table.entry(id))?
    }

    /// Allow `endpoint` to create magic grants.
    pub fn trust(&self, endpoint: Endpoint) {
        self.trusted.write().insert(endpoint);
    }

    /// Withdraw the right to create magic grants.
    ///
    /// Magic grants created earlier stay valid until revoked.
    pub fn distrust(&self, endpoint: Endpoint) {
        self.trusted.write().remove(&endpoint);
    }

    /// Check if `endpoint` may create magic grants.
    pub fn is_trusted(&self, endpoint: Endpoint) -> bool {
        self.trusted.read().contains(&endpoint)
    }

    /// Grant `grantee` access to `[addr, addr + len)` of `owner`'s memory.
    pub fn grant_direct(
        &self,
        owner: Endpoint,
        grantee: Endpoint,
        addr: VirtAddr,
        len: usize,
        flags: GrantFlags,
    ) -> Result<GrantId, GrantError> {
        self.with_table(owner, |table| table.grant_direct(grantee, addr, len, flags))?
    }

    /// Re-export to `grantee` the grant `original` that `granter` gave `owner`.
    ///
    /// The original must be live, granted to `owner`, leave room for one
    /// more level below `MAX_INDIRECTION`, and carry every right requested
    /// here.
    pub fn grant_indirect(
        &self,
        owner: Endpoint,
        grantee: Endpoint,
        granter: Endpoint,
        original: GrantId,
        flags: GrantFlags,
    ) -> Result<GrantId, GrantError> {
        let entry = self
            .entry(granter, original)
            .map_err(|_| GrantError::InvalidIdentifier)?;

        if self.indirection_depth(entry)? >= MAX_INDIRECTION {
            log::warn!(
                "{}: re-export of indirect grant {:?} from {} refused",
                owner,
                original,
                granter
            );
            return Err(GrantError::IndirectionTooDeep);
        }
        if !entry.payload.grantee().admits(owner) {
            log::warn!("{}: re-export of {:?} not granted to it", owner, original);
            return Err(GrantError::PermissionDenied);
        }
        if !entry.flags.access().contains(flags.access()) {
            log::warn!(
                "{}: re-export of {:?} would widen {:?} to {:?}",
                owner,
                original,
                entry.flags.access(),
                flags.access()
            );
            return Err(GrantError::PermissionDenied);
        }

        self.with_table(owner, |table| {
            table.grant_indirect(grantee, granter, original, flags)
        })?
    }

    /// Indirect levels from `entry` down to the grant naming memory,
    /// counted no further than `MAX_INDIRECTION`.
    fn indirection_depth(&self, mut entry: GrantEntry) -> Result<usize, GrantError> {
        let mut depth = 0;
        while let Payload::Indirect { granter, grant, .. } = entry.payload {
            depth += 1;
            if depth == MAX_INDIRECTION {
                break;
            }
            entry = self
                .entry(granter, grant)
                .map_err(|_| GrantError::InvalidIdentifier)?;
        }
        Ok(depth)
    }

    /// Grant `grantee` access to `granter`'s memory, made by `actor`.
    ///
    /// The grant lives in `actor`'s table. Only trusted actors may do this.
    pub fn grant_magic(
        &self,
        actor: Endpoint,
        granter: Endpoint,
        grantee: Endpoint,
        addr: VirtAddr,
        len: usize,
        flags: GrantFlags,
    ) -> Result<GrantId, GrantError> {
        if !self.is_trusted(actor) {
            log::warn!("{}: magic grant for {} refused, not trusted", actor, granter);
            return Err(GrantError::PermissionDenied);
        }
        self.with_table(actor, |table| {
            table.grant_magic(granter, grantee, addr, len, flags)
        })?
    }

    /// Revoke one of `owner`'s grants.
    ///
    /// A missing table means every grant is already gone, so this is a
    /// no-op like any other stale revoke.
    pub fn revoke(&self, owner: Endpoint, id: GrantId) {
        let _ = self.with_table(owner, |table| table.revoke(id));
    }

    /// Record a soft fault on `owner`'s grant `id`.
    pub fn mark_faulted(&self, owner: Endpoint, id: GrantId) {
        let _ = self.with_table(owner, |table| table.mark_faulted(id));
    }

    /// Soft-fault marker of `owner`'s grant `id`.
    pub fn fault_marker(&self, owner: Endpoint, id: GrantId) -> Option<GrantId> {
        self.with_table(owner, |table| table.fault_marker(id))
            .ok()
            .flatten()
    }
}

impl Default for GrantRegistry {
    fn default() -> Self {
        Self {
            config: RegistryConfig::default(),
            tables: RwLock::new(BTreeMap::new()),
            floors: Mutex::new(BTreeMap::new()),
            trusted: RwLock::new(BTreeSet::new()),
        }
    }
}
