//! Grant Table
//!
//! A grant table holds the grants one process has handed out.
//! Grants are addressed by `GrantId`, never by raw index.
//!
//! # Design
//! - Fixed-capacity slot arena, allocated once
//! - Separate stack of free indices, lowest index handed out first
//! - Every allocation bumps the slot's sequence number, so an id from an
//!   earlier allocation of the same slot is rejected
//! - Revocation of an unknown or stale id is a no-op

use alloc::vec::Vec;

use super::endpoint::Endpoint;
use super::error::GrantError;
use super::id::{next_sequence, GrantId, MAX_INDEX, MAX_SEQUENCE};
use super::rights::GrantFlags;
use super::slot::{GrantEntry, GrantSlot, Payload, SlotState};
use crate::mm::VirtAddr;

/// Number of slots a table gets unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 64;

/// Largest table a grant id can address.
pub const MAX_CAPACITY: usize = MAX_INDEX;

/// Grant table of one process.
#[derive(Debug)]
pub struct GrantTable {
    /// Process whose grants these are.
    owner: Endpoint,
    /// Slot arena.
    slots: Vec<GrantSlot>,
    /// Free slot indices; the top is handed out next.
    free: Vec<u32>,
    /// Highest sequence number issued by this table.
    high_water: u64,
}

impl GrantTable {
    /// Create an empty table with room for `capacity` grants.
    pub fn new(owner: Endpoint, capacity: usize) -> Result<Self, GrantError> {
        Self::with_sequence_floor(owner, capacity, 0)
    }

    /// Create an empty table whose first ids use sequences above `floor`.
    ///
    /// Used when a process gets a fresh table, so that ids issued by its
    /// previous table can never match.
    pub fn with_sequence_floor(
        owner: Endpoint,
        capacity: usize,
        floor: u64,
    ) -> Result<Self, GrantError> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(GrantError::InvalidCapacity);
        }
        if owner.is_reserved() {
            return Err(GrantError::InvalidEndpoint);
        }

        let floor = floor % MAX_SEQUENCE;
        let slots = (0..capacity).map(|_| GrantSlot::free(floor)).collect();
        let free = (0..capacity as u32).rev().collect();

        Ok(Self {
            owner,
            slots,
            free,
            high_water: floor,
        })
    }

    /// Process whose grants these are.
    #[inline]
    pub const fn owner(&self) -> Endpoint {
        self.owner
    }

    /// Maximum number of simultaneous grants.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of allocated slots, reserved ones included.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Highest sequence number issued so far.
    #[inline]
    pub const fn sequence_high_water(&self) -> u64 {
        self.high_water
    }

    /// Find the slot an id refers to, if the id is current.
    ///
    /// Free slots never match.
    fn slot_index(&self, id: GrantId) -> Option<usize> {
        let (index, sequence) = id.decode()?;
        let slot = self.slots.get(index)?;
        if slot.is_free() || slot.sequence != sequence {
            return None;
        }
        Some(index)
    }

    /// Allocate a slot without making it resolvable yet.
    ///
    /// The returned id is valid for the `set_*` calls and for `revoke`,
    /// but resolves as an invalid identifier until a payload is set.
    pub fn reserve(&mut self) -> Result<GrantId, GrantError> {
        let Some(index) = self.free.pop() else {
            log::warn!("grant table of {} exhausted ({} slots)", self.owner, self.capacity());
            return Err(GrantError::TableExhausted);
        };
        let index = index as usize;

        let slot = &mut self.slots[index];
        slot.sequence = next_sequence(slot.sequence);
        slot.state = SlotState::Reserved;
        slot.rights = GrantFlags::empty();
        slot.fault_marker = None;
        self.high_water = self.high_water.max(slot.sequence);

        Ok(GrantId::encode(index, slot.sequence))
    }

    /// Store a payload in a reserved or live slot.
    fn set(&mut self, id: GrantId, payload: Payload, flags: GrantFlags) -> Result<(), GrantError> {
        if !GrantFlags::REQUESTABLE.contains(flags) {
            return Err(GrantError::InvalidFlags);
        }
        let grantee = payload.grantee();
        if grantee == Endpoint::SELF || grantee == Endpoint::NONE {
            return Err(GrantError::InvalidEndpoint);
        }

        let index = self.slot_index(id).ok_or(GrantError::InvalidIdentifier)?;
        let slot = &mut self.slots[index];
        slot.rights = flags;
        slot.state = SlotState::Live(payload);
        slot.fault_marker = None;

        log::debug!("{}: grant {:?} set to {:?} ({:?})", self.owner, id, payload, flags);
        Ok(())
    }

    /// Make a reserved slot a direct grant of `[addr, addr + len)`.
    pub fn set_direct(
        &mut self,
        id: GrantId,
        grantee: Endpoint,
        addr: VirtAddr,
        len: usize,
        flags: GrantFlags,
    ) -> Result<(), GrantError> {
        addr.checked_add(len).ok_or(GrantError::RangeError)?;
        self.set(id, Payload::Direct { grantee, addr, len }, flags)
    }

    /// Make a reserved slot an indirect grant re-exporting `grant` from
    /// the table of `granter`.
    pub fn set_indirect(
        &mut self,
        id: GrantId,
        grantee: Endpoint,
        granter: Endpoint,
        grant: GrantId,
        flags: GrantFlags,
    ) -> Result<(), GrantError> {
        if granter.is_reserved() {
            return Err(GrantError::InvalidEndpoint);
        }
        if !grant.is_valid() {
            return Err(GrantError::InvalidIdentifier);
        }
        self.set(id, Payload::Indirect { grantee, granter, grant }, flags)
    }

    /// Make a reserved slot a magic grant of `granter`'s memory.
    pub fn set_magic(
        &mut self,
        id: GrantId,
        granter: Endpoint,
        grantee: Endpoint,
        addr: VirtAddr,
        len: usize,
        flags: GrantFlags,
    ) -> Result<(), GrantError> {
        if granter.is_reserved() {
            return Err(GrantError::InvalidEndpoint);
        }
        addr.checked_add(len).ok_or(GrantError::RangeError)?;
        self.set(id, Payload::Magic { granter, grantee, addr, len }, flags)
    }

    /// Reserve a slot and fill it; the slot is released again on failure.
    fn allocate(
        &mut self,
        fill: impl FnOnce(&mut Self, GrantId) -> Result<(), GrantError>,
    ) -> Result<GrantId, GrantError> {
        let id = self.reserve()?;
        if let Err(e) = fill(self, id) {
            self.revoke(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Grant `grantee` access to `[addr, addr + len)` of the owner's memory.
    pub fn grant_direct(
        &mut self,
        grantee: Endpoint,
        addr: VirtAddr,
        len: usize,
        flags: GrantFlags,
    ) -> Result<GrantId, GrantError> {
        self.allocate(|table, id| table.set_direct(id, grantee, addr, len, flags))
    }

    /// Re-export to `grantee` a grant this table's owner received from
    /// `granter`.
    ///
    /// The table cannot see `granter`'s table, so the original is only
    /// checked at resolution time here. `GrantRegistry::grant_indirect`
    /// also checks it up front.
    pub fn grant_indirect(
        &mut self,
        grantee: Endpoint,
        granter: Endpoint,
        grant: GrantId,
        flags: GrantFlags,
    ) -> Result<GrantId, GrantError> {
        self.allocate(|table, id| table.set_indirect(id, grantee, granter, grant, flags))
    }

    /// Grant `grantee` access to `granter`'s memory on its behalf.
    ///
    /// Whether the owner may do this is decided by the registry.
    pub fn grant_magic(
        &mut self,
        granter: Endpoint,
        grantee: Endpoint,
        addr: VirtAddr,
        len: usize,
        flags: GrantFlags,
    ) -> Result<GrantId, GrantError> {
        self.allocate(|table, id| table.set_magic(id, granter, grantee, addr, len, flags))
    }

    /// Revoke a grant.
    ///
    /// Ids that are invalid, out of range, stale or already revoked are
    /// ignored; no other slot is touched.
    pub fn revoke(&mut self, id: GrantId) {
        let Some(index) = self.slot_index(id) else {
            log::trace!("{}: revoke of {:?} ignored", self.owner, id);
            return;
        };
        self.slots[index].release();
        self.free.push(index as u32);
        log::debug!("{}: grant {:?} revoked", self.owner, id);
    }

    /// Look up a live grant.
    ///
    /// Reserved slots are not live.
    pub fn entry(&self, id: GrantId) -> Result<GrantEntry, GrantError> {
        let index = self.slot_index(id).ok_or(GrantError::InvalidIdentifier)?;
        let slot = &self.slots[index];
        match slot.state {
            SlotState::Live(payload) => Ok(GrantEntry {
                flags: slot.flags(),
                payload,
            }),
            SlotState::Free | SlotState::Reserved => Err(GrantError::InvalidIdentifier),
        }
    }

    /// Flag word of a current id, reserved slots included.
    pub fn flags(&self, id: GrantId) -> Option<GrantFlags> {
        self.slot_index(id).map(|index| self.slots[index].flags())
    }

    /// Record that a copy through `id` hit a soft fault.
    pub fn mark_faulted(&mut self, id: GrantId) {
        if let Some(index) = self.slot_index(id) {
            self.slots[index].fault_marker = Some(id);
        }
    }

    /// The soft-fault marker of a current id.
    pub fn fault_marker(&self, id: GrantId) -> Option<GrantId> {
        self.slot_index(id)
            .and_then(|index| self.slots[index].fault_marker)
    }

    /// Clear the soft-fault marker, returning the old one.
    pub fn clear_fault(&mut self, id: GrantId) -> Option<GrantId> {
        let index = self.slot_index(id)?;
        self.slots[index].fault_marker.take()
    }
}
