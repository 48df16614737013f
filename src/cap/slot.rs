//! Grant Slots
//!
//! One entry of a grant table. The topology of a live grant is carried by
//! the `Payload` variant, so a slot can never be direct and magic at once.
//!
//! # Slot Structure
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      GrantSlot                           │
//! ├──────────────────────────────────────────────────────────┤
//! │  rights: GrantFlags     - READ / WRITE / TRY             │
//! │  sequence: u64          - bumped on every allocation     │
//! │  state: SlotState       - Free | Reserved | Live(payload)│
//! │  fault_marker           - id of last soft-faulted grant  │
//! └──────────────────────────────────────────────────────────┘
//! ```

use super::endpoint::Endpoint;
use super::id::GrantId;
use super::rights::GrantFlags;
use crate::mm::VirtAddr;

/// What a live grant exposes, and to whom.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Payload {
    /// The owner's own memory.
    Direct {
        /// Process allowed to use the grant, or `Endpoint::ANY`.
        grantee: Endpoint,
        /// Start of the window in the owner's address space.
        addr: VirtAddr,
        /// Window size in bytes.
        len: usize,
    },
    /// Re-export of a grant the owner itself received.
    Indirect {
        /// Process allowed to use the grant, or `Endpoint::ANY`.
        grantee: Endpoint,
        /// Owner of the table holding the original grant.
        granter: Endpoint,
        /// The original grant.
        grant: GrantId,
    },
    /// Grant made by a trusted process on behalf of `granter`.
    Magic {
        /// Process whose memory is exposed.
        granter: Endpoint,
        /// Process allowed to use the grant, or `Endpoint::ANY`.
        grantee: Endpoint,
        /// Start of the window in the granter's address space.
        addr: VirtAddr,
        /// Window size in bytes.
        len: usize,
    },
}

impl Payload {
    /// The endpoint allowed to present this grant.
    #[inline]
    pub const fn grantee(&self) -> Endpoint {
        match *self {
            Self::Direct { grantee, .. }
            | Self::Indirect { grantee, .. }
            | Self::Magic { grantee, .. } => grantee,
        }
    }

    /// The topology bit for this payload.
    #[inline]
    pub const fn topology(&self) -> GrantFlags {
        match self {
            Self::Direct { .. } => GrantFlags::DIRECT,
            Self::Indirect { .. } => GrantFlags::INDIRECT,
            Self::Magic { .. } => GrantFlags::MAGIC,
        }
    }
}

/// Copy of a live grant, taken under the table lock.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct GrantEntry {
    /// Full flag word: USED, VALID, topology and requested bits.
    pub flags: GrantFlags,
    /// Topology-specific fields.
    pub payload: Payload,
}

#[derive(Clone, Copy, Debug)]
pub(super) enum SlotState {
    Free,
    /// Allocated, payload not set yet.
    Reserved,
    Live(Payload),
}

#[derive(Clone, Copy, Debug)]
pub(super) struct GrantSlot {
    pub(super) rights: GrantFlags,
    pub(super) sequence: u64,
    pub(super) state: SlotState,
    pub(super) fault_marker: Option<GrantId>,
}

impl GrantSlot {
    pub(super) const fn free(sequence: u64) -> Self {
        Self {
            rights: GrantFlags::empty(),
            sequence,
            state: SlotState::Free,
            fault_marker: None,
        }
    }

    #[inline]
    pub(super) const fn is_free(&self) -> bool {
        matches!(self.state, SlotState::Free)
    }

    /// Flag word as seen from outside the table.
    pub(super) fn flags(&self) -> GrantFlags {
        match self.state {
            SlotState::Free => GrantFlags::empty(),
            SlotState::Reserved => GrantFlags::USED | self.rights,
            SlotState::Live(payload) => {
                GrantFlags::USED | GrantFlags::VALID | payload.topology() | self.rights
            }
        }
    }

    /// Clear the slot, keeping its sequence.
    pub(super) fn release(&mut self) {
        *self = Self::free(self.sequence);
    }
}
