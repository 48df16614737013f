//! Grant Flags and Access Modes
//!
//! A grant slot's state is summarized by a flag word. Only the rights and
//! the fail-fast bit may be requested by a granting process; the remaining
//! bits describe the slot and are maintained by the table.
//!
//! # Flag Layout
//! ```text
//! ┌────────┬────────┬──────────────────────────────────────────┐
//! │ 0x0001 │ READ   │ grantee may read granter memory          │
//! │ 0x0002 │ WRITE  │ grantee may write granter memory         │
//! │ 0x0010 │ TRY    │ fail fast on non-resident pages          │
//! │ 0x0100 │ USED   │ slot is allocated                        │
//! │ 0x0200 │ DIRECT │ topology: direct                         │
//! │ 0x0400 │ INDIR. │ topology: indirect                       │
//! │ 0x0800 │ MAGIC  │ topology: magic                          │
//! │ 0x1000 │ VALID  │ payload set, grant may be resolved       │
//! └────────┴────────┴──────────────────────────────────────────┘
//! ```

use bitflags::bitflags;

bitflags! {
    /// Flag word of a grant slot.
    ///
    /// Rights can only be narrowed along a chain of grants, never widened.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
    pub struct GrantFlags: u32 {
        /// Read permission.
        const READ = 1 << 0;
        /// Write permission.
        const WRITE = 1 << 1;
        /// Report non-resident pages as a soft fault instead of paging in.
        const TRY = 1 << 4;
        /// Slot is allocated.
        const USED = 1 << 8;
        /// Direct grant.
        const DIRECT = 1 << 9;
        /// Indirect grant.
        const INDIRECT = 1 << 10;
        /// Magic grant.
        const MAGIC = 1 << 11;
        /// Grant is fully set up.
        const VALID = 1 << 12;

        /// Read and write.
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
        /// Bits a granting process may request.
        const REQUESTABLE = Self::READ.bits() | Self::WRITE.bits() | Self::TRY.bits();
        /// Topology bits, mutually exclusive.
        const TOPOLOGY = Self::DIRECT.bits() | Self::INDIRECT.bits() | Self::MAGIC.bits();
    }
}

impl GrantFlags {
    /// The operation rights in this word.
    #[inline]
    pub const fn access(self) -> Self {
        self.intersection(Self::READ_WRITE)
    }

    /// Check if fail-fast was requested.
    #[inline]
    pub const fn fail_fast(self) -> bool {
        self.contains(Self::TRY)
    }
}

/// Direction of a single copy, from the grantee's point of view.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Access {
    /// Granter memory is the source.
    Read,
    /// Granter memory is the destination.
    Write,
}

impl Access {
    /// The right a copy in this direction needs.
    #[inline]
    pub const fn required(self) -> GrantFlags {
        match self {
            Self::Read => GrantFlags::READ,
            Self::Write => GrantFlags::WRITE,
        }
    }
}
