//! Grant Errors

use core::fmt;

/// Error type for grant table, resolution and copy operations.
///
/// Every variant except the two fault variants is detected before any
/// byte is moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantError {
    /// Malformed, out-of-range, revoked or stale grant id.
    InvalidIdentifier,
    /// Access exceeds the granted rights, or the requester is not the grantee.
    PermissionDenied,
    /// The requested window leaves the granted window, or overflows.
    RangeError,
    /// An indirect grant refers to another indirect grant.
    IndirectionTooDeep,
    /// No free slot in the grant table.
    TableExhausted,
    /// Fail-fast grant hit a non-resident page; retry later.
    SoftFault,
    /// The copy could not complete even after paging in.
    HardFault,
    /// Requested flags outside READ, WRITE and TRY.
    InvalidFlags,
    /// A reserved endpoint where a real process is required.
    InvalidEndpoint,
    /// Table capacity of zero or beyond what a grant id can address.
    InvalidCapacity,
    /// The endpoint has no grant table.
    NoTable,
    /// The endpoint already has a grant table.
    TableExists,
    /// Vectored copy entry with neither or both sides being the caller.
    MalformedDescriptor,
    /// Vectored copy with more entries than allowed.
    VectorTooLong,
}

impl GrantError {
    /// Check if the caller should retry rather than give up.
    #[inline]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::SoftFault)
    }
}

impl fmt::Display for GrantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIdentifier => write!(f, "invalid grant identifier"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::RangeError => write!(f, "range outside granted window"),
            Self::IndirectionTooDeep => write!(f, "indirect grant nested too deep"),
            Self::TableExhausted => write!(f, "grant table exhausted"),
            Self::SoftFault => write!(f, "soft fault on non-resident memory"),
            Self::HardFault => write!(f, "hard fault during copy"),
            Self::InvalidFlags => write!(f, "invalid grant flags"),
            Self::InvalidEndpoint => write!(f, "invalid endpoint"),
            Self::InvalidCapacity => write!(f, "invalid grant table capacity"),
            Self::NoTable => write!(f, "no grant table"),
            Self::TableExists => write!(f, "grant table already exists"),
            Self::MalformedDescriptor => write!(f, "malformed copy descriptor"),
            Self::VectorTooLong => write!(f, "copy vector too long"),
        }
    }
}
