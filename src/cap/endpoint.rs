//! Process Endpoints
//!
//! An endpoint names a process in grant payloads and copy requests.
//! A few values are reserved and never name a real process.

use core::fmt;

/// Identity of a process as seen by the grant subsystem.
///
/// This is a newtype so endpoints cannot be confused with slot indices,
/// byte counts or raw grant ids.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Endpoint(u32);

impl Endpoint {
    /// Wildcard grantee: any requester matches.
    pub const ANY: Self = Self(0x7ace);

    /// No process at all.
    pub const NONE: Self = Self(0x6ace);

    /// The calling process, used in vectored copy descriptors.
    pub const SELF: Self = Self(0x8ace);

    /// Create an endpoint for a real process.
    ///
    /// Returns None for the reserved values.
    #[inline]
    pub const fn new(raw: u32) -> Option<Self> {
        let ep = Self(raw);
        if ep.is_reserved() {
            None
        } else {
            Some(ep)
        }
    }

    /// Reinterpret a raw value, reserved values included.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check if this is one of ANY, NONE or SELF.
    #[inline]
    pub const fn is_reserved(self) -> bool {
        self.0 == Self::ANY.0 || self.0 == Self::NONE.0 || self.0 == Self::SELF.0
    }

    /// Check if a grant recorded for `self` may be used by `requester`.
    #[inline]
    pub const fn admits(self, requester: Self) -> bool {
        self.0 == Self::ANY.0 || self.0 == requester.0
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ANY => write!(f, "Endpoint(ANY)"),
            Self::NONE => write!(f, "Endpoint(NONE)"),
            Self::SELF => write!(f, "Endpoint(SELF)"),
            Self(raw) => write!(f, "Endpoint({})", raw),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_values_rejected() {
        assert!(Endpoint::new(Endpoint::ANY.raw()).is_none());
        assert!(Endpoint::new(Endpoint::SELF.raw()).is_none());
        assert!(Endpoint::new(Endpoint::NONE.raw()).is_none());
        assert_eq!(Endpoint::new(7).map(Endpoint::raw), Some(7));
    }

    #[test]
    fn test_admits() {
        let a = Endpoint::from_raw(10);
        let b = Endpoint::from_raw(11);
        assert!(a.admits(a));
        assert!(!a.admits(b));
        assert!(Endpoint::ANY.admits(b));
    }
}
