//! Grant Identifier Codec
//!
//! A grant id packs a slot index and that slot's sequence number into one
//! signed 64-bit value:
//!
//! ```text
//!  63  62                                   20 19                 0
//! ┌───┬───────────────────────────────────────┬────────────────────┐
//! │ 0 │           sequence (43 bits)          │   index (20 bits)  │
//! └───┴───────────────────────────────────────┴────────────────────┘
//! ```
//!
//! The sign bit is never set by the codec, so every encoded id is greater
//! than `GrantId::INVALID` (-1).

use core::fmt;

/// Bits used for the slot index.
pub const INDEX_BITS: u32 = 20;

/// Bits used for the sequence number.
pub const SEQUENCE_BITS: u32 = 43;

/// Largest table a grant id can address.
pub const MAX_INDEX: usize = 1 << INDEX_BITS;

/// Exclusive upper bound of a sequence number.
pub const MAX_SEQUENCE: u64 = 1 << SEQUENCE_BITS;

const INDEX_MASK: i64 = (1 << INDEX_BITS) - 1;
const SEQUENCE_MASK: u64 = MAX_SEQUENCE - 1;

/// Opaque grant identifier handed to grantees.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct GrantId(i64);

impl GrantId {
    /// Reserved value, never produced by an allocation.
    pub const INVALID: Self = Self(-1);

    /// Pack an index and a sequence number.
    ///
    /// # Panics
    /// Panics if `index >= MAX_INDEX` or `sequence >= MAX_SEQUENCE`.
    /// Either would alias another slot or epoch.
    #[inline]
    pub const fn encode(index: usize, sequence: u64) -> Self {
        assert!(index < MAX_INDEX, "grant index out of range");
        assert!(sequence < MAX_SEQUENCE, "grant sequence out of range");
        Self(((sequence as i64) << INDEX_BITS) | index as i64)
    }

    /// Unpack into `(index, sequence)`.
    ///
    /// Returns None for INVALID and any other negative value.
    #[inline]
    pub const fn decode(self) -> Option<(usize, u64)> {
        if !self.is_valid() {
            return None;
        }
        Some(((self.0 & INDEX_MASK) as usize, (self.0 >> INDEX_BITS) as u64))
    }

    /// Reinterpret a raw value received from another process.
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Check if the id could have come from an allocation.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 > Self::INVALID.0
    }
}

impl fmt::Debug for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.decode() {
            Some((index, sequence)) => write!(f, "GrantId({}@{})", index, sequence),
            None => write!(f, "GrantId(invalid:{})", self.0),
        }
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequence number following `sequence`, wrapping within the field.
#[inline]
pub const fn next_sequence(sequence: u64) -> u64 {
    sequence.wrapping_add(1) & SEQUENCE_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_edges() {
        let id = GrantId::encode(MAX_INDEX - 1, MAX_SEQUENCE - 1);
        assert!(id.is_valid());
        assert_eq!(id.raw(), i64::MAX);
        assert_eq!(id.decode(), Some((MAX_INDEX - 1, MAX_SEQUENCE - 1)));

        let zero = GrantId::encode(0, 0);
        assert!(zero.is_valid());
        assert_eq!(zero.decode(), Some((0, 0)));
    }

    #[test]
    fn test_invalid_never_decodes() {
        assert_eq!(GrantId::INVALID.decode(), None);
        assert_eq!(GrantId::from_raw(i64::MIN).decode(), None);
        assert!(!GrantId::from_raw(-7).is_valid());
    }

    #[test]
    fn test_sequence_wraps_within_field() {
        assert_eq!(next_sequence(5), 6);
        assert_eq!(next_sequence(MAX_SEQUENCE - 1), 0);
    }

    #[test]
    #[should_panic(expected = "grant index out of range")]
    fn test_index_precondition() {
        let _ = GrantId::encode(MAX_INDEX, 0);
    }
}
