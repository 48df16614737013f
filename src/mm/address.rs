//! Virtual Address Type
//!
//! Type-safe wrapper for addresses inside a process's address space.
//!
//! # Security Properties
//! - Arithmetic is checked; a window that would wrap is rejected, never
//!   silently truncated
//! - Addresses are never dereferenced here; moving bytes is the job of a
//!   `CopyEngine`

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// Highest canonical lower-half address (48-bit VA).
pub const USER_VIRT_END: usize = 0x0000_FFFF_FFFF_FFFF;

/// A virtual memory address in some process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Create a virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check if this is a canonical lower-half address.
    ///
    /// ARM64 requires bits [63:48] to copy bit 47; user addresses have
    /// all of them clear.
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 <= USER_VIRT_END
    }

    /// Add an offset, or None if the result would wrap.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Get the page number.
    #[inline]
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#018x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Page numbers touched by `[addr, addr + len)`.
///
/// Empty for `len == 0`. Returns None if the range wraps.
pub fn pages_spanned(addr: VirtAddr, len: usize) -> Option<core::ops::Range<usize>> {
    if len == 0 {
        return Some(0..0);
    }
    let last = addr.checked_add(len - 1)?;
    Some(addr.page_number()..last.page_number() + 1)
}
