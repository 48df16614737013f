//! Copy Engines
//!
//! The grant core decides *whether* a copy may happen; a `CopyEngine`
//! moves the bytes. In the kernel this is the VM layer. `PagedMemory` is
//! a self-contained engine over sparse per-process pages, used for hosted
//! builds and tests.
//!
//! # Engine Contract
//! - Move exactly `len` bytes, or report a fault
//! - Non-resident pages are paged in, unless `fail_fast` is set, in which
//!   case the copy stops with `MemoryFault::Soft`
//! - Unmapped memory is `MemoryFault::Hard`
//! - Permission and range checks are not the engine's job; the resolver
//!   has done them before the engine is called

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec;

use super::address::{pages_spanned, VirtAddr, PAGE_SIZE};
use crate::cap::{Endpoint, GrantError};

/// Fault reported by a copy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFault {
    /// A page was not resident and fail-fast was requested.
    Soft,
    /// The memory does not exist.
    Hard,
}

impl From<MemoryFault> for GrantError {
    fn from(fault: MemoryFault) -> Self {
        match fault {
            MemoryFault::Soft => Self::SoftFault,
            MemoryFault::Hard => Self::HardFault,
        }
    }
}

/// Moves bytes between process address spaces.
pub trait CopyEngine {
    /// Copy `len` bytes from `src`'s memory to `dst`'s memory.
    fn copy(
        &mut self,
        src: Endpoint,
        src_addr: VirtAddr,
        dst: Endpoint,
        dst_addr: VirtAddr,
        len: usize,
        fail_fast: bool,
    ) -> Result<(), MemoryFault>;

    /// Set `len` bytes of `dst`'s memory to `byte`.
    fn fill(
        &mut self,
        dst: Endpoint,
        dst_addr: VirtAddr,
        byte: u8,
        len: usize,
        fail_fast: bool,
    ) -> Result<(), MemoryFault>;
}

#[derive(Debug)]
struct Page {
    data: Box<[u8; PAGE_SIZE]>,
    resident: bool,
}

/// Sparse paged memory for any number of processes.
///
/// Pages are mapped explicitly and can be evicted; evicted pages keep
/// their contents and come back when touched without fail-fast.
#[derive(Debug, Default)]
pub struct PagedMemory {
    pages: BTreeMap<(Endpoint, usize), Page>,
    page_ins: usize,
}

impl PagedMemory {
    /// Create an empty memory with nothing mapped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map zeroed, resident pages covering `[addr, addr + len)`.
    ///
    /// Pages already mapped are left alone.
    pub fn map(&mut self, ep: Endpoint, addr: VirtAddr, len: usize) -> Result<(), MemoryFault> {
        for page in pages_spanned(addr, len).ok_or(MemoryFault::Hard)? {
            self.pages.entry((ep, page)).or_insert_with(|| Page {
                data: Box::new([0; PAGE_SIZE]),
                resident: true,
            });
        }
        Ok(())
    }

    /// Remove the pages covering `[addr, addr + len)`.
    pub fn unmap(&mut self, ep: Endpoint, addr: VirtAddr, len: usize) {
        if let Some(pages) = pages_spanned(addr, len) {
            for page in pages {
                self.pages.remove(&(ep, page));
            }
        }
    }

    /// Mark the pages covering `[addr, addr + len)` as not resident.
    pub fn evict(&mut self, ep: Endpoint, addr: VirtAddr, len: usize) {
        if let Some(pages) = pages_spanned(addr, len) {
            for page in pages {
                if let Some(page) = self.pages.get_mut(&(ep, page)) {
                    page.resident = false;
                }
            }
        }
    }

    /// Check if the page holding `addr` is mapped and resident.
    pub fn is_resident(&self, ep: Endpoint, addr: VirtAddr) -> bool {
        self.pages
            .get(&(ep, addr.page_number()))
            .is_some_and(|page| page.resident)
    }

    /// Number of pages brought back in so far.
    pub fn page_ins(&self) -> usize {
        self.page_ins
    }

    /// Read process memory, paging in as needed.
    pub fn read(&mut self, ep: Endpoint, addr: VirtAddr, buf: &mut [u8]) -> Result<(), MemoryFault> {
        self.prepare(ep, addr, buf.len(), false)?;
        self.read_prepared(ep, addr, buf);
        Ok(())
    }

    /// Write process memory, paging in as needed.
    pub fn write(&mut self, ep: Endpoint, addr: VirtAddr, data: &[u8]) -> Result<(), MemoryFault> {
        self.prepare(ep, addr, data.len(), false)?;
        self.write_prepared(ep, addr, data);
        Ok(())
    }

    /// Check a range without changing anything.
    ///
    /// Unmapped pages win over non-resident ones.
    fn probe(&self, ep: Endpoint, addr: VirtAddr, len: usize, fail_fast: bool) -> Result<(), MemoryFault> {
        let mut soft = false;
        for page in pages_spanned(addr, len).ok_or(MemoryFault::Hard)? {
            match self.pages.get(&(ep, page)) {
                None => return Err(MemoryFault::Hard),
                Some(page) if !page.resident && fail_fast => soft = true,
                Some(_) => {}
            }
        }
        if soft {
            Err(MemoryFault::Soft)
        } else {
            Ok(())
        }
    }

    fn page_in(&mut self, ep: Endpoint, addr: VirtAddr, len: usize) {
        if let Some(pages) = pages_spanned(addr, len) {
            for page in pages {
                if let Some(page) = self.pages.get_mut(&(ep, page)) {
                    if !page.resident {
                        page.resident = true;
                        self.page_ins += 1;
                    }
                }
            }
        }
    }

    fn prepare(&mut self, ep: Endpoint, addr: VirtAddr, len: usize, fail_fast: bool) -> Result<(), MemoryFault> {
        self.probe(ep, addr, len, fail_fast)?;
        self.page_in(ep, addr, len);
        Ok(())
    }

    /// Copy out of pages that `prepare` accepted.
    fn read_prepared(&self, ep: Endpoint, addr: VirtAddr, buf: &mut [u8]) {
        let mut cursor = addr.as_usize();
        for chunk in chunks(addr, buf.len()) {
            let at = VirtAddr::new(cursor);
            if let Some(page) = self.pages.get(&(ep, at.page_number())) {
                let offset = at.page_offset();
                buf[chunk.clone()].copy_from_slice(&page.data[offset..offset + chunk.len()]);
            }
            cursor += chunk.len();
        }
    }

    /// Copy into pages that `prepare` accepted.
    fn write_prepared(&mut self, ep: Endpoint, addr: VirtAddr, data: &[u8]) {
        let mut cursor = addr.as_usize();
        for chunk in chunks(addr, data.len()) {
            let at = VirtAddr::new(cursor);
            if let Some(page) = self.pages.get_mut(&(ep, at.page_number())) {
                let offset = at.page_offset();
                page.data[offset..offset + chunk.len()].copy_from_slice(&data[chunk.clone()]);
            }
            cursor += chunk.len();
        }
    }
}

/// Split `[0, len)` into runs that each stay within one page of `addr`.
fn chunks(addr: VirtAddr, len: usize) -> impl Iterator<Item = core::ops::Range<usize>> {
    let first = (PAGE_SIZE - addr.page_offset()).min(len);
    let mut start = 0;
    let mut next = first;
    core::iter::from_fn(move || {
        if start >= len {
            return None;
        }
        let run = start..next;
        start = next;
        next = (next + PAGE_SIZE).min(len);
        Some(run)
    })
}

impl CopyEngine for PagedMemory {
    fn copy(
        &mut self,
        src: Endpoint,
        src_addr: VirtAddr,
        dst: Endpoint,
        dst_addr: VirtAddr,
        len: usize,
        fail_fast: bool,
    ) -> Result<(), MemoryFault> {
        // Both sides are checked before either is paged in.
        self.probe(src, src_addr, len, fail_fast)?;
        self.probe(dst, dst_addr, len, fail_fast)?;
        self.page_in(src, src_addr, len);
        self.page_in(dst, dst_addr, len);

        let mut buf = vec![0; len];
        self.read_prepared(src, src_addr, &mut buf);
        self.write_prepared(dst, dst_addr, &buf);
        Ok(())
    }

    fn fill(
        &mut self,
        dst: Endpoint,
        dst_addr: VirtAddr,
        byte: u8,
        len: usize,
        fail_fast: bool,
    ) -> Result<(), MemoryFault> {
        self.prepare(dst, dst_addr, len, fail_fast)?;
        self.write_prepared(dst, dst_addr, &vec![byte; len]);
        Ok(())
    }
}
