//! Vectored Safe Copies
//!
//! A batch of independent copies, each between the caller and one other
//! process through a grant of that process.
//!
//! The batch is not transactional: entries run in order, the first failure
//! stops the batch, and entries before it stay done.

use core::fmt;

use super::safecopy::SafeCopier;
use crate::cap::{Endpoint, GrantError, GrantId};
use crate::mm::{CopyEngine, VirtAddr};

/// Maximum number of entries in one batch.
pub const MAX_VECTOR_LEN: usize = 64;

/// One entry of a vectored copy.
///
/// Exactly one of `from` and `to` is the caller, written as
/// `Endpoint::SELF` or the caller's own endpoint. The other side owns
/// `grant`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VectorEntry {
    /// Source process.
    pub from: Endpoint,
    /// Destination process.
    pub to: Endpoint,
    /// Grant of the side that is not the caller.
    pub grant: GrantId,
    /// Offset into the grant.
    pub offset: usize,
    /// Address in the caller's memory.
    pub addr: VirtAddr,
    /// Number of bytes.
    pub len: usize,
}

/// First failing entry of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchError {
    /// Index of the entry that failed; all entries before it completed.
    pub index: usize,
    /// Why it failed.
    pub error: GrantError,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry {}: {}", self.index, self.error)
    }
}

/// Direction of one entry relative to the caller.
enum Direction {
    /// Out of `owner`'s grant into the caller.
    From(Endpoint),
    /// Out of the caller into `owner`'s grant.
    To(Endpoint),
}

impl VectorEntry {
    fn direction(&self, caller: Endpoint) -> Result<Direction, GrantError> {
        let is_caller = |ep: Endpoint| ep == Endpoint::SELF || ep == caller;
        match (is_caller(self.from), is_caller(self.to)) {
            (false, true) if !self.from.is_reserved() => Ok(Direction::From(self.from)),
            (true, false) if !self.to.is_reserved() => Ok(Direction::To(self.to)),
            _ => Err(GrantError::MalformedDescriptor),
        }
    }
}

impl<E: CopyEngine> SafeCopier<'_, E> {
    /// Run a batch of copies on behalf of `caller`.
    ///
    /// Returns the total number of bytes copied.
    pub fn vcopy(&mut self, caller: Endpoint, entries: &[VectorEntry]) -> Result<usize, BatchError> {
        self.vcopy_with(caller, entries, |_| Ok(()))
    }

    /// Like `vcopy`, with `check` vetting each entry just before it runs.
    ///
    /// An entry rejected by `check` stops the batch like any other failed
    /// entry; the entries before it stay done.
    pub fn vcopy_with(
        &mut self,
        caller: Endpoint,
        entries: &[VectorEntry],
        mut check: impl FnMut(&VectorEntry) -> Result<(), GrantError>,
    ) -> Result<usize, BatchError> {
        if entries.len() > MAX_VECTOR_LEN {
            return Err(BatchError {
                index: MAX_VECTOR_LEN,
                error: GrantError::VectorTooLong,
            });
        }

        let mut total: usize = 0;
        for (index, entry) in entries.iter().enumerate() {
            check(entry)
                .and_then(|()| self.vcopy_entry(caller, entry))
                .map_err(|error| {
                    log::debug!("{}: vectored copy stopped at entry {}: {}", caller, index, error);
                    BatchError { index, error }
                })?;
            total = total.saturating_add(entry.len);
        }
        Ok(total)
    }

    fn vcopy_entry(&mut self, caller: Endpoint, entry: &VectorEntry) -> Result<(), GrantError> {
        match entry.direction(caller)? {
            Direction::From(owner) => {
                self.copy_from(caller, owner, entry.grant, entry.offset, entry.addr, entry.len)
            }
            Direction::To(owner) => {
                self.copy_to(caller, owner, entry.grant, entry.offset, entry.addr, entry.len)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap::{GrantFlags, GrantRegistry};
    use crate::mm::{PagedMemory, PAGE_SIZE};

    const A: Endpoint = Endpoint::from_raw(1);
    const B: Endpoint = Endpoint::from_raw(2);
    const C: Endpoint = Endpoint::from_raw(3);
    const BUF: VirtAddr = VirtAddr::new(0x10_0000);

    fn setup() -> (GrantRegistry, PagedMemory) {
        let registry = GrantRegistry::default();
        let mut mem = PagedMemory::new();
        for ep in [A, B, C] {
            registry.create_table(ep).unwrap();
            mem.map(ep, BUF, PAGE_SIZE).unwrap();
        }
        (registry, mem)
    }

    fn read_entry(owner: Endpoint, grant: GrantId, slot: usize) -> VectorEntry {
        VectorEntry {
            from: owner,
            to: Endpoint::SELF,
            grant,
            offset: slot * 4,
            addr: BUF.checked_add(slot * 4).unwrap(),
            len: 4,
        }
    }

    #[test]
    fn test_mixed_directions() {
        let (registry, mut mem) = setup();
        mem.write(A, BUF, b"from").unwrap();
        mem.write(B, BUF.checked_add(64).unwrap(), b"back").unwrap();
        let ga = registry.grant_direct(A, B, BUF, 4, GrantFlags::READ).unwrap();
        let gc = registry.grant_direct(C, B, BUF, 4, GrantFlags::WRITE).unwrap();

        let entries = [
            VectorEntry {
                from: A,
                to: Endpoint::SELF,
                grant: ga,
                offset: 0,
                addr: BUF,
                len: 4,
            },
            VectorEntry {
                from: B,
                to: C,
                grant: gc,
                offset: 0,
                addr: BUF.checked_add(64).unwrap(),
                len: 4,
            },
        ];
        assert_eq!(SafeCopier::new(&registry, &mut mem).vcopy(B, &entries), Ok(8));

        let mut out = [0u8; 4];
        mem.read(B, BUF, &mut out).unwrap();
        assert_eq!(&out, b"from");
        mem.read(C, BUF, &mut out).unwrap();
        assert_eq!(&out, b"back");
    }

    #[test]
    fn test_stops_at_first_failure() {
        let (registry, mut mem) = setup();
        mem.write(A, BUF, b"0000111122223333").unwrap();
        let grant = registry.grant_direct(A, B, BUF, 16, GrantFlags::READ).unwrap();

        let k = 2;
        let mut entries: Vec<VectorEntry> = (0..4).map(|i| read_entry(A, grant, i)).collect();
        entries[k].grant = GrantId::INVALID;

        assert_eq!(
            SafeCopier::new(&registry, &mut mem).vcopy(B, &entries),
            Err(BatchError {
                index: k,
                error: GrantError::InvalidIdentifier
            })
        );

        let mut out = [0u8; 16];
        mem.read(B, BUF, &mut out).unwrap();
        assert_eq!(&out, b"00001111\0\0\0\0\0\0\0\0");
    }

    #[test]
    fn test_malformed_descriptors() {
        let (registry, mut mem) = setup();
        let grant = registry.grant_direct(A, B, BUF, 16, GrantFlags::READ).unwrap();
        let mut copier = SafeCopier::new(&registry, &mut mem);

        let both_self = VectorEntry {
            from: Endpoint::SELF,
            to: B,
            ..read_entry(A, grant, 0)
        };
        let neither = VectorEntry {
            from: A,
            to: C,
            ..read_entry(A, grant, 0)
        };
        let any_side = VectorEntry {
            from: Endpoint::ANY,
            ..read_entry(A, grant, 0)
        };

        for entry in [both_self, neither, any_side] {
            assert_eq!(
                copier.vcopy(B, &[read_entry(A, grant, 0), entry]),
                Err(BatchError {
                    index: 1,
                    error: GrantError::MalformedDescriptor
                })
            );
        }
    }

    #[test]
    fn test_rejected_entry_keeps_earlier_copies() {
        let (registry, mut mem) = setup();
        mem.write(A, BUF, b"0000111122223333").unwrap();
        let grant = registry.grant_direct(A, B, BUF, 16, GrantFlags::READ).unwrap();
        let entries: Vec<VectorEntry> = (0..4).map(|i| read_entry(A, grant, i)).collect();

        let mut seen = 0;
        let result = SafeCopier::new(&registry, &mut mem).vcopy_with(B, &entries, |entry| {
            seen += 1;
            if entry.offset == 8 {
                Err(GrantError::HardFault)
            } else {
                Ok(())
            }
        });
        assert_eq!(
            result,
            Err(BatchError {
                index: 2,
                error: GrantError::HardFault
            })
        );
        assert_eq!(seen, 3);

        let mut out = [0u8; 16];
        mem.read(B, BUF, &mut out).unwrap();
        assert_eq!(&out, b"00001111\0\0\0\0\0\0\0\0");
    }

    /// Accepts every copy without touching memory.
    struct Sink;

    impl CopyEngine for Sink {
        fn copy(
            &mut self,
            _src: Endpoint,
            _src_addr: VirtAddr,
            _dst: Endpoint,
            _dst_addr: VirtAddr,
            _len: usize,
            _fail_fast: bool,
        ) -> Result<(), crate::mm::MemoryFault> {
            Ok(())
        }

        fn fill(
            &mut self,
            _dst: Endpoint,
            _dst_addr: VirtAddr,
            _byte: u8,
            _len: usize,
            _fail_fast: bool,
        ) -> Result<(), crate::mm::MemoryFault> {
            Ok(())
        }
    }

    #[test]
    fn test_total_saturates() {
        let registry = GrantRegistry::default();
        registry.create_table(A).unwrap();
        let half = usize::MAX / 2 + 1;
        let grant = registry
            .grant_direct(A, B, VirtAddr::new(0), half, GrantFlags::READ)
            .unwrap();
        let entry = VectorEntry {
            from: A,
            to: Endpoint::SELF,
            grant,
            offset: 0,
            addr: VirtAddr::new(0),
            len: half,
        };

        let mut sink = Sink;
        assert_eq!(
            SafeCopier::new(&registry, &mut sink).vcopy(B, &[entry, entry]),
            Ok(usize::MAX)
        );
    }

    #[test]
    fn test_too_long() {
        let (registry, mut mem) = setup();
        let grant = registry.grant_direct(A, B, BUF, 4, GrantFlags::READ).unwrap();
        let entries = [read_entry(A, grant, 0); MAX_VECTOR_LEN + 1];
        assert_eq!(
            SafeCopier::new(&registry, &mut mem).vcopy(B, &entries),
            Err(BatchError {
                index: MAX_VECTOR_LEN,
                error: GrantError::VectorTooLong
            })
        );
        assert_eq!(SafeCopier::new(&registry, &mut mem).vcopy(B, &[]), Ok(0));
    }
}
