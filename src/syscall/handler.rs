//! Kernel Call Handler
//!
//! Dispatches grant kernel calls and implements the individual handlers.
//!
//! # Security Considerations
//! - The caller endpoint comes from the kernel, never from the arguments
//! - Every raw argument is validated before use
//! - Errors are returned as negative codes, never as panics

use super::validate;
use crate::cap::{Endpoint, GrantError, GrantId, GrantRegistry};
use crate::copy::{SafeCopier, VectorEntry};
use crate::mm::CopyEngine;

/// Kernel call numbers
pub mod numbers {
    pub const SYS_SETGRANT: usize = 0;
    pub const SYS_GRANT_DIRECT: usize = 1;
    pub const SYS_GRANT_INDIRECT: usize = 2;
    pub const SYS_GRANT_MAGIC: usize = 3;
    pub const SYS_REVOKE: usize = 4;
    pub const SYS_SAFECOPYFROM: usize = 5;
    pub const SYS_SAFECOPYTO: usize = 6;
    pub const SYS_VSAFECOPY: usize = 7;
    pub const SYS_SAFEMEMSET: usize = 8;
}

/// Kernel call error codes
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Operation not permitted
    Eperm = -1,
    /// No such process (no grant table)
    Esrch = -3,
    /// Bad address, or the copy faulted for good
    Efault = -14,
    /// Grant table already set
    Eexist = -17,
    /// Invalid argument
    Einval = -22,
    /// Grant table full
    Enospc = -28,
    /// Outside the granted window
    Erange = -34,
    /// Indirect grant of an indirect grant
    Eloop = -40,
    /// Page not resident and fail-fast requested; retry later
    EfaultSoft = -995,
}

impl From<GrantError> for SyscallError {
    fn from(e: GrantError) -> Self {
        match e {
            GrantError::PermissionDenied => Self::Eperm,
            GrantError::NoTable => Self::Esrch,
            GrantError::HardFault => Self::Efault,
            GrantError::TableExists => Self::Eexist,
            GrantError::TableExhausted => Self::Enospc,
            GrantError::RangeError => Self::Erange,
            GrantError::IndirectionTooDeep => Self::Eloop,
            GrantError::SoftFault => Self::EfaultSoft,
            GrantError::InvalidIdentifier
            | GrantError::InvalidFlags
            | GrantError::InvalidEndpoint
            | GrantError::InvalidCapacity
            | GrantError::MalformedDescriptor
            | GrantError::VectorTooLong => Self::Einval,
        }
    }
}

/// A kernel call with its raw arguments.
#[derive(Debug, Clone, Copy)]
pub enum KernelCall<'a> {
    /// Give the caller a grant table.
    SetGrant { capacity: usize },
    /// Direct grant of the caller's memory.
    GrantDirect {
        grantee: u32,
        addr: usize,
        len: usize,
        flags: u32,
    },
    /// Re-export a grant the caller received from `granter`.
    GrantIndirect {
        grantee: u32,
        granter: u32,
        grant: i64,
        flags: u32,
    },
    /// Grant of `granter`'s memory made by the (trusted) caller.
    GrantMagic {
        granter: u32,
        grantee: u32,
        addr: usize,
        len: usize,
        flags: u32,
    },
    /// Revoke one of the caller's grants.
    Revoke { grant: i64 },
    /// Copy from `owner`'s grant into the caller.
    SafeCopyFrom {
        owner: u32,
        grant: i64,
        offset: usize,
        addr: usize,
        len: usize,
    },
    /// Copy from the caller into `owner`'s grant.
    SafeCopyTo {
        owner: u32,
        grant: i64,
        offset: usize,
        addr: usize,
        len: usize,
    },
    /// Batch of copies.
    VSafeCopy { entries: &'a [VectorEntry] },
    /// Fill part of `owner`'s grant with a byte.
    SafeMemset {
        owner: u32,
        grant: i64,
        offset: usize,
        byte: u8,
        len: usize,
    },
}

impl KernelCall<'_> {
    /// The call number.
    pub const fn number(&self) -> usize {
        match self {
            Self::SetGrant { .. } => numbers::SYS_SETGRANT,
            Self::GrantDirect { .. } => numbers::SYS_GRANT_DIRECT,
            Self::GrantIndirect { .. } => numbers::SYS_GRANT_INDIRECT,
            Self::GrantMagic { .. } => numbers::SYS_GRANT_MAGIC,
            Self::Revoke { .. } => numbers::SYS_REVOKE,
            Self::SafeCopyFrom { .. } => numbers::SYS_SAFECOPYFROM,
            Self::SafeCopyTo { .. } => numbers::SYS_SAFECOPYTO,
            Self::VSafeCopy { .. } => numbers::SYS_VSAFECOPY,
            Self::SafeMemset { .. } => numbers::SYS_SAFEMEMSET,
        }
    }
}

/// Dispatch a kernel call
///
/// # Arguments
/// * `registry` - All grant tables
/// * `engine` - Moves bytes for the copy calls
/// * `caller` - Endpoint of the calling process, as known to the kernel
/// * `call` - The call and its raw arguments
///
/// # Returns
/// A grant id for the grant calls, the number of bytes moved for the copy
/// calls, 0 otherwise, or a negative error code
pub fn dispatch<E: CopyEngine>(
    registry: &GrantRegistry,
    engine: &mut E,
    caller: Endpoint,
    call: KernelCall<'_>,
) -> i64 {
    let number = call.number();
    match handle(registry, engine, caller, call) {
        Ok(value) => value,
        Err(e) => {
            log::debug!("[SYSCALL] {} from {} failed: {:?}", number, caller, e);
            e as i64
        }
    }
}

fn handle<E: CopyEngine>(
    registry: &GrantRegistry,
    engine: &mut E,
    caller: Endpoint,
    call: KernelCall<'_>,
) -> Result<i64, SyscallError> {
    match call {
        KernelCall::SetGrant { capacity } => {
            registry.create_table_with_capacity(caller, capacity)?;
            Ok(0)
        }
        KernelCall::GrantDirect {
            grantee,
            addr,
            len,
            flags,
        } => {
            let addr = validate::user_window(addr, len)?;
            let id = registry.grant_direct(
                caller,
                validate::grantee(grantee)?,
                addr,
                len,
                validate::grant_flags(flags)?,
            )?;
            Ok(id.raw())
        }
        KernelCall::GrantIndirect {
            grantee,
            granter,
            grant,
            flags,
        } => {
            let id = registry.grant_indirect(
                caller,
                validate::grantee(grantee)?,
                validate::endpoint(granter)?,
                validate::grant_id(grant)?,
                validate::grant_flags(flags)?,
            )?;
            Ok(id.raw())
        }
        KernelCall::GrantMagic {
            granter,
            grantee,
            addr,
            len,
            flags,
        } => {
            let addr = validate::user_window(addr, len)?;
            let id = registry.grant_magic(
                caller,
                validate::endpoint(granter)?,
                validate::grantee(grantee)?,
                addr,
                len,
                validate::grant_flags(flags)?,
            )?;
            Ok(id.raw())
        }
        KernelCall::Revoke { grant } => {
            // Revoking garbage is as harmless as revoking twice.
            registry.revoke(caller, GrantId::from_raw(grant));
            Ok(0)
        }
        KernelCall::SafeCopyFrom {
            owner,
            grant,
            offset,
            addr,
            len,
        } => {
            let local = validate::user_window(addr, len)?;
            SafeCopier::new(registry, engine).copy_from(
                caller,
                validate::endpoint(owner)?,
                validate::grant_id(grant)?,
                offset,
                local,
                len,
            )?;
            Ok(len as i64)
        }
        KernelCall::SafeCopyTo {
            owner,
            grant,
            offset,
            addr,
            len,
        } => {
            let local = validate::user_window(addr, len)?;
            SafeCopier::new(registry, engine).copy_to(
                caller,
                validate::endpoint(owner)?,
                validate::grant_id(grant)?,
                offset,
                local,
                len,
            )?;
            Ok(len as i64)
        }
        KernelCall::VSafeCopy { entries } => {
            // A bad local window stops the batch at that entry, like any
            // other failed entry.
            let total = SafeCopier::new(registry, engine)
                .vcopy_with(caller, entries, |entry| {
                    validate::user_window(entry.addr.as_usize(), entry.len)
                        .map(|_| ())
                        .map_err(|_| GrantError::HardFault)
                })
                .map_err(|e| SyscallError::from(e.error))?;
            Ok(i64::try_from(total).unwrap_or(i64::MAX))
        }
        KernelCall::SafeMemset {
            owner,
            grant,
            offset,
            byte,
            len,
        } => {
            SafeCopier::new(registry, engine).memset(
                caller,
                validate::endpoint(owner)?,
                validate::grant_id(grant)?,
                offset,
                byte,
                len,
            )?;
            Ok(len as i64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap::GrantFlags;
    use crate::mm::address::USER_VIRT_END;
    use crate::mm::{PagedMemory, VirtAddr, PAGE_SIZE};

    const A: Endpoint = Endpoint::from_raw(1);
    const B: Endpoint = Endpoint::from_raw(2);
    const C: Endpoint = Endpoint::from_raw(3);
    const X: usize = 0x40_0000;

    fn system() -> (GrantRegistry, PagedMemory) {
        let registry = GrantRegistry::default();
        let mut mem = PagedMemory::new();
        for ep in [A, B, C] {
            assert_eq!(
                dispatch(&registry, &mut mem, ep, KernelCall::SetGrant { capacity: 4 }),
                0
            );
            mem.map(ep, VirtAddr::new(X), PAGE_SIZE).unwrap();
        }
        (registry, mem)
    }

    #[test]
    fn test_grant_and_copy() {
        let (registry, mut mem) = system();
        mem.write(A, VirtAddr::new(X), b"kernel call").unwrap();

        let id = dispatch(
            &registry,
            &mut mem,
            A,
            KernelCall::GrantDirect {
                grantee: B.raw(),
                addr: X,
                len: 11,
                flags: GrantFlags::READ.bits(),
            },
        );
        assert!(id >= 0);

        let copy = KernelCall::SafeCopyFrom {
            owner: A.raw(),
            grant: id,
            offset: 0,
            addr: X,
            len: 11,
        };
        assert_eq!(dispatch(&registry, &mut mem, B, copy), 11);
        assert_eq!(dispatch(&registry, &mut mem, C, copy), SyscallError::Eperm as i64);

        let mut out = [0u8; 11];
        mem.read(B, VirtAddr::new(X), &mut out).unwrap();
        assert_eq!(&out, b"kernel call");

        assert_eq!(dispatch(&registry, &mut mem, A, KernelCall::Revoke { grant: id }), 0);
        assert_eq!(dispatch(&registry, &mut mem, A, KernelCall::Revoke { grant: id }), 0);
        assert_eq!(dispatch(&registry, &mut mem, B, copy), SyscallError::Einval as i64);
    }

    #[test]
    fn test_error_codes() {
        let (registry, mut mem) = system();
        assert_eq!(
            dispatch(&registry, &mut mem, A, KernelCall::SetGrant { capacity: 4 }),
            SyscallError::Eexist as i64
        );
        assert_eq!(
            dispatch(
                &registry,
                &mut mem,
                A,
                KernelCall::GrantDirect {
                    grantee: B.raw(),
                    addr: usize::MAX - 4,
                    len: 10,
                    flags: GrantFlags::READ.bits(),
                }
            ),
            SyscallError::Efault as i64
        );
        assert_eq!(
            dispatch(
                &registry,
                &mut mem,
                A,
                KernelCall::GrantMagic {
                    granter: B.raw(),
                    grantee: C.raw(),
                    addr: X,
                    len: 8,
                    flags: GrantFlags::READ.bits(),
                }
            ),
            SyscallError::Eperm as i64
        );
        assert_eq!(
            dispatch(
                &registry,
                &mut mem,
                Endpoint::from_raw(50),
                KernelCall::GrantDirect {
                    grantee: B.raw(),
                    addr: X,
                    len: 8,
                    flags: GrantFlags::READ.bits(),
                }
            ),
            SyscallError::Esrch as i64
        );
    }

    #[test]
    fn test_table_full() {
        let (registry, mut mem) = system();
        let grant = KernelCall::GrantDirect {
            grantee: Endpoint::ANY.raw(),
            addr: X,
            len: 8,
            flags: GrantFlags::READ.bits(),
        };
        for _ in 0..4 {
            assert!(dispatch(&registry, &mut mem, A, grant) >= 0);
        }
        assert_eq!(dispatch(&registry, &mut mem, A, grant), SyscallError::Enospc as i64);
    }

    #[test]
    fn test_soft_fault_code() {
        let (registry, mut mem) = system();
        let id = dispatch(
            &registry,
            &mut mem,
            A,
            KernelCall::GrantDirect {
                grantee: B.raw(),
                addr: X,
                len: 8,
                flags: (GrantFlags::WRITE | GrantFlags::TRY).bits(),
            },
        );
        mem.evict(A, VirtAddr::new(X), 8);

        let memset = KernelCall::SafeMemset {
            owner: A.raw(),
            grant: id,
            offset: 0,
            byte: 0xff,
            len: 8,
        };
        assert_eq!(
            dispatch(&registry, &mut mem, B, memset),
            SyscallError::EfaultSoft as i64
        );
        assert_eq!(
            registry.fault_marker(A, GrantId::from_raw(id)),
            Some(GrantId::from_raw(id))
        );
    }

    #[test]
    fn test_indirect_and_vector() {
        let (registry, mut mem) = system();
        mem.write(A, VirtAddr::new(X), b"abcdefgh").unwrap();
        let g1 = dispatch(
            &registry,
            &mut mem,
            A,
            KernelCall::GrantDirect {
                grantee: B.raw(),
                addr: X,
                len: 8,
                flags: GrantFlags::READ.bits(),
            },
        );
        let g2 = dispatch(
            &registry,
            &mut mem,
            B,
            KernelCall::GrantIndirect {
                grantee: C.raw(),
                granter: A.raw(),
                grant: g1,
                flags: GrantFlags::READ.bits(),
            },
        );
        assert!(g2 >= 0);
        assert_eq!(
            dispatch(
                &registry,
                &mut mem,
                C,
                KernelCall::GrantIndirect {
                    grantee: A.raw(),
                    granter: B.raw(),
                    grant: g2,
                    flags: GrantFlags::READ.bits(),
                }
            ),
            SyscallError::Eloop as i64
        );

        let entries = [
            VectorEntry {
                from: B,
                to: Endpoint::SELF,
                grant: GrantId::from_raw(g2),
                offset: 0,
                addr: VirtAddr::new(X),
                len: 4,
            },
            VectorEntry {
                from: B,
                to: Endpoint::SELF,
                grant: GrantId::from_raw(g2),
                offset: 6,
                addr: VirtAddr::new(X + 4),
                len: 4,
            },
        ];
        assert_eq!(
            dispatch(&registry, &mut mem, C, KernelCall::VSafeCopy { entries: &entries }),
            SyscallError::Erange as i64
        );

        let mut out = [0u8; 8];
        mem.read(C, VirtAddr::new(X), &mut out).unwrap();
        assert_eq!(&out, b"abcd\0\0\0\0");
    }

    #[test]
    fn test_vector_bad_window_keeps_earlier_entries() {
        let (registry, mut mem) = system();
        mem.write(A, VirtAddr::new(X), b"abcd").unwrap();
        let id = dispatch(
            &registry,
            &mut mem,
            A,
            KernelCall::GrantDirect {
                grantee: B.raw(),
                addr: X,
                len: 8,
                flags: GrantFlags::READ.bits(),
            },
        );
        let read = VectorEntry {
            from: A,
            to: Endpoint::SELF,
            grant: GrantId::from_raw(id),
            offset: 0,
            addr: VirtAddr::new(X),
            len: 4,
        };
        let kernel_half = VectorEntry {
            addr: VirtAddr::new(USER_VIRT_END),
            ..read
        };

        assert_eq!(
            dispatch(
                &registry,
                &mut mem,
                B,
                KernelCall::VSafeCopy {
                    entries: &[read, kernel_half],
                }
            ),
            SyscallError::Efault as i64
        );

        let mut out = [0u8; 4];
        mem.read(B, VirtAddr::new(X), &mut out).unwrap();
        assert_eq!(&out, b"abcd");
    }
}
