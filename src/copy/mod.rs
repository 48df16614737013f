//! Safe Copy
//!
//! Copies between processes that are authorized by a grant.
//!
//! # Pipeline
//! ```text
//! caller ─► resolve (grant tables) ─► CopyEngine (bytes) ─► result
//! ```
//! Validation failures are reported before the engine runs. Only the
//! engine itself can fail part-way, and it reports that as a soft or hard
//! fault.

mod resolve;
mod safecopy;
mod vector;

pub use resolve::{resolve, sub_window, ResolveRequest, Resolved};
pub use safecopy::SafeCopier;
pub use vector::{BatchError, VectorEntry, MAX_VECTOR_LEN};

#[cfg(test)]
mod tests {
    //! End-to-end walks through grant, copy and revoke.

    use super::*;
    use crate::cap::{Endpoint, GrantError, GrantFlags, GrantId, GrantRegistry};
    use crate::mm::{PagedMemory, VirtAddr, PAGE_SIZE};

    const A: Endpoint = Endpoint::from_raw(10);
    const B: Endpoint = Endpoint::from_raw(20);
    const C: Endpoint = Endpoint::from_raw(30);
    const X: VirtAddr = VirtAddr::new(0x40_0000);
    const LOCAL: VirtAddr = VirtAddr::new(0x80_0000);

    fn system() -> (GrantRegistry, PagedMemory) {
        let registry = GrantRegistry::default();
        let mut mem = PagedMemory::new();
        for ep in [A, B, C] {
            registry.create_table(ep).unwrap();
            mem.map(ep, X, PAGE_SIZE).unwrap();
            mem.map(ep, LOCAL, PAGE_SIZE).unwrap();
        }
        (registry, mem)
    }

    #[test]
    fn test_grant_copy_revoke() {
        let (registry, mut mem) = system();
        let payload: Vec<u8> = (0..100u8).collect();
        mem.write(A, X, &payload).unwrap();

        let id = registry.grant_direct(A, B, X, 100, GrantFlags::READ).unwrap();
        let mut copier = SafeCopier::new(&registry, &mut mem);

        copier.copy_from(B, A, id, 0, LOCAL, 100).unwrap();
        assert_eq!(
            copier.copy_from(B, A, id, 50, LOCAL, 60),
            Err(GrantError::RangeError)
        );

        registry.revoke(A, id);
        assert_eq!(
            copier.copy_from(B, A, id, 0, LOCAL, 100),
            Err(GrantError::InvalidIdentifier)
        );

        let mut out = vec![0u8; 100];
        mem.read(B, LOCAL, &mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_reexport_chain() {
        let (registry, mut mem) = system();
        mem.write(A, X, b"shared page").unwrap();

        let g1 = registry.grant_direct(A, B, X, 11, GrantFlags::READ).unwrap();
        let g2 = registry.grant_indirect(B, C, A, g1, GrantFlags::READ).unwrap();

        let mut copier = SafeCopier::new(&registry, &mut mem);
        copier.copy_from(C, B, g2, 7, LOCAL, 4).unwrap();
        assert_eq!(
            copier.copy_to(C, B, g2, 0, LOCAL, 4),
            Err(GrantError::PermissionDenied)
        );
        // C cannot skip B and use g1 directly.
        assert_eq!(
            copier.copy_from(C, A, g1, 0, LOCAL, 4),
            Err(GrantError::PermissionDenied)
        );

        let mut out = [0u8; 4];
        mem.read(C, LOCAL, &mut out).unwrap();
        assert_eq!(&out, b"page");
    }

    #[test]
    fn test_process_exit_invalidates_grants() {
        let (registry, mut mem) = system();
        let id = registry.grant_direct(A, B, X, 8, GrantFlags::READ).unwrap();
        let reexport = registry.grant_indirect(B, C, A, id, GrantFlags::READ).unwrap();

        registry.destroy_table(A);
        let mut copier = SafeCopier::new(&registry, &mut mem);
        assert_eq!(
            copier.copy_from(B, A, id, 0, LOCAL, 8),
            Err(GrantError::InvalidIdentifier)
        );
        assert_eq!(
            copier.copy_from(C, B, reexport, 0, LOCAL, 8),
            Err(GrantError::InvalidIdentifier)
        );

        // A restarted process must not revive old ids.
        registry.create_table(A).unwrap();
        let fresh = registry.grant_direct(A, B, X, 8, GrantFlags::READ).unwrap();
        assert_ne!(fresh, id);
        assert_eq!(
            copier.copy_from(B, A, id, 0, LOCAL, 8),
            Err(GrantError::InvalidIdentifier)
        );
        assert!(copier.copy_from(B, A, fresh, 0, LOCAL, 8).is_ok());
    }

    #[test]
    fn test_stale_identifier_after_slot_reuse() {
        let (registry, mut mem) = system();
        registry.destroy_table(A);
        registry.create_table_with_capacity(A, 1).unwrap();

        let mut ids: Vec<GrantId> = Vec::new();
        for _ in 0..8 {
            let id = registry.grant_direct(A, B, X, 8, GrantFlags::READ).unwrap();
            let mut copier = SafeCopier::new(&registry, &mut mem);
            for old in &ids {
                assert_eq!(
                    copier.copy_from(B, A, *old, 0, LOCAL, 8),
                    Err(GrantError::InvalidIdentifier)
                );
            }
            assert!(copier.copy_from(B, A, id, 0, LOCAL, 8).is_ok());
            registry.revoke(A, id);
            ids.push(id);
        }
    }
}
