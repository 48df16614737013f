//! Grant Resolution
//!
//! Turns a grant id presented by a grantee into the memory window it may
//! touch, or rejects it.
//!
//! # Checks (in order, first failure wins)
//! 1. The id decodes to a slot inside the owner's table
//! 2. The slot is live and its sequence matches the id
//! 3. The requester is the recorded grantee (or the grantee is ANY)
//! 4. The requested access is covered by the granted rights
//! 5. `offset + len` neither overflows nor leaves the window
//! 6. An indirect grant is resolved once more against the original,
//!    with its own owner as requester; a chain deeper than
//!    `MAX_INDIRECTION` is rejected
//! 7. A magic grant exposes the memory of its explicit granter, not of
//!    the table owner
//!
//! Resolution only reads table state. Each table is locked just long
//! enough to copy the entry out.

use crate::cap::{
    Endpoint, GrantEntry, GrantError, GrantFlags, GrantId, GrantRegistry, Payload, MAX_INDIRECTION,
};
use crate::mm::VirtAddr;

/// A copy request as seen by the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolveRequest {
    /// Owner of the table holding the grant.
    pub owner: Endpoint,
    /// The presented grant.
    pub grant: GrantId,
    /// Who presents it.
    pub requester: Endpoint,
    /// Byte offset into the granted window.
    pub offset: usize,
    /// Number of bytes.
    pub len: usize,
    /// Rights the copy needs.
    pub access: GrantFlags,
}

/// A validated window, ready for a copy engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// Process whose memory is touched.
    pub granter: Endpoint,
    /// Absolute start address in the granter's address space.
    pub addr: VirtAddr,
    /// Number of bytes.
    pub len: usize,
    /// Rights the copy was checked against.
    pub access: GrantFlags,
    /// Report non-resident pages as a soft fault.
    pub fail_fast: bool,
}

/// Validate a request against the live grant tables.
///
/// Each indirect level is checked with the previous owner as requester,
/// so rights and bounds only ever narrow. At most `MAX_INDIRECTION`
/// indirect levels are followed.
pub fn resolve(registry: &GrantRegistry, req: &ResolveRequest) -> Result<Resolved, GrantError> {
    let mut owner = req.owner;
    let mut grant = req.grant;
    let mut requester = req.requester;
    let mut fail_fast = false;

    for depth in 0..=MAX_INDIRECTION {
        let entry = lookup(registry, owner, grant)?;
        if depth == MAX_INDIRECTION && matches!(entry.payload, Payload::Indirect { .. }) {
            log::warn!(
                "{}: grant {:?} re-exports indirect grant {:?} of {}",
                requester,
                req.grant,
                grant,
                owner
            );
            return Err(GrantError::IndirectionTooDeep);
        }
        authorize(&entry, owner, grant, requester, req.access)?;
        fail_fast |= entry.flags.fail_fast();

        match entry.payload {
            Payload::Indirect {
                granter,
                grant: original,
                ..
            } => {
                requester = owner;
                owner = granter;
                grant = original;
            }
            Payload::Direct { .. } | Payload::Magic { .. } => {
                let (memory_owner, base, window) =
                    target(owner, &entry.payload).ok_or(GrantError::IndirectionTooDeep)?;
                let addr = sub_window(base, window, req.offset, req.len)?;
                return Ok(Resolved {
                    granter: memory_owner,
                    addr,
                    len: req.len,
                    access: req.access,
                    fail_fast,
                });
            }
        }
    }
    Err(GrantError::IndirectionTooDeep)
}

/// Steps 1 and 2.
fn lookup(registry: &GrantRegistry, owner: Endpoint, id: GrantId) -> Result<GrantEntry, GrantError> {
    registry.entry(owner, id).map_err(|e| match e {
        GrantError::NoTable => GrantError::InvalidIdentifier,
        other => other,
    })
}

/// Steps 3 and 4.
fn authorize(
    entry: &GrantEntry,
    owner: Endpoint,
    id: GrantId,
    requester: Endpoint,
    access: GrantFlags,
) -> Result<(), GrantError> {
    let grantee = entry.payload.grantee();
    if !grantee.admits(requester) {
        log::warn!(
            "{}: grant {:?} presented by {}, granted to {}",
            owner,
            id,
            requester,
            grantee
        );
        return Err(GrantError::PermissionDenied);
    }
    if !entry.flags.access().contains(access.access()) {
        log::debug!(
            "{}: grant {:?} allows {:?}, {:?} requested",
            owner,
            id,
            entry.flags.access(),
            access
        );
        return Err(GrantError::PermissionDenied);
    }
    Ok(())
}

/// Memory owner and window of a direct or magic grant held by `owner`.
fn target(owner: Endpoint, payload: &Payload) -> Option<(Endpoint, VirtAddr, usize)> {
    match *payload {
        Payload::Direct { addr, len, .. } => Some((owner, addr, len)),
        Payload::Magic { granter, addr, len, .. } => Some((granter, addr, len)),
        Payload::Indirect { .. } => None,
    }
}

/// Step 5: start of `[offset, offset + len)` inside a window.
pub fn sub_window(
    base: VirtAddr,
    window: usize,
    offset: usize,
    len: usize,
) -> Result<VirtAddr, GrantError> {
    let end = offset.checked_add(len).ok_or(GrantError::RangeError)?;
    if end > window {
        return Err(GrantError::RangeError);
    }
    base.checked_add(offset).ok_or(GrantError::RangeError)
}
