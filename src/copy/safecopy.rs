//! Single Safe Copies
//!
//! Resolve a grant, then let the engine move the bytes. Nothing is moved
//! unless resolution succeeded in full.

use super::resolve::{resolve, ResolveRequest, Resolved};
use crate::cap::{Access, Endpoint, GrantError, GrantId, GrantRegistry};
use crate::mm::{CopyEngine, MemoryFault, VirtAddr};

/// Safe-copy entry points over a registry and a copy engine.
#[derive(Debug)]
pub struct SafeCopier<'a, E: CopyEngine> {
    pub(super) registry: &'a GrantRegistry,
    pub(super) engine: &'a mut E,
}

impl<'a, E: CopyEngine> SafeCopier<'a, E> {
    /// Bind a registry and an engine.
    pub fn new(registry: &'a GrantRegistry, engine: &'a mut E) -> Self {
        Self { registry, engine }
    }

    /// Resolve a grant for a copy in the given direction.
    fn authorize(
        &self,
        caller: Endpoint,
        owner: Endpoint,
        grant: GrantId,
        offset: usize,
        len: usize,
        access: Access,
    ) -> Result<Resolved, GrantError> {
        resolve(
            self.registry,
            &ResolveRequest {
                owner,
                grant,
                requester: caller,
                offset,
                len,
                access: access.required(),
            },
        )
    }

    /// Turn an engine fault into the caller's error, stamping the grant on
    /// a soft fault so a retry can be matched to it.
    fn fault(&self, owner: Endpoint, grant: GrantId, fault: MemoryFault) -> GrantError {
        match fault {
            MemoryFault::Soft => {
                log::debug!("{}: soft fault through grant {:?}", owner, grant);
                self.registry.mark_faulted(owner, grant);
            }
            MemoryFault::Hard => {
                log::warn!("{}: hard fault through grant {:?}", owner, grant);
            }
        }
        fault.into()
    }

    /// Copy `len` bytes at `offset` of `owner`'s grant into the caller's
    /// memory at `local`.
    pub fn copy_from(
        &mut self,
        caller: Endpoint,
        owner: Endpoint,
        grant: GrantId,
        offset: usize,
        local: VirtAddr,
        len: usize,
    ) -> Result<(), GrantError> {
        local_window(local, len)?;
        let r = self.authorize(caller, owner, grant, offset, len, Access::Read)?;
        self.engine
            .copy(r.granter, r.addr, caller, local, r.len, r.fail_fast)
            .map_err(|fault| self.fault(owner, grant, fault))
    }

    /// Copy `len` bytes from the caller's memory at `local` to `offset` of
    /// `owner`'s grant.
    pub fn copy_to(
        &mut self,
        caller: Endpoint,
        owner: Endpoint,
        grant: GrantId,
        offset: usize,
        local: VirtAddr,
        len: usize,
    ) -> Result<(), GrantError> {
        local_window(local, len)?;
        let r = self.authorize(caller, owner, grant, offset, len, Access::Write)?;
        self.engine
            .copy(caller, local, r.granter, r.addr, r.len, r.fail_fast)
            .map_err(|fault| self.fault(owner, grant, fault))
    }

    /// Set `len` bytes at `offset` of `owner`'s grant to `byte`.
    pub fn memset(
        &mut self,
        caller: Endpoint,
        owner: Endpoint,
        grant: GrantId,
        offset: usize,
        byte: u8,
        len: usize,
    ) -> Result<(), GrantError> {
        let r = self.authorize(caller, owner, grant, offset, len, Access::Write)?;
        self.engine
            .fill(r.granter, r.addr, byte, r.len, r.fail_fast)
            .map_err(|fault| self.fault(owner, grant, fault))
    }
}

/// The caller's own buffer must not wrap. Checked before any grant state
/// is consulted.
fn local_window(local: VirtAddr, len: usize) -> Result<(), GrantError> {
    local.checked_add(len).map(|_| ()).ok_or(GrantError::RangeError)
}
