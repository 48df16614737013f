//! Kernel Call Argument Validation
//!
//! Raw kernel call arguments are turned into typed values here, before any
//! grant state is touched.
//!
//! # Security Principles
//! - Validate ALL inputs before use
//! - Fail-secure: deny by default
//! - Reserved endpoints only where the call allows them
//! - Address windows must not wrap and must stay in user space

use super::handler::SyscallError;
use crate::cap::{Endpoint, GrantFlags, GrantId};
use crate::mm::VirtAddr;

/// A real process endpoint.
pub fn endpoint(raw: u32) -> Result<Endpoint, SyscallError> {
    Endpoint::new(raw).ok_or(SyscallError::Einval)
}

/// A grantee: a real process or ANY.
pub fn grantee(raw: u32) -> Result<Endpoint, SyscallError> {
    let ep = Endpoint::from_raw(raw);
    if ep == Endpoint::ANY {
        return Ok(ep);
    }
    endpoint(raw)
}

/// A grant id that could have come from an allocation.
pub fn grant_id(raw: i64) -> Result<GrantId, SyscallError> {
    let id = GrantId::from_raw(raw);
    if id.is_valid() {
        Ok(id)
    } else {
        Err(SyscallError::Einval)
    }
}

/// Flags a granting process may request.
pub fn grant_flags(raw: u32) -> Result<GrantFlags, SyscallError> {
    GrantFlags::from_bits(raw)
        .filter(|flags| GrantFlags::REQUESTABLE.contains(*flags))
        .ok_or(SyscallError::Einval)
}

/// A window `[addr, addr + len)` in user space.
///
/// # Security Checks
/// 1. Zero-length windows are accepted anywhere
/// 2. `addr + len` does not overflow
/// 3. The window ends inside user space
pub fn user_window(addr: usize, len: usize) -> Result<VirtAddr, SyscallError> {
    if len == 0 {
        return Ok(VirtAddr::new(addr));
    }

    let end = addr.checked_add(len).ok_or(SyscallError::Efault)?;
    if !VirtAddr::new(end - 1).is_user() {
        return Err(SyscallError::Efault);
    }

    Ok(VirtAddr::new(addr))
}
