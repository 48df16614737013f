//! Kernel Call Interface
//!
//! The grant subsystem as seen by other processes: ordinary kernel calls
//! that return a value or a negative error code.
//!
//! # Security Model
//! - Whitelist approach: only the calls in `KernelCall` exist
//! - All parameters are validated before use
//! - Invalid inputs return errors, never panic
//!
//! # Current Calls
//! - setgrant(capacity) - give the caller a grant table
//! - grant_direct / grant_indirect / grant_magic - create a grant
//! - revoke(grant) - revoke one of the caller's grants
//! - safecopyfrom / safecopyto / vsafecopy / safememset - copy through grants

mod handler;
mod validate;

pub use handler::{dispatch, numbers, KernelCall, SyscallError};
