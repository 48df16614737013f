//! PantherOS Safe-Copy Grants
//!
//! Capability-based memory grants between processes, and the kernel-mediated
//! copy path that validates and executes transfers through them.
//!
//! # Overview
//! - A process owns a grant table and hands out opaque `GrantId`s
//! - A grantee presents the id; the resolver checks it against the live
//!   table entry before a single byte is moved
//! - Ids carry a per-slot sequence number, so a revoked id never matches
//!   a reused slot
//!
//! # Security Properties
//! - A grantee can never widen the rights or the window of a grant
//! - Re-exported (indirect) grants are limited to one level
//! - Only trusted endpoints may create magic grants on behalf of others
//! - No two table locks are ever held at the same time

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod cap;
pub mod copy;
pub mod mm;
pub mod syscall;

pub use cap::{
    Endpoint, GrantEntry, GrantError, GrantFlags, GrantId, GrantRegistry, GrantTable, Payload,
    RegistryConfig,
};
pub use copy::{BatchError, Resolved, SafeCopier, VectorEntry};
pub use mm::{CopyEngine, MemoryFault, PagedMemory, VirtAddr};
