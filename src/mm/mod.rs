//! Memory module for the grant subsystem
//!
//! Provides:
//! - Virtual address type with checked arithmetic
//! - The copy engine contract the safe-copy path drives
//! - A paged in-memory engine for hosted builds
//!
//! # Security Principles
//! - Engines only move bytes the resolver has already authorized
//! - A copy either completes or reports a fault, never fails silently

pub mod address;
pub mod memory;

pub use address::{VirtAddr, PAGE_SIZE};
pub use memory::{CopyEngine, MemoryFault, PagedMemory};
