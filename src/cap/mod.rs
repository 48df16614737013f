//! Grant Capabilities
//!
//! Per-process grant tables: the capabilities a process hands out so that
//! another process can copy to or from a window of its memory.
//!
//! # Design
//! - Each process has a GrantTable, held in the GrantRegistry
//! - A grant is named by an unforgeable, versioned GrantId
//! - Grants are direct, indirect (one level of re-export) or magic
//!   (made by a trusted process on another's behalf)
//!
//! # Security Properties
//! - Stale ids never match a reused slot
//! - Rights can only be reduced when re-exporting, never increased
//! - Revocation is immediate and idempotent

pub mod endpoint;
pub mod error;
pub mod id;
pub mod registry;
pub mod rights;
pub mod slot;
pub mod table;

pub use endpoint::Endpoint;
pub use error::GrantError;
pub use id::GrantId;
pub use registry::{GrantRegistry, RegistryConfig, MAX_INDIRECTION};
pub use rights::{Access, GrantFlags};
pub use slot::{GrantEntry, Payload};
pub use table::{GrantTable, DEFAULT_CAPACITY, MAX_CAPACITY};
