//! ADEX Store - Account storage for the exchange
//!
//! This crate defines the storage seam the allocator is built against:
//! - The `AccountStore` trait (lookups, eligibility queries, atomic writes)
//! - Conditional batch commits used by settlement
//! - `MemoryStore`, an in-process ledger with per-account locking

pub mod store;
pub mod memory;

pub use store::*;
pub use memory::*;
