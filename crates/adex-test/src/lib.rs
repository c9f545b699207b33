//! ADEX Test Harness - Exchange validation under hostile conditions
//!
//! This crate provides:
//! - Fault injection around any account store
//! - Seeded single-threaded ledger replay with invariant checks
//! - Multi-threaded contention runs against a single advertiser

pub mod chaos;
pub mod simulator;
pub mod contention;

pub use chaos::*;
pub use simulator::*;
pub use contention::*;
