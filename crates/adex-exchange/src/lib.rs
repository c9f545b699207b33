//! ADEX Exchange - The allocator at the heart of the exchange
//!
//! An ad-fill request flows through four stages:
//! 1. Eligibility - every other application that can pay for an impression
//! 2. Selection - one candidate, uniformly at random
//! 3. Settlement - advertiser pays one credit, publisher earns it, atomically
//! 4. Response - the advertiser's creative, verbatim
//!
//! Clicks are recorded separately and never touch credits.
//!
//! The allocator holds no mutable state of its own; everything lives in
//! the injected `AccountStore`, so any number of allocators may share one
//! store.

pub mod filter;
pub mod selector;
pub mod settlement;
pub mod clicks;
pub mod exchange;

pub use filter::*;
pub use selector::*;
pub use settlement::*;
pub use clicks::*;
pub use exchange::*;

use std::time::Instant;

use adex_core::{AdexError, AdexResult};

/// Refuse to start a write once `deadline` has passed.
///
/// Callers check this immediately before a store write, so a refusal
/// always means nothing was written.
pub(crate) fn ensure_before(deadline: Option<Instant>, action: &str) -> AdexResult<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(AdexError::StoreUnavailable(
            format!("deadline passed before {action}"),
        )),
        _ => Ok(()),
    }
}
