//! ADEX Core - Fundamental types for the ad exchange
//!
//! This crate defines the types shared by every layer of the exchange:
//! - Identifiers (AppId)
//! - Accounts and their ad creatives
//! - Fill outcomes and placements
//! - Exchange configuration
//! - The error taxonomy

pub mod id;
pub mod account;
pub mod outcome;
pub mod config;
pub mod error;

pub use id::*;
pub use account::*;
pub use outcome::*;
pub use config::*;
pub use error::*;
