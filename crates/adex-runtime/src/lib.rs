//! ADEX Runtime - Service wiring around the allocator
//!
//! This crate hosts the exchange inside an async process:
//! - Runtime configuration (JSON file plus environment overrides)
//! - Logging initialisation
//! - `ExchangeService`, the async surface a request layer calls into
//! - Serialisable responses for fill and click requests

pub mod config;
pub mod telemetry;
pub mod response;
pub mod service;

pub use config::*;
pub use telemetry::*;
pub use response::*;
pub use service::*;
