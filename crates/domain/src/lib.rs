//! # httpguard Domain
//!
//! Configuration and error types shared by the httpguard crates.
//!
//! This crate contains:
//! - Configuration structures with reference defaults
//! - Domain error types and Result definitions
//! - Policy registry keys and header name constants
//!
//! ## Architecture
//! - No dependencies on other httpguard crates
//! - Only external dependencies allowed
//! - Pure data structures; loading lives in `httpguard-infra`

pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
