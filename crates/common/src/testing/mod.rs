//! Testing utilities and helpers
//!
//! This module provides utilities for testing code built on the resilience
//! policies:
//! - **[`async_utils`]**: waiting helpers and the `assert_eventually_async!`
//!   macro
//! - **[`operations`]**: scripted and gated operations with call counting
//!
//! ## Usage
//!
//! ```rust,ignore
//! use httpguard_common::testing::{ScriptedOperation, TestFailure};
//!
//! let op = ScriptedOperation::<u32, TestFailure>::always_transient();
//! let _ = retry.execute(&ctx, &op).await;
//! assert_eq!(op.calls(), 4);
//! ```

pub mod async_utils;
pub mod operations;

// Note: Macros exported with #[macro_export] are available at crate root
pub use async_utils::{poll_until, timeout_ok};
pub use operations::{GatedOperation, ScriptedOperation, TestFailure};
