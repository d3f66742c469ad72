//! Application constants
//!
//! Registry keys and header names shared by the infra crate and the demo.

// Policy registry keys
pub const RETRY_POLICY_KEY: &str = "Retry";
pub const CIRCUIT_BREAKER_POLICY_KEY: &str = "CircuitBreaker";
pub const BULKHEAD_POLICY_KEY: &str = "BulkHead";

// Header names
pub const API_KEY_HEADER: &str = "X-API-KEY";
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

// Reference configuration
pub const DEFAULT_BASE_URL: &str = "https://httpstat.us";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = concat!("httpguard/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 600;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_OPEN_DURATION_SECS: u64 = 30;
pub const DEFAULT_MAX_PARALLEL: usize = 10;
pub const DEFAULT_MAX_QUEUED: usize = 1;
