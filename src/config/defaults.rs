//! System-wide default constants.
//!
//! Grouped by subsystem. Every value here can be overridden from `caseta.toml`
//! except where noted.

// ============================================================================
// Server
// ============================================================================

/// HTTP bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Largest accepted request body (bytes). Covers a base64 camera frame.
pub const MAX_REQUEST_BODY_BYTES: usize = 12 * 1024 * 1024;

// ============================================================================
// Storage
// ============================================================================

/// Sled data directory.
pub const DATA_DIR: &str = "./data";

/// Budget for a single store read or write (ms).
pub const STORE_TIMEOUT_MS: u64 = 2_000;

/// Budget for creating a petition in the petition store (ms).
pub const PETITION_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// Alerts
// ============================================================================

/// How often administrator views poll the active-alert list (seconds).
///
/// Every state change must be visible within one interval.
pub const ALERT_POLL_INTERVAL_SECS: u64 = 30;

/// Broadcast buffer for push subscribers. Slow subscribers skip ahead.
pub const ALERT_BROADCAST_CAPACITY: usize = 256;

// ============================================================================
// Classification oracle
// ============================================================================

/// OpenAI-compatible chat completions endpoint.
pub const ORACLE_ENDPOINT: &str = "http://localhost:8000/v1/chat/completions";

/// Model name sent with every oracle request.
pub const ORACLE_MODEL: &str = "gpt-4o-mini";

/// Environment variable holding the oracle API key (never stored in TOML).
pub const ORACLE_API_KEY_ENV: &str = "CASETA_ORACLE_API_KEY";

/// Maximum time to wait for one classification (seconds).
pub const ORACLE_TIMEOUT_SECS: u64 = 30;

/// Largest image forwarded to the oracle (bytes).
pub const ORACLE_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
