//! Tunable operational defaults for keelson nodes.
//!
//! Protocol-level constants (versions, file names) remain in
//! [`crate::constants`]. This module centralizes the configurable defaults
//! that can be overridden through options or CLI flags.

use std::time::Duration;

// ─── Messages ───────────────────────────────────────────────────────────────

/// Initial capacity of a request or response [`Message`](crate::Message).
pub const DEFAULT_MESSAGE_CAPACITY: usize = 4096;

/// Maximum size of a single wire frame (bytes). 8 MB.
/// Protects against corrupt length prefixes on the wire.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

// ─── Connector ──────────────────────────────────────────────────────────────

/// Time budget for a single connect attempt or request/response round trip.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

/// Base delay of the binary exponential connect backoff.
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(1);

// ─── Lifecycle ──────────────────────────────────────────────────────────────

/// How long `close` waits for the accept loop to report completion.
pub const DEFAULT_ACCEPT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

// ─── Daemon ─────────────────────────────────────────────────────────────────

/// Upper bound on how long the daemon waits for a join to complete.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(30);
