//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

pub use larder_order::SORT_KEY_GAP;

/// Upper bound on a single mutation dispatch (request or whole batch).
/// Elapsing takes the failure path.
pub const DEFAULT_MUTATION_TIMEOUT: Duration = Duration::from_secs(15);

/// First reconnect delay for the sync channel.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Reconnect delay ceiling for the sync channel.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Proportional jitter applied to reconnect delays (0.2 = ±20%).
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.2;

/// WebSocket close code: invalid token or unknown user.
pub const CLOSE_INVALID_TOKEN: u16 = 4001;

/// WebSocket close code: user has no access to the list.
pub const CLOSE_ACCESS_DENIED: u16 = 4003;

/// Capacity of the connection-status broadcast channel.
pub const STATUS_CHANNEL_CAPACITY: usize = 16;

/// Config file name under the platform config directory.
pub const CONFIG_FILE_NAME: &str = "larder.ron";
