/// Application name
pub const APP_NAME: &str = "Parley";

/// Content substituted for a message deleted for everyone
pub const TOMBSTONE_CONTENT: &str = "Message deleted";

/// Default maximum message content length in bytes (16 KiB)
pub const DEFAULT_MAX_CONTENT_LEN: usize = 16 * 1024;

/// Maximum length of a reaction emoji in bytes.
/// Long enough for ZWJ sequences and skin-tone modifiers.
pub const MAX_EMOJI_LEN: usize = 32;

/// Default HTTP / WebSocket port
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Seconds an unauthenticated connection may stay open
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 30;

/// Per-session outbound queue depth; pushes beyond it are dropped
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Suggested pull interval for clients without a live channel
pub const RECOMMENDED_POLL_INTERVAL_SECS: u64 = 3;
