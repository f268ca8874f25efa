//! Shared constants for validation, limits and defaults.
//!
//! These constants are used by both the library and the server binary so
//! that validation is identical on every path.

use std::time::Duration;

// =============================================================================
// Input Limits
// =============================================================================

/// Maximum report description size (1000 characters).
pub const MAX_REPORT_DESCRIPTION_LEN: usize = 1000;

/// Maximum ban/dismissal/resolution reason size (500 characters).
pub const MAX_REASON_LEN: usize = 500;

/// Maximum username size (50 characters).
pub const MAX_USERNAME_LEN: usize = 50;

/// Maximum notification content size (2000 characters).
pub const MAX_NOTIFICATION_CONTENT_LEN: usize = 2000;

/// Maximum content excerpt kept for registered posts/comments.
pub const MAX_EXCERPT_LEN: usize = 200;

/// Most actors one bulk ban or bulk delete may name.
pub const MAX_BULK_ACTORS: usize = 100;

/// Upper bound for a temporary ban, expressed in units (e.g. 520 weeks).
pub const MAX_BAN_DURATION_UNITS: u32 = 520;

// =============================================================================
// Notification Titles
// =============================================================================

/// Titles longer than this are truncated with an ellipsis.
pub const TITLE_MAX_CHARS: usize = 50;

/// A period before this position ends the title early.
pub const TITLE_SENTENCE_CUTOFF: usize = 30;

/// Title used when a notification has no content.
pub const DEFAULT_TITLE: &str = "Notification";

/// Resolution note written when a reported target disappears.
pub const TARGET_DELETED_NOTE: &str = "target deleted";

// =============================================================================
// Scheduling and Streaming Defaults
// =============================================================================

/// Default interval between ban expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default number of expired bans processed per sweep batch.
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 100;

/// Default idle period after which a notification stream is closed.
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default per-session buffer of undelivered stream events.
pub const DEFAULT_STREAM_CHANNEL_CAPACITY: usize = 64;

/// Default maximum number of notifications returned by a pull.
pub const DEFAULT_MAX_NOTIFICATIONS_PER_PAGE: usize = 200;

/// Default page size of the administrative actor list.
pub const DEFAULT_ACTOR_PAGE_SIZE: usize = 50;

/// Largest page of the administrative actor list.
pub const MAX_ACTOR_PAGE_SIZE: usize = 200;

/// Reconnect hint sent to stream clients (milliseconds).
pub const STREAM_RETRY_MILLIS: u64 = 5000;

/// Creator name shown on notifications that no actor caused.
pub const SYSTEM_CREATOR_NAME: &str = "System";
