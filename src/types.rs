//! Shared identifiers and enums.
//!
//! This module contains the vocabulary used by every component:
//! - identifiers for actors, content, reports and notifications
//! - `Role`, `EdgeKind`, `TargetKind` and the report enums
//! - `DurationUnit` for ban lengths
//! - `NotificationKind`

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an actor (user or admin account).
pub type ActorId = u64;

/// Identifier of a post or comment, assigned by the content service.
pub type ContentId = u64;

/// Identifier of a report.
pub type ReportId = u64;

/// Identifier of a notification. Never reused, so deleted notifications
/// cannot come back under the same id.
pub type NotificationId = u64;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Returns the current wall-clock time in milliseconds.
pub fn current_timestamp_millis() -> Timestamp {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Formats a millisecond timestamp as an RFC 3339 string (UTC).
pub fn format_timestamp(millis: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "USER"),
            Role::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Kind of a directed relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum EdgeKind {
    /// Actor follows actor.
    Follow = 1,
    /// Actor likes post.
    Like = 2,
    /// Actor likes comment.
    CommentLike = 3,
}

impl EdgeKind {
    /// Stable single-byte tag used in storage keys.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Like edge kind for a piece of content.
    pub fn like_of(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Post => EdgeKind::Like,
            ContentKind::Comment => EdgeKind::CommentLike,
        }
    }

    /// Content a like edge points at; `None` for follows.
    pub fn liked_content(self) -> Option<ContentKind> {
        match self {
            EdgeKind::Follow => None,
            EdgeKind::Like => Some(ContentKind::Post),
            EdgeKind::CommentLike => Some(ContentKind::Comment),
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Follow => write!(f, "FOLLOW"),
            EdgeKind::Like => write!(f, "LIKE"),
            EdgeKind::CommentLike => write!(f, "COMMENT_LIKE"),
        }
    }
}

/// Kind of content registered by the content service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentKind {
    Post,
    Comment,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Post => write!(f, "POST"),
            ContentKind::Comment => write!(f, "COMMENT"),
        }
    }
}

/// What a report points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetKind {
    Post,
    User,
    Comment,
}

impl TargetKind {
    /// Content kind for content targets, `None` for users.
    pub fn content_kind(self) -> Option<ContentKind> {
        match self {
            TargetKind::Post => Some(ContentKind::Post),
            TargetKind::Comment => Some(ContentKind::Comment),
            TargetKind::User => None,
        }
    }
}

impl From<ContentKind> for TargetKind {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Post => TargetKind::Post,
            ContentKind::Comment => TargetKind::Comment,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Post => write!(f, "POST"),
            TargetKind::User => write!(f, "USER"),
            TargetKind::Comment => write!(f, "COMMENT"),
        }
    }
}

/// Reason selected by the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportReason {
    Spam,
    Harassment,
    HateSpeech,
    FalseInformation,
    Violence,
    Inappropriate,
    Other,
}

impl fmt::Display for ReportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReportReason::Spam => "SPAM",
            ReportReason::Harassment => "HARASSMENT",
            ReportReason::HateSpeech => "HATE_SPEECH",
            ReportReason::FalseInformation => "FALSE_INFORMATION",
            ReportReason::Violence => "VIOLENCE",
            ReportReason::Inappropriate => "INAPPROPRIATE",
            ReportReason::Other => "OTHER",
        };
        f.write_str(label)
    }
}

/// Report lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Pending,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    /// Returns true if no further transition is permitted.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Resolved | ReportStatus::Dismissed)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportStatus::Pending => write!(f, "PENDING"),
            ReportStatus::Resolved => write!(f, "RESOLVED"),
            ReportStatus::Dismissed => write!(f, "DISMISSED"),
        }
    }
}

/// Report priority. Ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "LOW"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::High => write!(f, "HIGH"),
            Priority::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Unit of a temporary ban's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Hours,
    Days,
    Weeks,
}

impl DurationUnit {
    /// Length of one unit in milliseconds.
    pub fn millis(self) -> u64 {
        const HOUR: u64 = 60 * 60 * 1000;
        match self {
            DurationUnit::Hours => HOUR,
            DurationUnit::Days => 24 * HOUR,
            DurationUnit::Weeks => 7 * 24 * HOUR,
        }
    }
}

impl fmt::Display for DurationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationUnit::Hours => write!(f, "hours"),
            DurationUnit::Days => write!(f, "days"),
            DurationUnit::Weeks => write!(f, "weeks"),
        }
    }
}

/// Notification category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Mention,
    System,
    Moderation,
}

impl NotificationKind {
    /// Kinds that content collaborators may create through the gateway.
    pub fn is_external(self) -> bool {
        matches!(
            self,
            NotificationKind::Comment | NotificationKind::Mention | NotificationKind::System
        )
    }
}

impl From<EdgeKind> for NotificationKind {
    fn from(kind: EdgeKind) -> Self {
        match kind {
            EdgeKind::Follow => NotificationKind::Follow,
            EdgeKind::Like | EdgeKind::CommentLike => NotificationKind::Like,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NotificationKind::Like => "LIKE",
            NotificationKind::Comment => "COMMENT",
            NotificationKind::Follow => "FOLLOW",
            NotificationKind::Mention => "MENTION",
            NotificationKind::System => "SYSTEM",
            NotificationKind::Moderation => "MODERATION",
        };
        f.write_str(label)
    }
}
