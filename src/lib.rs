//! # Murmur
//!
//! Backend core of a blogging platform: the parts with real state machines,
//! scheduling and delivery-ordering concerns.
//!
//! - **Moderation**: reports move through `PENDING -> RESOLVED | DISMISSED`,
//!   bans are issued, replaced, lifted and expired.
//! - **Social graph**: follow and like edges (on posts and on comments)
//!   whose existence is the truth, with counters that always equal the
//!   number of edges.
//! - **Notifications**: persisted inboxes with an unread count derived from
//!   the inbox, plus best-effort live streams.
//!
//! ## Architecture
//!
//! ```text
//! Coordinator ─┬─ ActorDirectory      (actors, post/comment owners)
//!              ├─ EdgeStore           (follow/like edges + counters)
//!              ├─ ModerationEngine    (reports, ban records)
//!              │    └─ BanScheduler   (periodic expiry sweep)
//!              └─ NotificationBroker  (inboxes, live sessions)
//! ```
//!
//! Every mutation enters through [`Coordinator`], which authenticates the
//! actor, delegates to the owning component and decides which
//! notifications follow.
//!
//! ## Example
//!
//! ```rust,no_run
//! use murmur::{Coordinator, ServiceConfig, SystemClock, Role};
//! use std::sync::Arc;
//! # fn main() -> murmur::Result<()> {
//! let coordinator = Coordinator::open(ServiceConfig::in_memory(), Arc::new(SystemClock))?;
//! coordinator.register_actor(1, "alice", Role::User)?;
//! coordinator.register_actor(2, "bob", Role::User)?;
//!
//! let state = coordinator.follow(Some(1), 2)?;
//! assert!(state.active);
//! assert_eq!(coordinator.unread_count(Some(2))?, 1);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod directory;
pub mod edges;
pub mod error;
pub mod moderation;
pub mod notifications;
pub mod scheduler;
pub mod storage;
pub mod sync;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::ServiceConfig;
pub use coordinator::{
    ActorView, BulkBanRequest, BulkOutcome, Coordinator, DashboardStats, DismissRequest,
    ExternalNotification, LikeState, ModerationAction, ResolveRequest,
};
pub use directory::{ActorDirectory, ActorRecord, ContentRef};
pub use edges::{BanOracle, EdgeChange, EdgeEvent, EdgeState, EdgeStore};
pub use error::{MurmurError, Result};
pub use moderation::{BanRecord, BanRequest, ModerationEngine, NewReport, Report, ReportCounts};
pub use notifications::{
    Notification, NotificationBroker, NotificationPayload, NotificationStream, NotificationView,
    StreamEvent,
};
pub use scheduler::{BanScheduler, SweepReport};
pub use types::*;
