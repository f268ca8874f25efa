//! Command entry point tying the components together.
//!
//! Every externally triggered mutation goes through [`Coordinator`]. It
//! checks who is acting, delegates to the owning component, and decides in
//! one place which notification goes to whom. Components never call each
//! other's storage; cross-component effects (ban -> notification, delete ->
//! edge cleanup -> report auto-resolution) are sequenced here.
//!
//! Notification delivery never fails a command: once the mutation is
//! durable, a failed enqueue is logged and the command still succeeds.
//! The same holds for cleanup after a deletion: the tombstone (together
//! with the report it resolves, if any) is one write; dropping edges,
//! closing other reports and purging an inbox follow it and are logged
//! rather than returned when they fail.

use crate::clock::SharedClock;
use crate::config::ServiceConfig;
use crate::constants::{
    MAX_ACTOR_PAGE_SIZE, MAX_BULK_ACTORS, SYSTEM_CREATOR_NAME, TARGET_DELETED_NOTE,
};
use crate::directory::{ActorDirectory, ActorRecord, ContentRef};
use crate::edges::{EdgeEvent, EdgeState, EdgeStore};
use crate::error::{MurmurError, Result};
use crate::moderation::{BanRecord, BanRequest, ModerationEngine, NewReport, Report};
use crate::notifications::{
    Notification, NotificationBroker, NotificationPayload, NotificationStream, NotificationView,
};
use crate::scheduler::BanScheduler;
use crate::storage::{open_service_db, BatchOp};
use crate::types::{
    format_timestamp, ActorId, ContentId, ContentKind, DurationUnit, EdgeKind, NotificationId,
    NotificationKind, ReportId, ReportStatus, Role, TargetKind, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// =============================================================================
// Request and View Types
// =============================================================================

/// Action applied to a report's target as part of resolving it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationAction {
    /// Ban the reported user, or the owner of the reported content.
    #[serde(rename_all = "camelCase")]
    BanTarget {
        permanent: bool,
        #[serde(default)]
        duration: Option<u32>,
        #[serde(default)]
        duration_unit: Option<DurationUnit>,
        reason: String,
    },
    /// Delete the reported user, post or comment.
    DeleteTarget,
}

/// Body of a resolve command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub action: Option<ModerationAction>,
}

/// Body of a dismiss command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DismissRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// A notification pushed in by a content collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalNotification {
    pub recipient_id: ActorId,
    pub kind: NotificationKind,
    #[serde(default)]
    pub creator_id: Option<ActorId>,
    #[serde(default)]
    pub post_id: Option<ContentId>,
    #[serde(default)]
    pub comment_id: Option<ContentId>,
    pub content: String,
}

/// Body of a bulk ban: one ban applied to each listed actor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkBanRequest {
    pub user_ids: Vec<ActorId>,
    #[serde(flatten)]
    pub ban: BanRequest,
}

/// Result of a bulk command for one actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub actor_id: ActorId,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkOutcome {
    fn of(actor_id: ActorId, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                actor_id,
                ok: true,
                error: None,
            },
            Err(e) => Self {
                actor_id,
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Like state of a post or comment as seen by one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeState {
    pub liked: bool,
    pub count: u64,
}

/// Administrative view of an actor with derived ban state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorView {
    pub id: ActorId,
    pub username: String,
    pub role: Role,
    pub created_at: Timestamp,
    pub banned: bool,
    pub ban_permanent: bool,
    pub ban_expires_at: Option<Timestamp>,
    pub ban_reason: Option<String>,
    pub followers: u64,
    pub following: u64,
}

/// Dashboard totals, computed from current state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_actors: u64,
    pub banned_actors: u64,
    pub pending_reports: u64,
    pub critical_reports: u64,
    pub resolved_reports: u64,
    pub dismissed_reports: u64,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Orchestrates directory, edges, moderation and notifications.
pub struct Coordinator {
    directory: Arc<ActorDirectory>,
    edges: Arc<EdgeStore>,
    moderation: Arc<ModerationEngine>,
    notifications: Arc<NotificationBroker>,
    clock: SharedClock,
    config: ServiceConfig,
}

impl Coordinator {
    /// Builds all components from configuration, loading persisted state
    /// unless `in_memory` is set.
    pub fn open(config: ServiceConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;

        if config.in_memory {
            info!("Running with in-memory state, nothing will be persisted");
            return Ok(Self::in_memory(config, clock));
        }

        let db = open_service_db(&config.data_dir)?;
        let notifications = NotificationBroker::open(
            db.clone(),
            config.stream_channel_capacity,
            config.max_notifications_per_page,
        )?;

        Ok(Self {
            directory: Arc::new(ActorDirectory::open(db.clone())?),
            edges: Arc::new(EdgeStore::open(db.clone())?),
            moderation: Arc::new(ModerationEngine::open(db)?),
            notifications: Arc::new(notifications),
            clock,
            config,
        })
    }

    /// Builds memory-only components.
    pub fn in_memory(config: ServiceConfig, clock: SharedClock) -> Self {
        let notifications = NotificationBroker::in_memory(
            config.stream_channel_capacity,
            config.max_notifications_per_page,
        );
        Self {
            directory: Arc::new(ActorDirectory::in_memory()),
            edges: Arc::new(EdgeStore::in_memory()),
            moderation: Arc::new(ModerationEngine::in_memory()),
            notifications: Arc::new(notifications),
            clock,
            config,
        }
    }

    /// A ban expiry sweeper bound to this coordinator's moderation engine.
    pub fn ban_scheduler(&self) -> BanScheduler {
        BanScheduler::new(
            Arc::clone(&self.moderation),
            Arc::clone(&self.clock),
            self.config.sweep_batch_size,
        )
    }

    /// Active configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // =========================================================================
    // Identity and Authorization
    // =========================================================================

    /// Resolves the acting actor. Unknown and deleted actors are treated as
    /// unauthenticated.
    pub fn authenticate(&self, actor: Option<ActorId>) -> Result<ActorRecord> {
        let id = actor.ok_or_else(|| MurmurError::unauthenticated("no active session"))?;
        self.directory
            .get_actor(id)
            .ok_or_else(|| MurmurError::unauthenticated(format!("unknown actor {}", id)))
    }

    /// Authenticated actor that is not currently banned.
    pub fn require_mutator(&self, actor: Option<ActorId>) -> Result<ActorRecord> {
        let record = self.authenticate(actor)?;
        if self.moderation.ban_status(record.id, self.now()).is_some() {
            return Err(MurmurError::actor_banned(format!(
                "actor {} is banned",
                record.id
            )));
        }
        Ok(record)
    }

    /// Authenticated administrator.
    pub fn require_admin(&self, actor: Option<ActorId>) -> Result<ActorRecord> {
        let record = self.authenticate(actor)?;
        if record.role != Role::Admin {
            return Err(MurmurError::forbidden("administrator role required"));
        }
        Ok(record)
    }

    // =========================================================================
    // Social Graph
    // =========================================================================

    /// Likes a post. Liking an already liked post changes nothing.
    pub fn like(&self, actor: Option<ActorId>, post: ContentId) -> Result<EdgeState> {
        self.mutate_edge(actor, post, EdgeKind::Like, Some(true))
    }

    /// Removes a like. Silent; never notifies.
    pub fn unlike(&self, actor: Option<ActorId>, post: ContentId) -> Result<EdgeState> {
        self.mutate_edge(actor, post, EdgeKind::Like, Some(false))
    }

    /// Flips the like on a post.
    pub fn toggle_like(&self, actor: Option<ActorId>, post: ContentId) -> Result<EdgeState> {
        self.mutate_edge(actor, post, EdgeKind::Like, None)
    }

    /// Likes a comment.
    pub fn like_comment(&self, actor: Option<ActorId>, comment: ContentId) -> Result<EdgeState> {
        self.mutate_edge(actor, comment, EdgeKind::CommentLike, Some(true))
    }

    /// Removes a comment like. Silent.
    pub fn unlike_comment(&self, actor: Option<ActorId>, comment: ContentId) -> Result<EdgeState> {
        self.mutate_edge(actor, comment, EdgeKind::CommentLike, Some(false))
    }

    /// Flips the like on a comment.
    pub fn toggle_comment_like(
        &self,
        actor: Option<ActorId>,
        comment: ContentId,
    ) -> Result<EdgeState> {
        self.mutate_edge(actor, comment, EdgeKind::CommentLike, None)
    }

    /// Follows an actor. Following twice changes nothing.
    pub fn follow(&self, actor: Option<ActorId>, target: ActorId) -> Result<EdgeState> {
        self.mutate_edge(actor, target, EdgeKind::Follow, Some(true))
    }

    /// Stops following an actor. Silent; never notifies.
    pub fn unfollow(&self, actor: Option<ActorId>, target: ActorId) -> Result<EdgeState> {
        self.mutate_edge(actor, target, EdgeKind::Follow, Some(false))
    }

    /// Flips the follow edge to an actor.
    pub fn toggle_follow(&self, actor: Option<ActorId>, target: ActorId) -> Result<EdgeState> {
        self.mutate_edge(actor, target, EdgeKind::Follow, None)
    }

    /// `desired = None` toggles; `Some(x)` sets the edge state to `x`.
    fn mutate_edge(
        &self,
        actor: Option<ActorId>,
        target: u64,
        kind: EdgeKind,
        desired: Option<bool>,
    ) -> Result<EdgeState> {
        let source = self.authenticate(actor)?;
        match kind.liked_content() {
            Some(content_kind) => {
                self.directory.content_owner(content_kind, target)?;
            }
            None => {
                self.directory.require_actor(target)?;
            }
        }

        let now = self.now();
        let bans = self.moderation.as_ref();
        let change = match desired {
            Some(desired) => self
                .edges
                .set_active(source.id, target, kind, desired, bans, now)?,
            None => self.edges.toggle(source.id, target, kind, bans, now)?,
        };

        if let Some(event) = change.event {
            self.notify_edge(&source, event, now);
        }
        Ok(change.state)
    }

    /// Sends the notification for a newly created edge.
    fn notify_edge(&self, source: &ActorRecord, event: EdgeEvent, now: Timestamp) {
        let (recipient, content, post_id, comment_id) = match event.kind.liked_content() {
            None => (
                event.target,
                format!("{} started following you", source.username),
                None,
                None,
            ),
            Some(kind) => {
                let Ok(owner) = self.directory.content_owner(kind, event.target) else {
                    return;
                };
                let (noun, post_id, comment_id) = match kind {
                    ContentKind::Post => ("post", Some(event.target), None),
                    ContentKind::Comment => ("comment", None, Some(event.target)),
                };
                (
                    owner,
                    format!("{} liked your {}", source.username, noun),
                    post_id,
                    comment_id,
                )
            }
        };
        if recipient == source.id {
            return;
        }

        let payload = NotificationPayload {
            creator_id: Some(source.id),
            creator_name: source.username.clone(),
            post_id,
            comment_id,
            content,
        };
        self.deliver(recipient, event.kind.into(), payload, now);
    }

    /// Returns true if `actor` follows `target`.
    pub fn is_following(&self, actor: Option<ActorId>, target: ActorId) -> Result<bool> {
        let viewer = self.authenticate(actor)?;
        self.directory.require_actor(target)?;
        Ok(self.edges.is_active(viewer.id, target, EdgeKind::Follow))
    }

    /// Like state of a post for the viewer.
    pub fn like_state(&self, actor: Option<ActorId>, post: ContentId) -> Result<LikeState> {
        self.content_like_state(actor, ContentKind::Post, post)
    }

    /// Like state of a comment for the viewer.
    pub fn comment_like_state(
        &self,
        actor: Option<ActorId>,
        comment: ContentId,
    ) -> Result<LikeState> {
        self.content_like_state(actor, ContentKind::Comment, comment)
    }

    fn content_like_state(
        &self,
        actor: Option<ActorId>,
        kind: ContentKind,
        id: ContentId,
    ) -> Result<LikeState> {
        let viewer = self.authenticate(actor)?;
        self.directory.content_owner(kind, id)?;
        let edge = EdgeKind::like_of(kind);
        Ok(LikeState {
            liked: self.edges.is_active(viewer.id, id, edge),
            count: self.edges.count(edge, id),
        })
    }

    /// Number of followers of `target`.
    pub fn follower_count(&self, actor: Option<ActorId>, target: ActorId) -> Result<u64> {
        self.authenticate(actor)?;
        self.directory.require_actor(target)?;
        Ok(self.edges.follower_count(target))
    }

    /// Number of actors `target` follows.
    pub fn following_count(&self, actor: Option<ActorId>, target: ActorId) -> Result<u64> {
        self.authenticate(actor)?;
        self.directory.require_actor(target)?;
        Ok(self.edges.following_count(target))
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// Files a report. Banned actors cannot report.
    pub fn create_report(&self, actor: Option<ActorId>, input: NewReport) -> Result<Report> {
        let reporter = self.require_mutator(actor)?;
        let owner = self
            .directory
            .target_owner(input.target_kind, input.target_id)?;
        self.moderation
            .create_report(reporter.id, owner, input, self.now())
    }

    /// Reports filed by the acting actor.
    pub fn my_reports(&self, actor: Option<ActorId>) -> Result<Vec<Report>> {
        let reporter = self.authenticate(actor)?;
        Ok(self.moderation.list_by_reporter(reporter.id))
    }

    /// All reports, optionally filtered by status.
    pub fn list_reports(
        &self,
        actor: Option<ActorId>,
        status: Option<ReportStatus>,
    ) -> Result<Vec<Report>> {
        self.require_admin(actor)?;
        Ok(self.moderation.list_reports(status))
    }

    /// One report.
    pub fn get_report(&self, actor: Option<ActorId>, id: ReportId) -> Result<Report> {
        self.require_admin(actor)?;
        self.moderation.get_report(id)
    }

    /// Raises a pending report to CRITICAL.
    pub fn escalate_report(&self, actor: Option<ActorId>, id: ReportId) -> Result<Report> {
        self.require_admin(actor)?;
        self.moderation.escalate(id)
    }

    /// Dismisses a pending report and tells the reporter.
    pub fn dismiss_report(
        &self,
        actor: Option<ActorId>,
        id: ReportId,
        request: DismissRequest,
    ) -> Result<Report> {
        let admin = self.require_admin(actor)?;
        let now = self.now();
        let report = self.moderation.dismiss(id, admin.id, request.reason, now)?;
        self.notify_reporter(&report, now);
        Ok(report)
    }

    /// Resolves a pending report, optionally acting on its target first.
    ///
    /// With an action, the action and the status change are one write: if
    /// the action is refused (for example banning an administrator) the
    /// report stays pending.
    pub fn resolve_report(
        &self,
        actor: Option<ActorId>,
        id: ReportId,
        request: ResolveRequest,
    ) -> Result<Report> {
        let admin = self.require_admin(actor)?;
        let now = self.now();

        let report = match request.action {
            None => self.moderation.resolve(id, admin.id, request.note, now)?,
            Some(ModerationAction::BanTarget {
                permanent,
                duration,
                duration_unit,
                reason,
            }) => {
                let ban = BanRequest {
                    permanent,
                    duration,
                    duration_unit,
                    reason,
                };
                let mut issued = None;
                let report =
                    self.moderation
                        .resolve_with(id, admin.id, request.note, now, |report, op| {
                            let owner = self
                                .directory
                                .target_owner(report.target_kind, report.target_id)?;
                            let target = self.directory.require_actor(owner)?;
                            issued = Some(self.moderation.ban_actor_with(
                                &target,
                                &ban,
                                admin.id,
                                now,
                                vec![op],
                            )?);
                            Ok(())
                        })?;
                if let Some(record) = issued {
                    self.notify_banned(&record, now);
                }
                report
            }
            Some(ModerationAction::DeleteTarget) => {
                let report =
                    self.moderation
                        .resolve_with(id, admin.id, request.note, now, |report, op| {
                            self.tombstone(report.target_kind, report.target_id, vec![op])
                        })?;
                let closed = self.after_delete(
                    report.target_kind,
                    report.target_id,
                    Some(admin.id),
                    now,
                    Some(report.id),
                );
                for other in &closed {
                    self.notify_reporter(other, now);
                }
                report
            }
        };

        self.notify_reporter(&report, now);
        Ok(report)
    }

    /// Tombstones a report target, committing `extra` in the same batch.
    /// Administrators cannot be deleted.
    fn tombstone(&self, kind: TargetKind, id: u64, extra: Vec<BatchOp>) -> Result<()> {
        match kind.content_kind() {
            Some(content_kind) => {
                self.directory.delete_content(content_kind, id, extra)?;
            }
            None => {
                let target = self.directory.require_actor(id)?;
                if target.role == Role::Admin {
                    return Err(MurmurError::privileged_target(format!(
                        "actor {} is an administrator",
                        id
                    )));
                }
                self.directory.delete_actor(id, extra)?;
            }
        }
        Ok(())
    }

    /// Cleanup once a tombstone is durable. Returns the reports it closed,
    /// `except` excluded.
    ///
    /// Content loses its likes and pending reports. An actor additionally
    /// loses their posts and comments (each cleaned up the same way), their
    /// edges, their ban, their inbox and live sessions; reports they filed
    /// are kept with the reporter marked deleted. The deletion already
    /// stands, so a failing step is logged and the rest still run.
    fn after_delete(
        &self,
        kind: TargetKind,
        id: u64,
        by: Option<ActorId>,
        now: Timestamp,
        except: Option<ReportId>,
    ) -> Vec<Report> {
        let Some(content_kind) = kind.content_kind() else {
            return self.after_actor_delete(id, by, now, except);
        };
        cleanup(
            "drop likes",
            self.edges.remove_target(EdgeKind::like_of(content_kind), id),
        );
        cleanup(
            "close reports",
            self.moderation
                .resolve_reports_for_target(kind, id, by, TARGET_DELETED_NOTE, now, except),
        )
    }

    fn after_actor_delete(
        &self,
        actor: ActorId,
        by: Option<ActorId>,
        now: Timestamp,
        except: Option<ReportId>,
    ) -> Vec<Report> {
        let mut closed = Vec::new();
        for content in self.directory.content_owned_by(actor) {
            if let Err(e) = self
                .directory
                .delete_content(content.kind, content.id, Vec::new())
            {
                error!(
                    actor,
                    kind = %content.kind,
                    id = content.id,
                    "Failed to delete content of deleted actor: {}",
                    e
                );
                continue;
            }
            closed.extend(self.after_delete(content.kind.into(), content.id, by, now, None));
        }

        cleanup("remove edges", self.edges.remove_actor(actor));
        closed.extend(cleanup(
            "close reports",
            self.moderation
                .on_actor_deleted(actor, by, TARGET_DELETED_NOTE, now, except),
        ));
        cleanup("purge notifications", self.notifications.purge_actor(actor));
        closed
    }

    // =========================================================================
    // Actor Administration
    // =========================================================================

    /// Bans an actor and notifies them.
    pub fn ban_actor(
        &self,
        actor: Option<ActorId>,
        target: ActorId,
        request: BanRequest,
    ) -> Result<BanRecord> {
        let admin = self.require_admin(actor)?;
        let target = self.directory.require_actor(target)?;
        let now = self.now();
        let record = self
            .moderation
            .ban_actor(&target, &request, admin.id, now)?;
        self.notify_banned(&record, now);
        Ok(record)
    }

    /// Lifts a ban. Unbanning an actor that is not banned succeeds silently;
    /// lifting an active ban notifies the actor.
    pub fn unban_actor(&self, actor: Option<ActorId>, target: ActorId) -> Result<bool> {
        let admin = self.require_admin(actor)?;
        self.directory.require_actor(target)?;
        let now = self.now();
        let was_banned = self.moderation.unban_actor(target, now)?;
        if was_banned {
            info!(actor = target, admin = admin.id, "Ban lifted by administrator");
            self.deliver(
                target,
                NotificationKind::Moderation,
                system_payload("Your ban has been lifted".to_string()),
                now,
            );
        }
        Ok(was_banned)
    }

    /// Deletes an actor with the full cascade: their content, edges, ban,
    /// notifications, live sessions, and auto-resolution of reports
    /// against them.
    pub fn delete_actor(&self, actor: Option<ActorId>, target: ActorId) -> Result<()> {
        let admin = self.require_admin(actor)?;
        let now = self.now();

        self.tombstone(TargetKind::User, target, Vec::new())?;
        for report in &self.after_delete(TargetKind::User, target, Some(admin.id), now, None) {
            self.notify_reporter(report, now);
        }
        Ok(())
    }

    /// Applies one ban to every listed actor.
    ///
    /// Each actor is handled on its own: an administrator or unknown id in
    /// the list fails only its own entry. Duplicate ids count once.
    pub fn bulk_ban(
        &self,
        actor: Option<ActorId>,
        request: BulkBanRequest,
    ) -> Result<Vec<BulkOutcome>> {
        let admin = self.require_admin(actor)?;
        let ids = bulk_targets(&request.user_ids)?;
        request.ban.validate()?;

        let outcomes: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let result = self
                    .ban_actor(Some(admin.id), id, request.ban.clone())
                    .map(|_| ());
                BulkOutcome::of(id, result)
            })
            .collect();
        log_bulk("ban", admin.id, &outcomes);
        Ok(outcomes)
    }

    /// Deletes every listed actor, each on its own like [`bulk_ban`](Self::bulk_ban).
    pub fn bulk_delete(
        &self,
        actor: Option<ActorId>,
        user_ids: &[ActorId],
    ) -> Result<Vec<BulkOutcome>> {
        let admin = self.require_admin(actor)?;
        let ids = bulk_targets(user_ids)?;

        let outcomes: Vec<_> = ids
            .into_iter()
            .map(|id| BulkOutcome::of(id, self.delete_actor(Some(admin.id), id)))
            .collect();
        log_bulk("delete", admin.id, &outcomes);
        Ok(outcomes)
    }

    /// Administrative view of an actor.
    pub fn actor_view(&self, actor: Option<ActorId>, target: ActorId) -> Result<ActorView> {
        self.require_admin(actor)?;
        let record = self.directory.require_actor(target)?;
        Ok(self.view_of(record, self.now()))
    }

    /// One page of live actors, ordered by id, with derived ban state.
    pub fn list_actors(
        &self,
        actor: Option<ActorId>,
        page: usize,
        size: usize,
    ) -> Result<Vec<ActorView>> {
        self.require_admin(actor)?;
        if !(1..=MAX_ACTOR_PAGE_SIZE).contains(&size) {
            return Err(MurmurError::validation(format!(
                "size must be between 1 and {}",
                MAX_ACTOR_PAGE_SIZE
            )));
        }
        let now = self.now();
        Ok(self
            .directory
            .live_actors()
            .into_iter()
            .skip(page.saturating_mul(size))
            .take(size)
            .map(|record| self.view_of(record, now))
            .collect())
    }

    fn view_of(&self, record: ActorRecord, now: Timestamp) -> ActorView {
        let ban = self.moderation.ban_status(record.id, now);
        ActorView {
            id: record.id,
            followers: self.edges.follower_count(record.id),
            following: self.edges.following_count(record.id),
            username: record.username,
            role: record.role,
            created_at: record.created_at,
            banned: ban.is_some(),
            ban_permanent: ban.as_ref().is_some_and(|b| b.permanent),
            ban_expires_at: ban.as_ref().and_then(|b| b.expires_at),
            ban_reason: ban.map(|b| b.reason),
        }
    }

    /// Dashboard totals.
    pub fn stats(&self, actor: Option<ActorId>) -> Result<DashboardStats> {
        self.require_admin(actor)?;
        let reports = self.moderation.report_counts();
        Ok(DashboardStats {
            total_actors: self.directory.live_actors().len() as u64,
            banned_actors: self.moderation.banned_count(self.now()),
            pending_reports: reports.pending,
            critical_reports: reports.critical,
            resolved_reports: reports.resolved,
            dismissed_reports: reports.dismissed,
        })
    }

    /// Whether an actor is banned right now.
    pub fn is_currently_banned(&self, target: ActorId) -> bool {
        self.moderation.ban_status(target, self.now()).is_some()
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Newest notifications of the acting actor.
    ///
    /// Banned actors can read their inbox but cannot change it.
    pub fn notifications(&self, actor: Option<ActorId>) -> Result<Vec<NotificationView>> {
        let reader = self.authenticate(actor)?;
        Ok(self
            .notifications
            .load(reader.id)
            .iter()
            .map(Notification::view)
            .collect())
    }

    /// Unread notifications of the acting actor.
    pub fn unread_count(&self, actor: Option<ActorId>) -> Result<u64> {
        let reader = self.authenticate(actor)?;
        Ok(self.notifications.unread_count(reader.id))
    }

    /// Marks one notification read.
    pub fn mark_read(&self, actor: Option<ActorId>, id: NotificationId) -> Result<NotificationView> {
        let reader = self.require_mutator(actor)?;
        self.notifications.mark_read(reader.id, id).map(|n| n.view())
    }

    /// Marks every notification read.
    pub fn mark_all_read(&self, actor: Option<ActorId>) -> Result<usize> {
        let reader = self.require_mutator(actor)?;
        self.notifications.mark_all_read(reader.id)
    }

    /// Deletes one notification.
    pub fn delete_notification(&self, actor: Option<ActorId>, id: NotificationId) -> Result<()> {
        let reader = self.require_mutator(actor)?;
        self.notifications.delete(reader.id, id)
    }

    /// Deletes every notification of the acting actor.
    pub fn clear_notifications(&self, actor: Option<ActorId>) -> Result<usize> {
        let reader = self.require_mutator(actor)?;
        self.notifications.clear(reader.id)
    }

    /// Opens a live notification stream for the acting actor.
    pub fn connect_stream(&self, actor: Option<ActorId>) -> Result<NotificationStream> {
        let reader = self.authenticate(actor)?;
        Ok(self.notifications.connect(reader.id))
    }

    /// Enqueues without failing the caller. Deleted recipients get nothing.
    fn deliver(
        &self,
        recipient: ActorId,
        kind: NotificationKind,
        payload: NotificationPayload,
        now: Timestamp,
    ) -> Option<Notification> {
        if self.directory.get_actor(recipient).is_none() {
            debug!(recipient, kind = %kind, "Dropped notification for missing recipient");
            return None;
        }
        match self.notifications.enqueue(recipient, kind, payload, now) {
            Ok(n) => Some(n),
            Err(e) => {
                error!(recipient, kind = %kind, "Failed to enqueue notification: {}", e);
                None
            }
        }
    }

    fn notify_banned(&self, record: &BanRecord, now: Timestamp) {
        let content = match record.expires_at {
            Some(at) => format!(
                "You have been banned until {}. Reason: {}",
                format_timestamp(at),
                record.reason
            ),
            None => format!("You have been permanently banned. Reason: {}", record.reason),
        };
        self.deliver(
            record.actor_id,
            NotificationKind::Moderation,
            system_payload(content),
            now,
        );
    }

    fn notify_reporter(&self, report: &Report, now: Timestamp) {
        if report.reporter_deleted {
            return;
        }
        let outcome = match report.status {
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
            ReportStatus::Pending => return,
        };
        let content = format!("Your report #{} has been {}", report.id, outcome);
        self.deliver(
            report.reporter_id,
            NotificationKind::Moderation,
            system_payload(content),
            now,
        );
    }

    // =========================================================================
    // Gateway (collaborator) Operations
    // =========================================================================

    /// Checks that an actor may open a session.
    pub fn begin_session(&self, actor: ActorId) -> Result<ActorRecord> {
        self.directory
            .get_actor(actor)
            .ok_or_else(|| MurmurError::not_found(format!("Actor {}", actor)))
    }

    /// Registers or updates an actor.
    ///
    /// Administrators are never banned, so promoting a banned actor lifts
    /// the ban.
    pub fn register_actor(&self, id: ActorId, username: &str, role: Role) -> Result<ActorRecord> {
        let now = self.now();
        let record = self.directory.upsert_actor(id, username, role, now)?;
        if record.role == Role::Admin && self.moderation.unban_actor(id, now)? {
            info!(actor = id, "Ban lifted on promotion to administrator");
        }
        Ok(record)
    }

    /// Registers or updates a post or comment.
    pub fn register_content(
        &self,
        kind: ContentKind,
        id: ContentId,
        owner: ActorId,
        excerpt: &str,
    ) -> Result<ContentRef> {
        self.directory
            .upsert_content(kind, id, owner, excerpt, self.now())
    }

    /// Content removed by its service: drop likes, close pending reports.
    pub fn content_removed(&self, kind: ContentKind, id: ContentId) -> Result<()> {
        let target_kind = TargetKind::from(kind);
        let now = self.now();
        self.tombstone(target_kind, id, Vec::new())?;
        for report in &self.after_delete(target_kind, id, None, now, None) {
            self.notify_reporter(report, now);
        }
        Ok(())
    }

    /// COMMENT / MENTION / SYSTEM notification from a collaborator.
    ///
    /// Returns `None` when suppressed: the creator is banned, or the
    /// creator is the recipient.
    pub fn external_notify(&self, request: ExternalNotification) -> Result<Option<NotificationView>> {
        if !request.kind.is_external() {
            return Err(MurmurError::validation(format!(
                "{} notifications cannot be created externally",
                request.kind
            )));
        }
        self.directory.require_actor(request.recipient_id)?;
        let now = self.now();

        let creator_name = match request.creator_id {
            Some(creator) => {
                let record = self.directory.require_actor(creator)?;
                if creator == request.recipient_id {
                    return Ok(None);
                }
                if self.moderation.ban_status(creator, now).is_some() {
                    warn!(creator, kind = %request.kind, "Suppressed notification from banned actor");
                    return Ok(None);
                }
                record.username
            }
            None => SYSTEM_CREATOR_NAME.to_string(),
        };

        let payload = NotificationPayload {
            creator_id: request.creator_id,
            creator_name,
            post_id: request.post_id,
            comment_id: request.comment_id,
            content: request.content,
        };
        self.notifications
            .enqueue(request.recipient_id, request.kind, payload, now)
            .map(|n| Some(n.view()))
    }
}

/// Unwraps a cleanup step, logging a failure instead of returning it.
fn cleanup<T: Default>(step: &str, result: Result<T>) -> T {
    result.unwrap_or_else(|e| {
        error!(step, "Cleanup after deletion failed: {}", e);
        T::default()
    })
}

/// Checks the size of a bulk id list and drops repeated ids, keeping order.
fn bulk_targets(ids: &[ActorId]) -> Result<Vec<ActorId>> {
    if ids.is_empty() || ids.len() > MAX_BULK_ACTORS {
        return Err(MurmurError::validation(format!(
            "userIds must name between 1 and {} actors",
            MAX_BULK_ACTORS
        )));
    }
    let mut seen = HashSet::new();
    Ok(ids.iter().copied().filter(|id| seen.insert(*id)).collect())
}

fn log_bulk(command: &str, admin: ActorId, outcomes: &[BulkOutcome]) {
    let failed = outcomes.iter().filter(|o| !o.ok).count();
    info!(command, admin, total = outcomes.len(), failed, "Bulk command finished");
}

fn system_payload(content: String) -> NotificationPayload {
    NotificationPayload {
        creator_id: None,
        creator_name: SYSTEM_CREATOR_NAME.to_string(),
        post_id: None,
        comment_id: None,
        content,
    }
}
