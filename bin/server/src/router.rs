//! Route table.
//!
//! Commands and reads are separate routers so each gets its own rate
//! limiter; both share the cookie session layer.

use crate::handlers::{self, admin, internal, notifications, reports, social, sse};
use crate::rate_limit::RateLimitLayer;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;
use tower_sessions::{cookie::SameSite, MemoryStore, SessionManagerLayer};
use tracing::info;

/// Cookie name of the session.
pub const SESSION_COOKIE: &str = "murmur-session";

/// Transport settings for [`build_router`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RouterOptions {
    /// Mark the session cookie `Secure` (HTTPS deployments).
    pub secure_cookies: bool,
    /// Rate limit by `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy_headers: bool,
}

pub fn build_router(state: AppState, options: RouterOptions) -> Router {
    let write_router = Router::new()
        .route("/likes/:post", post(social::like).delete(social::unlike))
        .route("/likes/:post/toggle", post(social::toggle_like))
        .route(
            "/likes/comment/:id",
            post(social::like_comment).delete(social::unlike_comment),
        )
        .route("/likes/comment/:id/toggle", post(social::toggle_comment_like))
        .route("/subscriptions/follow/:actor", post(social::follow))
        .route("/subscriptions/unfollow/:actor", delete(social::unfollow))
        .route("/subscriptions/toggle/:actor", post(social::toggle_follow))
        .route("/reports", post(reports::create_report))
        .route("/admin/users/:id/ban", post(admin::ban_actor))
        .route("/admin/users/:id/unban", post(admin::unban_actor))
        .route("/admin/users/:id", delete(admin::delete_actor))
        .route("/admin/users/bulk-ban", post(admin::bulk_ban))
        .route("/admin/users/bulk-delete", post(admin::bulk_delete))
        .route("/admin/reports/:id/resolve", post(reports::resolve_report))
        .route("/admin/reports/:id/dismiss", post(reports::dismiss_report))
        .route("/admin/reports/:id/escalate", post(reports::escalate_report))
        .route("/notifications/:id/read", put(notifications::mark_read))
        .route("/notifications/mark-all-read", put(notifications::mark_all_read))
        .route("/notifications", delete(notifications::clear))
        .route("/notifications/:id", delete(notifications::delete_one))
        .route("/session", delete(internal::end_session))
        .route("/internal/actors/:id", put(internal::put_actor))
        .route(
            "/internal/posts/:id",
            put(internal::put_post).delete(internal::delete_post),
        )
        .route(
            "/internal/comments/:id",
            put(internal::put_comment).delete(internal::delete_comment),
        )
        .route("/internal/sessions", post(internal::bind_session))
        .route("/internal/notifications", post(internal::notify))
        .layer(RateLimitLayer::for_writes(options.trust_proxy_headers));

    let read_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/likes/:post", get(social::like_state))
        .route("/likes/comment/:id", get(social::comment_like_state))
        .route("/subscriptions/is-following/:actor", get(social::is_following))
        .route(
            "/subscriptions/followers/count/:actor",
            get(social::follower_count),
        )
        .route(
            "/subscriptions/following/count/:actor",
            get(social::following_count),
        )
        .route("/reports/mine", get(reports::my_reports))
        .route("/admin/reports", get(reports::list_reports))
        .route("/admin/reports/:id", get(reports::get_report))
        .route("/admin/users", get(admin::list_actors))
        .route("/admin/users/:id", get(admin::actor_view))
        .route("/admin/stats", get(admin::stats))
        .route("/notifications", get(notifications::list))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/sse/notifications", get(sse::notifications))
        .layer(RateLimitLayer::for_reads(options.trust_proxy_headers));

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(options.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_name(SESSION_COOKIE)
        .with_http_only(true);

    Router::new()
        .merge(write_router)
        .merge(read_router)
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
}

/// Logs the route table at startup.
pub fn log_routes() {
    info!("Social:");
    info!("  POST   /likes/:post                     - Like a post");
    info!("  DELETE /likes/:post                     - Remove a like");
    info!("  POST   /likes/:post/toggle              - Flip a like");
    info!("  GET    /likes/:post                     - Like state and count");
    info!("  POST   /likes/comment/:id               - Like a comment");
    info!("  DELETE /likes/comment/:id               - Remove a comment like");
    info!("  POST   /likes/comment/:id/toggle        - Flip a comment like");
    info!("  GET    /likes/comment/:id               - Comment like state");
    info!("  POST   /subscriptions/follow/:actor     - Follow an actor");
    info!("  DELETE /subscriptions/unfollow/:actor   - Unfollow an actor");
    info!("  POST   /subscriptions/toggle/:actor     - Flip a follow");
    info!("  GET    /subscriptions/is-following/:actor");
    info!("  GET    /subscriptions/followers/count/:actor");
    info!("  GET    /subscriptions/following/count/:actor");
    info!("");
    info!("Moderation:");
    info!("  POST   /reports                         - File a report");
    info!("  GET    /reports/mine                    - Own reports");
    info!("  GET    /admin/reports?status=           - List reports");
    info!("  GET    /admin/reports/:id               - One report");
    info!("  POST   /admin/reports/:id/resolve       - Resolve, optionally acting");
    info!("  POST   /admin/reports/:id/dismiss       - Dismiss");
    info!("  POST   /admin/reports/:id/escalate      - Raise to CRITICAL");
    info!("  POST   /admin/users/:id/ban             - Ban an actor");
    info!("  POST   /admin/users/:id/unban           - Lift a ban");
    info!("  DELETE /admin/users/:id                 - Delete an actor");
    info!("  POST   /admin/users/bulk-ban            - Ban many actors");
    info!("  POST   /admin/users/bulk-delete         - Delete many actors");
    info!("  GET    /admin/users?page=&size=         - Actors with ban state");
    info!("  GET    /admin/users/:id                 - Actor with ban state");
    info!("  GET    /admin/stats                     - Dashboard totals");
    info!("");
    info!("Notifications:");
    info!("  GET    /notifications                   - Inbox, newest first");
    info!("  GET    /notifications/unread-count      - Unread count");
    info!("  PUT    /notifications/:id/read          - Mark one read");
    info!("  PUT    /notifications/mark-all-read     - Mark all read");
    info!("  DELETE /notifications/:id               - Delete one");
    info!("  DELETE /notifications                   - Clear inbox");
    info!("  GET    /sse/notifications               - Live stream");
    info!("");
    info!("Gateway (X-Gateway-Secret):");
    info!("  PUT    /internal/actors/:id             - Register actor");
    info!("  PUT    /internal/posts/:id              - Register post");
    info!("  DELETE /internal/posts/:id              - Post removed");
    info!("  PUT    /internal/comments/:id           - Register comment");
    info!("  DELETE /internal/comments/:id           - Comment removed");
    info!("  POST   /internal/sessions               - Bind session to actor");
    info!("  POST   /internal/notifications          - Comment/mention/system notification");
    info!("  DELETE /session                         - Log out");
}
