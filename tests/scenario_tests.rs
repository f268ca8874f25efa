//! End-to-end scenarios against the coordinator.
//!
//! Each test drives the public API the way the HTTP layer does and checks
//! the observable state afterwards.

use murmur::{
    ActorRecord, BanRequest, BanScheduler, Coordinator, DurationUnit, ManualClock,
    ModerationAction, ModerationEngine, MurmurError, NewReport, Priority, ReportReason,
    ReportStatus, ResolveRequest, Role, ServiceConfig, TargetKind,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const T0: u64 = 1_700_000_000_000;
const DAY: Duration = Duration::from_secs(86_400);

const ADMIN: u64 = 100;
const A: u64 = 1;
const B: u64 = 2;
const POST: u64 = 500;

fn platform() -> (Arc<Coordinator>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let coordinator = Coordinator::in_memory(ServiceConfig::in_memory(), clock.clone());
    coordinator.register_actor(ADMIN, "root", Role::Admin).unwrap();
    coordinator.register_actor(A, "alice", Role::User).unwrap();
    coordinator.register_actor(B, "bob", Role::User).unwrap();
    coordinator
        .register_content(murmur::ContentKind::Post, POST, B, "bob's first post")
        .unwrap();
    (Arc::new(coordinator), clock)
}

#[test]
fn test_toggle_follow_twice_restores_baseline() {
    let (c, _) = platform();
    let baseline = c.follower_count(Some(A), B).unwrap();

    let first = c.toggle_follow(Some(A), B).unwrap();
    assert!(first.active);
    assert_eq!(first.new_count, baseline + 1);

    let second = c.toggle_follow(Some(A), B).unwrap();
    assert!(!second.active);
    assert_eq!(second.new_count, baseline);
    assert!(!c.is_following(Some(A), B).unwrap());
}

#[test]
fn test_like_count_matches_edges_under_concurrency() {
    let (c, _) = platform();
    let likers: Vec<u64> = (1000..1032).collect();
    for id in &likers {
        c.register_actor(*id, &format!("user{}", id), Role::User)
            .unwrap();
    }

    let handles: Vec<_> = likers
        .iter()
        .map(|&id| {
            let c = c.clone();
            thread::spawn(move || {
                // Odd ids end liked, even ids end unliked.
                let flips = if id % 2 == 1 { 3 } else { 4 };
                for _ in 0..flips {
                    c.toggle_like(Some(id), POST).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let liked = likers
        .iter()
        .filter(|&&id| c.like_state(Some(id), POST).unwrap().liked)
        .count() as u64;
    assert_eq!(liked, 16);
    assert_eq!(c.like_state(Some(A), POST).unwrap().count, liked);
}

#[test]
fn test_thirty_day_ban_expires_after_sweep() {
    let moderation = Arc::new(ModerationEngine::in_memory());
    let clock = Arc::new(ManualClock::new(T0));
    let target = ActorRecord {
        id: B,
        username: "bob".to_string(),
        role: Role::User,
        created_at: T0,
        deleted: false,
    };

    let record = moderation
        .ban_actor(
            &target,
            &BanRequest::temporary(30, DurationUnit::Days, "repeated spam"),
            ADMIN,
            T0,
        )
        .unwrap();
    assert_eq!(record.expires_at, Some(T0 + 30 * DurationUnit::Days.millis()));

    let scheduler = BanScheduler::new(moderation.clone(), clock.clone(), 10);
    let early = scheduler.sweep_at(T0 + 29 * DurationUnit::Days.millis()).unwrap();
    assert_eq!(early.unbanned, 0);
    assert!(moderation.ban_status(B, T0 + DurationUnit::Days.millis()).is_some());

    let late = T0 + 31 * DurationUnit::Days.millis();
    let report = scheduler.sweep_at(late).unwrap();
    assert_eq!(report.unbanned, 1);
    assert!(moderation.ban_status(B, late).is_none());
    assert!(moderation.expired_candidates(late, 10).is_empty());
}

#[test]
fn test_scheduler_and_lazy_expiry_agree() {
    let (c, clock) = platform();
    c.ban_actor(
        Some(ADMIN),
        A,
        BanRequest::temporary(30, DurationUnit::Days, "cool off"),
    )
    .unwrap();
    assert!(c.actor_view(Some(ADMIN), A).unwrap().banned);

    clock.advance(DAY * 31);
    // No sweep has run, reads already see the ban as over.
    assert!(!c.actor_view(Some(ADMIN), A).unwrap().banned);
    assert!(!c.is_currently_banned(A));

    // The sweep finds nothing left to do.
    let report = c.ban_scheduler().sweep_at(clock_now(&clock)).unwrap();
    assert_eq!(report.unbanned, 0);
}

fn clock_now(clock: &ManualClock) -> u64 {
    use murmur::Clock;
    clock.now()
}

#[test]
fn test_admin_can_never_be_banned() {
    let (c, _) = platform();
    c.register_actor(101, "deputy", Role::Admin).unwrap();

    for request in [
        BanRequest::permanent("no"),
        BanRequest::temporary(1, DurationUnit::Hours, "no"),
    ] {
        let err = c.ban_actor(Some(ADMIN), 101, request).unwrap_err();
        assert!(matches!(err, MurmurError::PrivilegedTarget(_)));
    }
    assert!(!c.actor_view(Some(ADMIN), 101).unwrap().banned);
}

#[test]
fn test_resolved_report_rejects_dismiss() {
    let (c, _) = platform();
    let report = c
        .create_report(
            Some(A),
            NewReport {
                target_kind: TargetKind::User,
                target_id: B,
                reason: ReportReason::Harassment,
                description: None,
            },
        )
        .unwrap();
    c.resolve_report(Some(ADMIN), report.id, ResolveRequest::default())
        .unwrap();

    let err = c
        .dismiss_report(Some(ADMIN), report.id, Default::default())
        .unwrap_err();
    assert!(matches!(err, MurmurError::InvalidTransition(_)));
    assert_eq!(
        c.get_report(Some(ADMIN), report.id).unwrap().status,
        ReportStatus::Resolved
    );
}

#[test]
fn test_unread_count_after_mark_all_read_and_new_delivery() {
    let (c, _) = platform();
    c.follow(Some(A), B).unwrap();
    c.like(Some(A), POST).unwrap();
    assert_eq!(c.unread_count(Some(B)).unwrap(), 2);

    c.mark_all_read(Some(B)).unwrap();
    assert_eq!(c.unread_count(Some(B)).unwrap(), 0);

    c.unfollow(Some(A), B).unwrap();
    assert_eq!(c.unread_count(Some(B)).unwrap(), 0);
    c.follow(Some(A), B).unwrap();
    assert_eq!(c.unread_count(Some(B)).unwrap(), 1);
}

#[test]
fn test_follow_then_unfollow_notifications() {
    let (c, _) = platform();
    c.follow(Some(A), B).unwrap();

    let inbox = c.notifications(Some(B)).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].creator_name, "alice");
    assert!(inbox[0].content.contains("following"));

    c.unfollow(Some(A), B).unwrap();
    assert_eq!(c.notifications(Some(B)).unwrap().len(), 1);
    assert!(c.notifications(Some(A)).unwrap().is_empty());
}

#[test]
fn test_report_escalate_resolve_scenario() {
    let (c, clock) = platform();
    let report = c
        .create_report(
            Some(A),
            NewReport {
                target_kind: TargetKind::Post,
                target_id: POST,
                reason: ReportReason::Spam,
                description: Some("link farm".to_string()),
            },
        )
        .unwrap();
    assert_eq!(report.status, ReportStatus::Pending);
    assert_eq!(report.priority, Priority::Medium);

    let escalated = c.escalate_report(Some(ADMIN), report.id).unwrap();
    assert_eq!(escalated.priority, Priority::Critical);
    assert_eq!(escalated.status, ReportStatus::Pending);

    clock.advance(Duration::from_secs(60));
    let resolved = c
        .resolve_report(
            Some(ADMIN),
            report.id,
            ResolveRequest {
                note: Some("warned".to_string()),
                action: None,
            },
        )
        .unwrap();
    assert_eq!(resolved.status, ReportStatus::Resolved);
    assert_eq!(resolved.resolved_at, Some(T0 + 60_000));
    assert_eq!(resolved.resolved_by, Some(ADMIN));

    assert!(matches!(
        c.resolve_report(Some(ADMIN), report.id, ResolveRequest::default()),
        Err(MurmurError::InvalidTransition(_))
    ));
    assert!(matches!(
        c.dismiss_report(Some(ADMIN), report.id, Default::default()),
        Err(MurmurError::InvalidTransition(_))
    ));
    assert!(matches!(
        c.escalate_report(Some(ADMIN), report.id),
        Err(MurmurError::InvalidTransition(_))
    ));

    // The reporter hears back.
    let inbox = c.notifications(Some(A)).unwrap();
    assert_eq!(inbox.len(), 1);
}

#[test]
fn test_ban_through_report_blocks_owner() {
    let (c, _) = platform();
    let report = c
        .create_report(
            Some(A),
            NewReport {
                target_kind: TargetKind::Post,
                target_id: POST,
                reason: ReportReason::HateSpeech,
                description: None,
            },
        )
        .unwrap();
    c.resolve_report(
        Some(ADMIN),
        report.id,
        ResolveRequest {
            note: None,
            action: Some(ModerationAction::BanTarget {
                permanent: true,
                duration: None,
                duration_unit: None,
                reason: "hate speech".to_string(),
            }),
        },
    )
    .unwrap();

    assert!(c.is_currently_banned(B));
    assert!(matches!(
        c.follow(Some(B), A),
        Err(MurmurError::ActorBanned(_))
    ));
    // Reads stay open to the banned actor.
    assert!(c.notifications(Some(B)).is_ok());
}

#[test]
fn test_concurrent_follow_toggles_keep_counter_exact() {
    let (c, _) = platform();
    let followers: Vec<u64> = (2000..2016).collect();
    for id in &followers {
        c.register_actor(*id, &format!("f{}", id), Role::User)
            .unwrap();
    }

    let handles: Vec<_> = followers
        .iter()
        .map(|&id| {
            let c = c.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    c.toggle_follow(Some(id), B).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Five toggles each leave every edge active.
    assert_eq!(c.follower_count(Some(A), B).unwrap(), 16);
    // One FOLLOW notification per creation: three creations per follower.
    assert_eq!(c.unread_count(Some(B)).unwrap(), 48);
}
