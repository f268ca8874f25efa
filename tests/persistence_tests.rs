//! State survives a restart of the service.

use murmur::{
    BanRequest, ContentKind, Coordinator, DurationUnit, ManualClock, MurmurError, NewReport,
    ReportReason, ReportStatus, Role, ServiceConfig, SharedClock, TargetKind,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const T0: u64 = 1_700_000_000_000;

fn config(dir: &TempDir) -> ServiceConfig {
    ServiceConfig {
        data_dir: dir.path().to_path_buf(),
        in_memory: false,
        ..ServiceConfig::default()
    }
}

fn open(dir: &TempDir, clock: &Arc<ManualClock>) -> Coordinator {
    let clock: SharedClock = clock.clone();
    Coordinator::open(config(dir), clock).unwrap()
}

#[test]
fn test_restart_preserves_graph_reports_bans_and_inbox() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));

    let report_id = {
        let c = open(&dir, &clock);
        c.register_actor(1, "alice", Role::User).unwrap();
        c.register_actor(2, "bob", Role::User).unwrap();
        c.register_actor(3, "carol", Role::User).unwrap();
        c.register_actor(9, "root", Role::Admin).unwrap();
        c.register_content(ContentKind::Post, 40, 2, "hello").unwrap();

        c.follow(Some(1), 2).unwrap();
        c.follow(Some(3), 2).unwrap();
        c.like(Some(1), 40).unwrap();
        c.ban_actor(
            Some(9),
            3,
            BanRequest::temporary(2, DurationUnit::Days, "flooding"),
        )
        .unwrap();

        let report = c
            .create_report(
                Some(1),
                NewReport {
                    target_kind: TargetKind::Post,
                    target_id: 40,
                    reason: ReportReason::Spam,
                    description: None,
                },
            )
            .unwrap();
        c.mark_all_read(Some(2)).unwrap();
        report.id
    };

    let c = open(&dir, &clock);
    assert_eq!(c.follower_count(Some(1), 2).unwrap(), 2);
    assert!(c.is_following(Some(1), 2).unwrap());
    let like = c.like_state(Some(1), 40).unwrap();
    assert!(like.liked);
    assert_eq!(like.count, 1);

    assert!(c.is_currently_banned(3));
    assert_eq!(
        c.get_report(Some(9), report_id).unwrap().status,
        ReportStatus::Pending
    );
    assert_eq!(c.unread_count(Some(2)).unwrap(), 0);
    assert_eq!(c.notifications(Some(2)).unwrap().len(), 3);

    // Ids keep increasing after reload.
    let next = c
        .create_report(
            Some(2),
            NewReport {
                target_kind: TargetKind::User,
                target_id: 1,
                reason: ReportReason::Other,
                description: Some("test".to_string()),
            },
        )
        .unwrap();
    assert!(next.id > report_id);

    // The reloaded ban still expires on time.
    clock.advance(Duration::from_secs(2 * 86_400));
    assert!(!c.is_currently_banned(3));
}

#[test]
fn test_deleted_actor_stays_deleted_after_restart() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(T0));

    {
        let c = open(&dir, &clock);
        c.register_actor(1, "alice", Role::User).unwrap();
        c.register_actor(2, "bob", Role::User).unwrap();
        c.register_actor(9, "root", Role::Admin).unwrap();
        c.register_content(ContentKind::Post, 41, 1, "alice's post")
            .unwrap();
        c.follow(Some(1), 2).unwrap();
        c.like(Some(2), 41).unwrap();
        c.delete_actor(Some(9), 1).unwrap();
    }

    let c = open(&dir, &clock);
    assert_eq!(c.follower_count(Some(2), 2).unwrap(), 0);
    assert!(c.begin_session(1).is_err());
    assert!(c.register_actor(1, "alice-again", Role::User).is_err());
    // Their post went with them and cannot be liked again.
    assert!(matches!(
        c.like_state(Some(2), 41),
        Err(MurmurError::NotFound(_))
    ));
}
