//! Automatic unban of expired temporary bans.
//!
//! The sweep walks the moderation engine's expiry index in small batches and
//! releases every ban whose expiry has passed. Each candidate is re-checked
//! under its own ban slot lock, so a sweep racing a manual unban or a fresh
//! replacement ban never undoes the newer decision. No lock is held between
//! batches.
//!
//! The sweep is only the primary path: reads of ban status re-check expiry
//! themselves, so a late sweep never leaves anyone banned past expiry.

use crate::clock::SharedClock;
use crate::error::Result;
use crate::moderation::ModerationEngine;
use crate::types::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Totals for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Candidates taken from the expiry index.
    pub examined: usize,
    /// Bans actually released by this sweep.
    pub unbanned: usize,
    /// Batches processed.
    pub batches: usize,
}

/// Periodic ban expiry sweeper.
pub struct BanScheduler {
    moderation: Arc<ModerationEngine>,
    clock: SharedClock,
    batch_size: usize,
}

impl BanScheduler {
    /// Creates a scheduler processing `batch_size` candidates at a time.
    pub fn new(moderation: Arc<ModerationEngine>, clock: SharedClock, batch_size: usize) -> Self {
        Self {
            moderation,
            clock,
            batch_size: batch_size.max(1),
        }
    }

    /// Processes one batch of candidates expired at `now`.
    fn sweep_batch(&self, now: Timestamp, report: &mut SweepReport) -> Result<bool> {
        let candidates = self.moderation.expired_candidates(now, self.batch_size);
        if candidates.is_empty() {
            return Ok(false);
        }

        let mut released = 0;
        for actor in &candidates {
            if self.moderation.unban_if_expired(*actor, now)? {
                debug!(actor, "Ban expired, actor released");
                released += 1;
            }
        }

        report.examined += candidates.len();
        report.unbanned += released;
        report.batches += 1;

        // Nothing moved: the remaining candidates are stuck, retry next tick.
        Ok(released > 0)
    }

    /// Runs a full sweep synchronously against the given time.
    pub fn sweep_at(&self, now: Timestamp) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        while self.sweep_batch(now, &mut report)? {}
        Ok(report)
    }

    /// Runs a full sweep at the clock's current time, yielding between
    /// batches so request handlers are never starved.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        while self.sweep_batch(now, &mut report)? {
            tokio::task::yield_now().await;
        }
        Ok(report)
    }

    /// Spawns the periodic sweep. The task ends when `shutdown` flips to true
    /// or its sender is dropped.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        info!("Starting ban expiry sweep, interval: {}s", interval.as_secs());

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.tick().await; // Skip first immediate tick

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        match self.sweep().await {
                            Ok(report) if report.unbanned > 0 => {
                                info!(
                                    "Ban sweep: {} released, {} examined",
                                    report.unbanned, report.examined
                                );
                            }
                            Ok(_) => debug!("Ban sweep: nothing expired"),
                            Err(e) => error!("Ban sweep failed: {}", e),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Ban expiry sweep stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::directory::ActorRecord;
    use crate::edges::BanOracle;
    use crate::moderation::BanRequest;
    use crate::types::{DurationUnit, Role};

    const DAY: u64 = 24 * 60 * 60 * 1000;

    fn user(id: u64) -> ActorRecord {
        ActorRecord {
            id,
            username: format!("user{}", id),
            role: Role::User,
            created_at: 0,
            deleted: false,
        }
    }

    fn setup(batch: usize) -> (Arc<ModerationEngine>, Arc<ManualClock>, BanScheduler) {
        let engine = Arc::new(ModerationEngine::in_memory());
        let clock = Arc::new(ManualClock::new(0));
        let scheduler = BanScheduler::new(Arc::clone(&engine), clock.clone(), batch);
        (engine, clock, scheduler)
    }

    #[test]
    fn test_sweep_releases_expired_bans_in_batches() {
        let (engine, _clock, scheduler) = setup(3);
        for id in 1..=7 {
            engine
                .ban_actor(&user(id), &BanRequest::temporary(30, DurationUnit::Days, "x"), 99, 0)
                .unwrap();
        }
        engine
            .ban_actor(&user(8), &BanRequest::permanent("x"), 99, 0)
            .unwrap();

        let early = scheduler.sweep_at(29 * DAY).unwrap();
        assert_eq!(early.unbanned, 0);

        let report = scheduler.sweep_at(31 * DAY).unwrap();
        assert_eq!(report.unbanned, 7);
        assert_eq!(report.batches, 3);
        assert!(engine.is_currently_banned(8, 31 * DAY));
        assert_eq!(engine.banned_count(31 * DAY), 1);
    }

    #[test]
    fn test_sweep_after_manual_unban_is_noop() {
        let (engine, _clock, scheduler) = setup(10);
        engine
            .ban_actor(&user(1), &BanRequest::temporary(1, DurationUnit::Hours, "x"), 99, 0)
            .unwrap();
        engine.unban_actor(1, 10).unwrap();

        let report = scheduler.sweep_at(DAY).unwrap();
        assert_eq!(report.unbanned, 0);
    }

    #[tokio::test]
    async fn test_async_sweep_uses_clock() {
        let (engine, clock, scheduler) = setup(10);
        engine
            .ban_actor(&user(1), &BanRequest::temporary(30, DurationUnit::Days, "x"), 99, 0)
            .unwrap();

        clock.advance(Duration::from_millis(31 * DAY));
        let report = scheduler.sweep().await.unwrap();
        assert_eq!(report.unbanned, 1);
        assert!(!engine.is_currently_banned(1, clock.now()));
    }

    #[tokio::test]
    async fn test_spawned_task_sweeps_and_stops() {
        let (engine, clock, scheduler) = setup(10);
        engine
            .ban_actor(&user(1), &BanRequest::temporary(1, DurationUnit::Hours, "x"), 99, 0)
            .unwrap();
        clock.advance(Duration::from_millis(2 * 60 * 60 * 1000));

        let (tx, rx) = watch::channel(false);
        let handle = Arc::new(scheduler).spawn(Duration::from_millis(20), rx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(engine.expired_candidates(clock.now(), 10).is_empty());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
