//! Report state machine and ban records.
//!
//! Reports move `PENDING -> RESOLVED` or `PENDING -> DISMISSED`; escalation
//! only raises priority and is only allowed while pending. Any transition
//! out of a terminal state fails with `InvalidTransition` so callers can
//! detect stale views.
//!
//! Bans are kept one slot per actor. A slot holds at most one record; a new
//! ban replaces the old one. Whether an actor is banned is always derived by
//! comparing the record's expiry with the clock, never read from a flag, and
//! an expired record found during a read is cleared on the spot.
//!
//! ## Lock Order
//!
//! report row -> ban slot -> expiry index. Nothing here takes a report lock
//! while holding a ban slot.

use crate::constants::{MAX_BAN_DURATION_UNITS, MAX_REASON_LEN, MAX_REPORT_DESCRIPTION_LEN};
use crate::directory::ActorRecord;
use crate::edges::BanOracle;
use crate::error::{MurmurError, Result};
use crate::storage::{
    commit, id_key, BatchOp, RocksDbHandle, CF_BANS, CF_META, CF_REPORTS, META_NEXT_REPORT_ID,
};
use crate::sync::{lock, RowMap};
use crate::types::{
    ActorId, DurationUnit, Priority, ReportId, ReportReason, ReportStatus, Role, TargetKind,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, error, info};

// =============================================================================
// Reports
// =============================================================================

/// A user report against a post, comment or user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    pub reporter_id: ActorId,
    /// Set once the reporter's account is deleted; the report is kept.
    pub reporter_deleted: bool,
    pub target_kind: TargetKind,
    pub target_id: u64,
    pub reason: ReportReason,
    pub description: Option<String>,
    pub status: ReportStatus,
    pub priority: Priority,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub resolved_by: Option<ActorId>,
    pub resolution_note: Option<String>,
}

impl Report {
    fn ensure_pending(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(MurmurError::invalid_transition(format!(
                "report {} is already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    fn close(&mut self, status: ReportStatus, by: Option<ActorId>, note: Option<String>, now: Timestamp) {
        self.status = status;
        self.resolved_at = Some(now);
        self.resolved_by = by;
        self.resolution_note = note;
    }
}

/// Input for a new report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub target_kind: TargetKind,
    pub target_id: u64,
    pub reason: ReportReason,
    #[serde(default)]
    pub description: Option<String>,
}

/// Report totals by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCounts {
    pub pending: u64,
    /// Pending reports at CRITICAL priority.
    pub critical: u64,
    pub resolved: u64,
    pub dismissed: u64,
}

// =============================================================================
// Bans
// =============================================================================

/// Parameters of a ban as issued by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRequest {
    pub permanent: bool,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub duration_unit: Option<DurationUnit>,
    pub reason: String,
}

impl BanRequest {
    /// A permanent ban.
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            permanent: true,
            duration: None,
            duration_unit: None,
            reason: reason.into(),
        }
    }

    /// A temporary ban of `duration` units.
    pub fn temporary(duration: u32, unit: DurationUnit, reason: impl Into<String>) -> Self {
        Self {
            permanent: false,
            duration: Some(duration),
            duration_unit: Some(unit),
            reason: reason.into(),
        }
    }

    /// Checks reason and duration without issuing anything.
    pub fn validate(&self) -> Result<()> {
        self.length().map(|_| ())
    }

    /// Checks the request and returns the ban length for temporary bans.
    fn length(&self) -> Result<Option<(u32, DurationUnit)>> {
        validate_text("reason", &self.reason, MAX_REASON_LEN, true)?;
        if self.permanent {
            return Ok(None);
        }
        match (self.duration, self.duration_unit) {
            (Some(d), Some(unit)) if (1..=MAX_BAN_DURATION_UNITS).contains(&d) => {
                Ok(Some((d, unit)))
            }
            (Some(_), Some(_)) => Err(MurmurError::validation(format!(
                "duration must be between 1 and {}",
                MAX_BAN_DURATION_UNITS
            ))),
            _ => Err(MurmurError::validation(
                "temporary bans need a duration and durationUnit",
            )),
        }
    }
}

/// The active ban of an actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRecord {
    pub actor_id: ActorId,
    pub permanent: bool,
    pub duration_value: Option<u32>,
    pub duration_unit: Option<DurationUnit>,
    pub reason: String,
    pub issued_by: ActorId,
    pub issued_at: Timestamp,
    /// `None` for permanent bans.
    pub expires_at: Option<Timestamp>,
}

impl BanRecord {
    /// Returns true once a temporary ban has run out.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

fn validate_text(field: &str, text: &str, max: usize, required: bool) -> Result<()> {
    if required && text.trim().is_empty() {
        return Err(MurmurError::validation(format!("{} must not be empty", field)));
    }
    if text.chars().count() > max {
        return Err(MurmurError::validation(format!(
            "{} exceeds {} characters",
            field, max
        )));
    }
    Ok(())
}

fn normalize_note(note: Option<String>) -> Result<Option<String>> {
    match note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        Some(n) => {
            validate_text("note", &n, MAX_REASON_LEN, false)?;
            Ok(Some(n))
        }
        None => Ok(None),
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Owner of reports and ban records.
pub struct ModerationEngine {
    db: Option<RocksDbHandle>,
    reports: RowMap<ReportId, Report>,
    next_report_id: AtomicU64,
    bans: RowMap<ActorId, Option<BanRecord>>,
    /// `(expires_at, actor)` for every temporary ban.
    expiry_index: Mutex<BTreeSet<(Timestamp, ActorId)>>,
}

impl ModerationEngine {
    /// Creates an empty, memory-only engine.
    pub fn in_memory() -> Self {
        Self {
            db: None,
            reports: RowMap::new(),
            next_report_id: AtomicU64::new(1),
            bans: RowMap::new(),
            expiry_index: Mutex::new(BTreeSet::new()),
        }
    }

    /// Opens the engine, loading reports and ban records from disk.
    pub fn open(db: RocksDbHandle) -> Result<Self> {
        let reports = db.collect_all::<Report>(CF_REPORTS)?;
        let bans = db.collect_all::<BanRecord>(CF_BANS)?;

        let stored_next: u64 = db.get(CF_META, META_NEXT_REPORT_ID)?.unwrap_or(1);
        let next = reports
            .iter()
            .map(|r| r.id + 1)
            .max()
            .unwrap_or(1)
            .max(stored_next);

        let expiry_index = bans
            .iter()
            .filter_map(|b| b.expires_at.map(|at| (at, b.actor_id)))
            .collect();

        info!(
            reports = reports.len(),
            bans = bans.len(),
            next_report_id = next,
            "Loaded moderation state"
        );

        Ok(Self {
            db: Some(db),
            reports: RowMap::from_rows(reports.into_iter().map(|r| (r.id, r))),
            next_report_id: AtomicU64::new(next),
            bans: RowMap::from_rows(bans.into_iter().map(|b| (b.actor_id, Some(b)))),
            expiry_index: Mutex::new(expiry_index),
        })
    }

    // =========================================================================
    // Report Operations
    // =========================================================================

    /// Files a new report at MEDIUM priority.
    ///
    /// `target_owner` is the actor behind the target (the user itself for
    /// user reports); reporting yourself or your own content is rejected.
    pub fn create_report(
        &self,
        reporter: ActorId,
        target_owner: ActorId,
        input: NewReport,
        now: Timestamp,
    ) -> Result<Report> {
        if target_owner == reporter {
            return Err(MurmurError::validation("actors cannot report themselves"));
        }
        let description = input
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if let Some(d) = &description {
            validate_text("description", d, MAX_REPORT_DESCRIPTION_LEN, false)?;
        }

        let id = self.next_report_id.fetch_add(1, Ordering::SeqCst);
        let report = Report {
            id,
            reporter_id: reporter,
            reporter_deleted: false,
            target_kind: input.target_kind,
            target_id: input.target_id,
            reason: input.reason,
            description,
            status: ReportStatus::Pending,
            priority: Priority::Medium,
            created_at: now,
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
        };

        commit(
            self.db.as_ref(),
            &[
                BatchOp::put(CF_REPORTS, id_key(id).to_vec(), &report)?,
                BatchOp::put(CF_META, META_NEXT_REPORT_ID.to_vec(), &(id + 1))?,
            ],
        )?;
        self.reports.get_or_insert_with(id, || report.clone());

        info!(
            report = id,
            reporter,
            target_kind = %report.target_kind,
            target = report.target_id,
            reason = %report.reason,
            "Report filed"
        );
        Ok(report)
    }

    /// Returns a report.
    pub fn get_report(&self, id: ReportId) -> Result<Report> {
        self.reports
            .get(id)
            .map(|row| lock(&row).clone())
            .ok_or_else(|| MurmurError::not_found(format!("Report {}", id)))
    }

    /// All reports, optionally filtered by status, newest first.
    pub fn list_reports(&self, status: Option<ReportStatus>) -> Vec<Report> {
        self.collect_reports(|r| status.map_or(true, |s| r.status == s))
    }

    /// Reports filed by `reporter`, newest first.
    pub fn list_by_reporter(&self, reporter: ActorId) -> Vec<Report> {
        self.collect_reports(|r| r.reporter_id == reporter && !r.reporter_deleted)
    }

    fn collect_reports(&self, filter: impl Fn(&Report) -> bool) -> Vec<Report> {
        let mut reports: Vec<Report> = self
            .reports
            .handles()
            .into_iter()
            .map(|(_, row)| lock(&row).clone())
            .filter(|r| filter(r))
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        reports
    }

    /// Totals by state.
    pub fn report_counts(&self) -> ReportCounts {
        let mut counts = ReportCounts::default();
        for (_, row) in self.reports.handles() {
            let report = lock(&row);
            match report.status {
                ReportStatus::Pending => {
                    counts.pending += 1;
                    if report.priority == Priority::Critical {
                        counts.critical += 1;
                    }
                }
                ReportStatus::Resolved => counts.resolved += 1,
                ReportStatus::Dismissed => counts.dismissed += 1,
            }
        }
        counts
    }

    /// Raises a pending report to CRITICAL.
    pub fn escalate(&self, id: ReportId) -> Result<Report> {
        self.transition(id, |report| {
            report.ensure_pending()?;
            report.priority = Priority::Critical;
            Ok(())
        })
        .inspect(|r| info!(report = r.id, "Report escalated"))
    }

    /// Dismisses a pending report.
    pub fn dismiss(
        &self,
        id: ReportId,
        admin: ActorId,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<Report> {
        let note = normalize_note(reason)?;
        self.transition(id, |report| {
            report.ensure_pending()?;
            report.close(ReportStatus::Dismissed, Some(admin), note, now);
            Ok(())
        })
        .inspect(|r| info!(report = r.id, admin, "Report dismissed"))
    }

    /// Resolves a pending report without acting on its target.
    pub fn resolve(
        &self,
        id: ReportId,
        admin: ActorId,
        note: Option<String>,
        now: Timestamp,
    ) -> Result<Report> {
        self.resolve_with(id, admin, note, now, |_, op| commit(self.db.as_ref(), &[op]))
    }

    /// Resolves a pending report together with an action on its target.
    ///
    /// `action` gets the resolved report and the batch op that persists it,
    /// and must commit that op in the same batch as its own writes. If the
    /// action fails nothing has been written and the report stays pending,
    /// so the administrator can pick another action. The report row stays
    /// locked throughout.
    pub fn resolve_with<F>(
        &self,
        id: ReportId,
        admin: ActorId,
        note: Option<String>,
        now: Timestamp,
        action: F,
    ) -> Result<Report>
    where
        F: FnOnce(&Report, BatchOp) -> Result<()>,
    {
        let note = normalize_note(note)?;
        let row = self
            .reports
            .get(id)
            .ok_or_else(|| MurmurError::not_found(format!("Report {}", id)))?;
        let mut current = lock(&row);
        current.ensure_pending()?;

        let mut updated = current.clone();
        updated.close(ReportStatus::Resolved, Some(admin), note, now);
        let op = BatchOp::put(CF_REPORTS, id_key(id).to_vec(), &updated)?;
        action(&updated, op)?;
        *current = updated.clone();

        info!(report = id, admin, "Report resolved");
        Ok(updated)
    }

    /// Applies `change` to a copy of the report, persists it and only then
    /// replaces the stored row.
    fn transition<F>(&self, id: ReportId, change: F) -> Result<Report>
    where
        F: FnOnce(&mut Report) -> Result<()>,
    {
        let row = self
            .reports
            .get(id)
            .ok_or_else(|| MurmurError::not_found(format!("Report {}", id)))?;
        let mut current = lock(&row);

        let mut updated = current.clone();
        change(&mut updated)?;
        if updated != *current {
            commit(
                self.db.as_ref(),
                &[BatchOp::put(CF_REPORTS, id_key(id).to_vec(), &updated)?],
            )?;
            *current = updated.clone();
        }
        Ok(updated)
    }

    /// Resolves every pending report on a target, skipping `except`.
    ///
    /// Used when the target disappears. Returns the reports it closed.
    pub fn resolve_reports_for_target(
        &self,
        kind: TargetKind,
        target: u64,
        by: Option<ActorId>,
        note: &str,
        now: Timestamp,
        except: Option<ReportId>,
    ) -> Result<Vec<Report>> {
        let mut closed = Vec::new();
        for (id, row) in self.reports.handles() {
            if Some(id) == except {
                continue;
            }
            let mut current = lock(&row);
            if current.status != ReportStatus::Pending
                || current.target_kind != kind
                || current.target_id != target
            {
                continue;
            }
            let mut updated = current.clone();
            updated.close(ReportStatus::Resolved, by, Some(note.to_string()), now);
            commit(
                self.db.as_ref(),
                &[BatchOp::put(CF_REPORTS, id_key(id).to_vec(), &updated)?],
            )?;
            *current = updated.clone();
            closed.push(updated);
        }

        if !closed.is_empty() {
            info!(target_kind = %kind, target_id = target, count = closed.len(), "Auto-resolved reports");
        }
        Ok(closed)
    }

    /// Cleans up after an actor is deleted.
    ///
    /// Their own reports are kept with the reporter tombstoned, pending
    /// reports against them are resolved with `note`, and their ban record
    /// is removed. Returns the reports that were resolved.
    pub fn on_actor_deleted(
        &self,
        actor: ActorId,
        by: Option<ActorId>,
        note: &str,
        now: Timestamp,
        except: Option<ReportId>,
    ) -> Result<Vec<Report>> {
        for (id, row) in self.reports.handles() {
            let mut current = lock(&row);
            if current.reporter_id != actor || current.reporter_deleted {
                continue;
            }
            let mut updated = current.clone();
            updated.reporter_deleted = true;
            commit(
                self.db.as_ref(),
                &[BatchOp::put(CF_REPORTS, id_key(id).to_vec(), &updated)?],
            )?;
            *current = updated;
        }

        let closed =
            self.resolve_reports_for_target(TargetKind::User, actor, by, note, now, except)?;
        self.unban_actor(actor, now)?;
        Ok(closed)
    }

    // =========================================================================
    // Ban Operations
    // =========================================================================

    /// Bans an actor, replacing any existing ban.
    pub fn ban_actor(
        &self,
        target: &ActorRecord,
        request: &BanRequest,
        issued_by: ActorId,
        now: Timestamp,
    ) -> Result<BanRecord> {
        self.ban_actor_with(target, request, issued_by, now, Vec::new())
    }

    /// Like [`ban_actor`](Self::ban_actor), committing `extra` in the same
    /// batch as the ban record.
    pub fn ban_actor_with(
        &self,
        target: &ActorRecord,
        request: &BanRequest,
        issued_by: ActorId,
        now: Timestamp,
        extra: Vec<BatchOp>,
    ) -> Result<BanRecord> {
        if target.role == Role::Admin {
            return Err(MurmurError::privileged_target(format!(
                "actor {} is an administrator",
                target.id
            )));
        }
        let length = request.length()?;

        let record = BanRecord {
            actor_id: target.id,
            permanent: request.permanent,
            duration_value: length.map(|(d, _)| d),
            duration_unit: length.map(|(_, u)| u),
            reason: request.reason.trim().to_string(),
            issued_by,
            issued_at: now,
            expires_at: length.map(|(d, unit)| now.saturating_add(d as u64 * unit.millis())),
        };

        let mut ops = extra;
        ops.push(BatchOp::put(CF_BANS, id_key(target.id).to_vec(), &record)?);

        let slot = self.bans.get_or_insert_with(target.id, || None);
        let mut slot = lock(&slot);
        commit(self.db.as_ref(), &ops)?;

        let mut index = lock(&self.expiry_index);
        if let Some(at) = slot.as_ref().and_then(|old| old.expires_at) {
            index.remove(&(at, target.id));
        }
        if let Some(at) = record.expires_at {
            index.insert((at, target.id));
        }
        drop(index);
        *slot = Some(record.clone());

        info!(
            actor = target.id,
            permanent = record.permanent,
            expires_at = ?record.expires_at,
            issued_by,
            "Actor banned"
        );
        Ok(record)
    }

    /// Removes an actor's ban. Unbanning an actor without a ban succeeds.
    ///
    /// Returns true if the actor was banned at `now`.
    pub fn unban_actor(&self, actor: ActorId, now: Timestamp) -> Result<bool> {
        self.clear_ban(actor, |record| Some(!record.is_expired(now)))
            .map(|cleared| cleared.unwrap_or(false))
            .inspect(|was_banned| {
                if *was_banned {
                    info!(actor, "Actor unbanned");
                }
            })
    }

    /// Removes the ban only if it has expired by `now`.
    ///
    /// Safe to race with [`unban_actor`](Self::unban_actor) and with a
    /// replacement ban: the expiry is re-checked under the slot lock.
    pub fn unban_if_expired(&self, actor: ActorId, now: Timestamp) -> Result<bool> {
        self.clear_ban(actor, |record| record.is_expired(now).then_some(true))
            .map(|cleared| cleared.is_some())
    }

    /// Clears the slot when `decide` returns `Some`; passes its value through.
    fn clear_ban<F>(&self, actor: ActorId, decide: F) -> Result<Option<bool>>
    where
        F: FnOnce(&BanRecord) -> Option<bool>,
    {
        let Some(slot) = self.bans.get(actor) else {
            return Ok(None);
        };
        let mut slot = lock(&slot);
        let Some(record) = slot.as_ref() else {
            return Ok(None);
        };
        let Some(outcome) = decide(record) else {
            return Ok(None);
        };

        commit(
            self.db.as_ref(),
            &[BatchOp::delete(CF_BANS, id_key(actor).to_vec())],
        )?;
        if let Some(at) = record.expires_at {
            lock(&self.expiry_index).remove(&(at, actor));
        }
        *slot = None;
        Ok(Some(outcome))
    }

    /// The actor's ban if it is in force at `now`.
    ///
    /// An expired record found here is cleared immediately, so a delayed
    /// sweep never leaves an actor banned past expiry.
    pub fn ban_status(&self, actor: ActorId, now: Timestamp) -> Option<BanRecord> {
        let slot = self.bans.get(actor)?;
        let record = lock(&slot).clone()?;
        if !record.is_expired(now) {
            return Some(record);
        }

        debug!(actor, "Ban expired on read, clearing");
        if let Err(e) = self.unban_if_expired(actor, now) {
            error!(actor, "Failed to clear expired ban: {}", e);
        }
        None
    }

    /// Up to `limit` actors whose bans have expired by `now`, oldest first.
    pub fn expired_candidates(&self, now: Timestamp, limit: usize) -> Vec<ActorId> {
        lock(&self.expiry_index)
            .iter()
            .take_while(|(at, _)| *at <= now)
            .take(limit)
            .map(|(_, actor)| *actor)
            .collect()
    }

    /// Number of actors banned at `now`.
    pub fn banned_count(&self, now: Timestamp) -> u64 {
        self.bans
            .handles()
            .into_iter()
            .filter(|(_, slot)| matches!(lock(slot).as_ref(), Some(r) if !r.is_expired(now)))
            .count() as u64
    }
}

impl BanOracle for ModerationEngine {
    fn is_currently_banned(&self, actor: ActorId, now: Timestamp) -> bool {
        self.ban_status(actor, now).is_some()
    }
}
