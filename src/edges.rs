//! Follow and like edges with denormalized counters.
//!
//! An edge is identified by `(kind, target, source)`. Its existence is the
//! truth: toggling creates an absent edge or deletes a present one. Every
//! target row keeps a counter that always equals its number of edges; edge
//! and counter are written in the same batch, under the target row's lock,
//! so concurrent toggles on one target serialize while toggles on different
//! targets run in parallel.
//!
//! ## Storage Layout
//!
//! - `edges`: `{kind}{target}:{source}` -> [`EdgeRecord`]
//! - `counters`: `{kind}{target}` -> `u64`

use crate::error::{MurmurError, Result};
use crate::storage::{commit, id_key, BatchOp, RocksDbHandle, CF_COUNTERS, CF_EDGES};
use crate::sync::{lock, read_lock, write_lock, RowMap};
use crate::types::{ActorId, EdgeKind, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, info, trace, warn};

/// Answers whether an actor may currently mutate.
pub trait BanOracle {
    /// Returns true if the actor is banned right now (expiry re-checked).
    fn is_currently_banned(&self, actor: ActorId, now: Timestamp) -> bool;
}

/// Persisted edge row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub kind: EdgeKind,
    pub source: ActorId,
    pub target: u64,
    pub created_at: Timestamp,
}

/// Edge state after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeState {
    pub active: bool,
    pub new_count: u64,
}

/// Emitted when an edge is created; removals are silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub kind: EdgeKind,
    pub source: ActorId,
    pub target: u64,
}

/// Result of a toggle or set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeChange {
    pub state: EdgeState,
    pub event: Option<EdgeEvent>,
}

type TargetKey = (EdgeKind, u64);

/// All edges of one kind pointing at one target.
#[derive(Debug, Default)]
struct TargetRow {
    sources: HashMap<ActorId, Timestamp>,
}

impl TargetRow {
    fn count(&self) -> u64 {
        self.sources.len() as u64
    }
}

fn counter_key(kind: EdgeKind, target: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(kind.tag());
    key.extend_from_slice(&id_key(target));
    key
}

fn edge_key(kind: EdgeKind, target: u64, source: ActorId) -> Vec<u8> {
    let mut key = counter_key(kind, target);
    key.push(b':');
    key.extend_from_slice(&id_key(source));
    key
}

/// Persistent idempotent edge storage.
pub struct EdgeStore {
    db: Option<RocksDbHandle>,
    rows: RowMap<TargetKey, TargetRow>,
    /// Outgoing edges per source. Locked after a row, never before.
    by_source: RwLock<HashMap<ActorId, HashSet<TargetKey>>>,
}

impl EdgeStore {
    /// Creates an empty, memory-only store.
    pub fn in_memory() -> Self {
        Self {
            db: None,
            rows: RowMap::new(),
            by_source: RwLock::new(HashMap::new()),
        }
    }

    /// Opens the store, rebuilding rows and indexes from disk.
    ///
    /// Counters are recomputed from the edge set; a stored counter that
    /// disagrees is logged and rewritten.
    pub fn open(db: RocksDbHandle) -> Result<Self> {
        let records = db.collect_all::<EdgeRecord>(CF_EDGES)?;

        let mut rows: HashMap<TargetKey, TargetRow> = HashMap::new();
        let mut by_source: HashMap<ActorId, HashSet<TargetKey>> = HashMap::new();
        for record in &records {
            rows.entry((record.kind, record.target))
                .or_default()
                .sources
                .insert(record.source, record.created_at);
            by_source
                .entry(record.source)
                .or_default()
                .insert((record.kind, record.target));
        }

        let mut repairs = Vec::new();
        for ((kind, target), row) in &rows {
            let stored: Option<u64> = db.get(CF_COUNTERS, &counter_key(*kind, *target))?;
            if stored != Some(row.count()) {
                warn!(
                    kind = %kind,
                    target,
                    stored = ?stored,
                    actual = row.count(),
                    "Edge counter disagrees with edge set, repairing"
                );
                repairs.push(BatchOp::put(
                    CF_COUNTERS,
                    counter_key(*kind, *target),
                    &row.count(),
                )?);
            }
        }
        db.write_batch(&repairs)?;

        info!(edges = records.len(), targets = rows.len(), "Loaded edge store");

        Ok(Self {
            db: Some(db),
            rows: RowMap::from_rows(rows),
            by_source: RwLock::new(by_source),
        })
    }

    /// Flips the edge: creates it if absent, deletes it if present.
    pub fn toggle(
        &self,
        source: ActorId,
        target: u64,
        kind: EdgeKind,
        bans: &dyn BanOracle,
        now: Timestamp,
    ) -> Result<EdgeChange> {
        self.mutate(source, target, kind, bans, now, |active| !active)
    }

    /// Ensures the edge is present (`desired = true`) or absent.
    ///
    /// Repeating the same call is a no-op returning the current state.
    pub fn set_active(
        &self,
        source: ActorId,
        target: u64,
        kind: EdgeKind,
        desired: bool,
        bans: &dyn BanOracle,
        now: Timestamp,
    ) -> Result<EdgeChange> {
        self.mutate(source, target, kind, bans, now, |_| desired)
    }

    fn mutate(
        &self,
        source: ActorId,
        target: u64,
        kind: EdgeKind,
        bans: &dyn BanOracle,
        now: Timestamp,
        decide: impl FnOnce(bool) -> bool,
    ) -> Result<EdgeChange> {
        if kind == EdgeKind::Follow && source == target {
            return Err(MurmurError::self_reference("actors cannot follow themselves"));
        }

        let row = self
            .rows
            .get_or_insert_with((kind, target), TargetRow::default);
        let mut row = lock(&row);

        if bans.is_currently_banned(source, now) {
            return Err(MurmurError::actor_banned(format!(
                "actor {} is banned",
                source
            )));
        }

        let active = row.sources.contains_key(&source);
        let desired = decide(active);
        if desired == active {
            trace!(kind = %kind, source, target, active, "Edge already in requested state");
            return Ok(EdgeChange {
                state: EdgeState {
                    active,
                    new_count: row.count(),
                },
                event: None,
            });
        }

        let new_count = if desired {
            row.count() + 1
        } else {
            row.count() - 1
        };
        let edge_op = if desired {
            let record = EdgeRecord {
                kind,
                source,
                target,
                created_at: now,
            };
            BatchOp::put(CF_EDGES, edge_key(kind, target, source), &record)?
        } else {
            BatchOp::delete(CF_EDGES, edge_key(kind, target, source))
        };
        let counter_op = BatchOp::put(CF_COUNTERS, counter_key(kind, target), &new_count)?;
        commit(self.db.as_ref(), &[edge_op, counter_op])?;

        let mut index = write_lock(&self.by_source);
        if desired {
            row.sources.insert(source, now);
            index.entry(source).or_default().insert((kind, target));
        } else {
            row.sources.remove(&source);
            if let Some(outgoing) = index.get_mut(&source) {
                outgoing.remove(&(kind, target));
                if outgoing.is_empty() {
                    index.remove(&source);
                }
            }
        }
        drop(index);

        debug!(kind = %kind, source, target, active = desired, new_count, "Edge updated");

        Ok(EdgeChange {
            state: EdgeState {
                active: desired,
                new_count,
            },
            event: desired.then_some(EdgeEvent {
                kind,
                source,
                target,
            }),
        })
    }

    /// Returns true if the edge exists.
    pub fn is_active(&self, source: ActorId, target: u64, kind: EdgeKind) -> bool {
        self.rows
            .get((kind, target))
            .map(|row| lock(&row).sources.contains_key(&source))
            .unwrap_or(false)
    }

    /// Number of edges of `kind` pointing at `target`.
    pub fn count(&self, kind: EdgeKind, target: u64) -> u64 {
        self.rows
            .get((kind, target))
            .map(|row| lock(&row).count())
            .unwrap_or(0)
    }

    /// Number of actors following `actor`.
    pub fn follower_count(&self, actor: ActorId) -> u64 {
        self.count(EdgeKind::Follow, actor)
    }

    /// Number of actors `actor` follows.
    pub fn following_count(&self, actor: ActorId) -> u64 {
        read_lock(&self.by_source)
            .get(&actor)
            .map(|outgoing| {
                outgoing
                    .iter()
                    .filter(|(kind, _)| *kind == EdgeKind::Follow)
                    .count() as u64
            })
            .unwrap_or(0)
    }

    /// Drops every edge pointing at `target`; its counter becomes zero.
    ///
    /// Returns the number of edges removed.
    pub fn remove_target(&self, kind: EdgeKind, target: u64) -> Result<usize> {
        let Some(row) = self.rows.get((kind, target)) else {
            return Ok(0);
        };
        let mut row = lock(&row);
        if row.sources.is_empty() {
            return Ok(0);
        }

        let mut ops: Vec<BatchOp> = row
            .sources
            .keys()
            .map(|source| BatchOp::delete(CF_EDGES, edge_key(kind, target, *source)))
            .collect();
        ops.push(BatchOp::put(CF_COUNTERS, counter_key(kind, target), &0u64)?);
        commit(self.db.as_ref(), &ops)?;

        let removed = row.sources.len();
        let mut index = write_lock(&self.by_source);
        for source in row.sources.drain().map(|(s, _)| s) {
            if let Some(outgoing) = index.get_mut(&source) {
                outgoing.remove(&(kind, target));
                if outgoing.is_empty() {
                    index.remove(&source);
                }
            }
        }
        drop(index);

        info!(kind = %kind, target, removed, "Removed all edges on target");
        Ok(removed)
    }

    /// Removes every edge created by `actor` and every follow edge pointing
    /// at them, adjusting the affected counters.
    ///
    /// Each target row is updated in its own batch.
    pub fn remove_actor(&self, actor: ActorId) -> Result<usize> {
        let outgoing: Vec<TargetKey> = read_lock(&self.by_source)
            .get(&actor)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        let mut removed = 0;
        for (kind, target) in outgoing {
            let Some(row) = self.rows.get((kind, target)) else {
                continue;
            };
            let mut row = lock(&row);
            if !row.sources.contains_key(&actor) {
                continue;
            }
            let new_count = row.count() - 1;
            commit(
                self.db.as_ref(),
                &[
                    BatchOp::delete(CF_EDGES, edge_key(kind, target, actor)),
                    BatchOp::put(CF_COUNTERS, counter_key(kind, target), &new_count)?,
                ],
            )?;
            row.sources.remove(&actor);
            removed += 1;

            let mut index = write_lock(&self.by_source);
            if let Some(set) = index.get_mut(&actor) {
                set.remove(&(kind, target));
                if set.is_empty() {
                    index.remove(&actor);
                }
            }
        }

        removed += self.remove_target(EdgeKind::Follow, actor)?;

        debug!(actor, removed, "Removed edges of actor");
        Ok(removed)
    }
}
