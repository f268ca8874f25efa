//! Actor and content registry.
//!
//! Accounts, posts and comments are created by services outside this crate.
//! They register the identifiers the core needs to reason about (roles,
//! content owners) here, and the directory answers existence and ownership
//! questions for the other components.
//!
//! Deleted actors are tombstoned rather than forgotten: a deleted id can
//! never be re-registered or authenticated again.

use crate::constants::{MAX_EXCERPT_LEN, MAX_USERNAME_LEN};
use crate::error::{MurmurError, Result};
use crate::storage::{
    commit, id_key, prefixed_key, BatchOp, RocksDbHandle, CF_ACTORS, CF_CONTENT,
};
use crate::sync::{read_lock, write_lock};
use crate::types::{ActorId, ContentId, ContentKind, Role, TargetKind, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info};

/// A registered actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub id: ActorId,
    pub username: String,
    pub role: Role,
    pub created_at: Timestamp,
    /// Tombstone flag. Deleted actors stay in the map forever.
    pub deleted: bool,
}

/// A registered post or comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    pub kind: ContentKind,
    pub id: ContentId,
    pub owner: ActorId,
    pub excerpt: String,
    pub created_at: Timestamp,
    pub deleted: bool,
}

fn content_key(kind: ContentKind, id: ContentId) -> Vec<u8> {
    let tag: &[u8] = match kind {
        ContentKind::Post => b"P",
        ContentKind::Comment => b"C",
    };
    prefixed_key(tag, b':', &id_key(id))
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Registry of actors and content references.
pub struct ActorDirectory {
    db: Option<RocksDbHandle>,
    actors: RwLock<HashMap<ActorId, ActorRecord>>,
    content: RwLock<HashMap<(ContentKind, ContentId), ContentRef>>,
}

impl ActorDirectory {
    /// Creates an empty, memory-only directory.
    pub fn in_memory() -> Self {
        Self {
            db: None,
            actors: RwLock::new(HashMap::new()),
            content: RwLock::new(HashMap::new()),
        }
    }

    /// Opens the directory, loading every actor and content row from disk.
    pub fn open(db: RocksDbHandle) -> Result<Self> {
        let actors: HashMap<_, _> = db
            .collect_all::<ActorRecord>(CF_ACTORS)?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();
        let content: HashMap<_, _> = db
            .collect_all::<ContentRef>(CF_CONTENT)?
            .into_iter()
            .map(|c| ((c.kind, c.id), c))
            .collect();

        info!(
            actors = actors.len(),
            content = content.len(),
            "Loaded actor directory"
        );

        Ok(Self {
            db: Some(db),
            actors: RwLock::new(actors),
            content: RwLock::new(content),
        })
    }

    // =========================================================================
    // Actors
    // =========================================================================

    /// Registers an actor or updates its username and role.
    pub fn upsert_actor(
        &self,
        id: ActorId,
        username: &str,
        role: Role,
        now: Timestamp,
    ) -> Result<ActorRecord> {
        let username = username.trim();
        if username.is_empty() {
            return Err(MurmurError::validation("username must not be empty"));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(MurmurError::validation(format!(
                "username exceeds {} characters",
                MAX_USERNAME_LEN
            )));
        }

        let mut actors = write_lock(&self.actors);
        let record = match actors.get(&id) {
            Some(existing) if existing.deleted => {
                return Err(MurmurError::validation(format!(
                    "actor {} was deleted and cannot be registered again",
                    id
                )));
            }
            Some(existing) => ActorRecord {
                username: username.to_string(),
                role,
                ..existing.clone()
            },
            None => ActorRecord {
                id,
                username: username.to_string(),
                role,
                created_at: now,
                deleted: false,
            },
        };

        commit(
            self.db.as_ref(),
            &[BatchOp::put(CF_ACTORS, id_key(id).to_vec(), &record)?],
        )?;
        actors.insert(id, record.clone());

        debug!(actor = id, role = %role, "Registered actor");
        Ok(record)
    }

    /// Returns a live actor.
    pub fn get_actor(&self, id: ActorId) -> Option<ActorRecord> {
        read_lock(&self.actors)
            .get(&id)
            .filter(|a| !a.deleted)
            .cloned()
    }

    /// Returns a live actor or `NotFound`.
    pub fn require_actor(&self, id: ActorId) -> Result<ActorRecord> {
        self.get_actor(id)
            .ok_or_else(|| MurmurError::not_found(format!("Actor {}", id)))
    }

    /// Tombstones an actor. Role checks are the caller's job.
    ///
    /// `extra` is committed in the same batch as the tombstone.
    pub fn delete_actor(&self, id: ActorId, extra: Vec<BatchOp>) -> Result<ActorRecord> {
        let mut actors = write_lock(&self.actors);
        let record = match actors.get(&id) {
            Some(a) if !a.deleted => ActorRecord {
                deleted: true,
                ..a.clone()
            },
            _ => return Err(MurmurError::not_found(format!("Actor {}", id))),
        };

        let mut ops = extra;
        ops.push(BatchOp::put(CF_ACTORS, id_key(id).to_vec(), &record)?);
        commit(self.db.as_ref(), &ops)?;
        actors.insert(id, record.clone());

        info!(actor = id, "Deleted actor");
        Ok(record)
    }

    /// All live actors, ordered by id.
    pub fn live_actors(&self) -> Vec<ActorRecord> {
        let mut actors: Vec<ActorRecord> = read_lock(&self.actors)
            .values()
            .filter(|a| !a.deleted)
            .cloned()
            .collect();
        actors.sort_by_key(|a| a.id);
        actors
    }

    // =========================================================================
    // Content
    // =========================================================================

    /// Registers a post or comment. The owner must be a live actor.
    pub fn upsert_content(
        &self,
        kind: ContentKind,
        id: ContentId,
        owner: ActorId,
        excerpt: &str,
        now: Timestamp,
    ) -> Result<ContentRef> {
        self.require_actor(owner)?;

        let mut content = write_lock(&self.content);
        let record = match content.get(&(kind, id)) {
            Some(existing) if existing.deleted => {
                return Err(MurmurError::validation(format!(
                    "{} {} was deleted and cannot be registered again",
                    kind, id
                )));
            }
            Some(existing) => ContentRef {
                owner,
                excerpt: truncate_chars(excerpt, MAX_EXCERPT_LEN),
                ..existing.clone()
            },
            None => ContentRef {
                kind,
                id,
                owner,
                excerpt: truncate_chars(excerpt, MAX_EXCERPT_LEN),
                created_at: now,
                deleted: false,
            },
        };

        commit(
            self.db.as_ref(),
            &[BatchOp::put(CF_CONTENT, content_key(kind, id), &record)?],
        )?;
        content.insert((kind, id), record.clone());

        debug!(kind = %kind, id, owner, "Registered content");
        Ok(record)
    }

    /// Returns live content.
    pub fn get_content(&self, kind: ContentKind, id: ContentId) -> Option<ContentRef> {
        read_lock(&self.content)
            .get(&(kind, id))
            .filter(|c| !c.deleted)
            .cloned()
    }

    /// Owner of live content, or `NotFound`.
    pub fn content_owner(&self, kind: ContentKind, id: ContentId) -> Result<ActorId> {
        self.get_content(kind, id)
            .map(|c| c.owner)
            .ok_or_else(|| MurmurError::not_found(format!("{} {}", kind, id)))
    }

    /// Live posts and comments owned by `owner`.
    pub fn content_owned_by(&self, owner: ActorId) -> Vec<ContentRef> {
        read_lock(&self.content)
            .values()
            .filter(|c| c.owner == owner && !c.deleted)
            .cloned()
            .collect()
    }

    /// Tombstones a post or comment, committing `extra` in the same batch.
    pub fn delete_content(
        &self,
        kind: ContentKind,
        id: ContentId,
        extra: Vec<BatchOp>,
    ) -> Result<ContentRef> {
        let mut content = write_lock(&self.content);
        let record = match content.get(&(kind, id)) {
            Some(c) if !c.deleted => ContentRef {
                deleted: true,
                ..c.clone()
            },
            _ => return Err(MurmurError::not_found(format!("{} {}", kind, id))),
        };

        let mut ops = extra;
        ops.push(BatchOp::put(CF_CONTENT, content_key(kind, id), &record)?);
        commit(self.db.as_ref(), &ops)?;
        content.insert((kind, id), record.clone());

        info!(kind = %kind, id, "Deleted content");
        Ok(record)
    }

    /// Owner of a report target: the actor itself for users.
    pub fn target_owner(&self, kind: TargetKind, id: u64) -> Result<ActorId> {
        match kind.content_kind() {
            Some(content_kind) => self.content_owner(content_kind, id),
            None => self.require_actor(id).map(|a| a.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::COLUMN_FAMILIES;
    use tempfile::TempDir;

    #[test]
    fn test_upsert_and_get_actor() {
        let dir = ActorDirectory::in_memory();
        dir.upsert_actor(1, "alice", Role::User, 10).unwrap();
        let updated = dir.upsert_actor(1, "alice2", Role::Admin, 20).unwrap();

        assert_eq!(updated.created_at, 10);
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(dir.get_actor(1).unwrap().username, "alice2");
    }

    #[test]
    fn test_username_validation() {
        let dir = ActorDirectory::in_memory();
        assert!(matches!(
            dir.upsert_actor(1, "   ", Role::User, 0),
            Err(MurmurError::Validation(_))
        ));
        let long = "x".repeat(MAX_USERNAME_LEN + 1);
        assert!(dir.upsert_actor(1, &long, Role::User, 0).is_err());
    }

    #[test]
    fn test_deleted_actor_is_tombstoned() {
        let dir = ActorDirectory::in_memory();
        dir.upsert_actor(1, "alice", Role::User, 0).unwrap();
        dir.delete_actor(1, Vec::new()).unwrap();

        assert!(dir.get_actor(1).is_none());
        assert!(dir.live_actors().is_empty());
        assert!(dir.upsert_actor(1, "alice", Role::User, 0).is_err());
        assert!(matches!(
            dir.delete_actor(1, Vec::new()),
            Err(MurmurError::NotFound(_))
        ));
    }

    #[test]
    fn test_content_requires_live_owner() {
        let dir = ActorDirectory::in_memory();
        assert!(matches!(
            dir.upsert_content(ContentKind::Post, 7, 1, "hello", 0),
            Err(MurmurError::NotFound(_))
        ));

        dir.upsert_actor(1, "alice", Role::User, 0).unwrap();
        dir.upsert_content(ContentKind::Post, 7, 1, "hello", 0)
            .unwrap();
        assert_eq!(dir.content_owner(ContentKind::Post, 7).unwrap(), 1);
        assert!(dir.content_owner(ContentKind::Comment, 7).is_err());
        assert_eq!(dir.target_owner(TargetKind::Post, 7).unwrap(), 1);
        assert!(dir.target_owner(TargetKind::Comment, 7).is_err());
    }

    #[test]
    fn test_content_owned_by_skips_deleted() {
        let dir = ActorDirectory::in_memory();
        dir.upsert_actor(1, "alice", Role::User, 0).unwrap();
        dir.upsert_actor(2, "bob", Role::User, 0).unwrap();
        dir.upsert_content(ContentKind::Post, 7, 1, "a", 0).unwrap();
        dir.upsert_content(ContentKind::Comment, 7, 1, "b", 0).unwrap();
        dir.upsert_content(ContentKind::Post, 8, 2, "c", 0).unwrap();
        dir.delete_content(ContentKind::Post, 7, Vec::new()).unwrap();

        let owned = dir.content_owned_by(1);
        assert_eq!(owned.len(), 1);
        assert_eq!((owned[0].kind, owned[0].id), (ContentKind::Comment, 7));
    }

    #[test]
    fn test_live_actors_are_ordered() {
        let dir = ActorDirectory::in_memory();
        for id in [5, 1, 3] {
            dir.upsert_actor(id, &format!("user{}", id), Role::User, 0).unwrap();
        }
        let ids: Vec<_> = dir.live_actors().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }

    #[test]
    fn test_excerpt_is_truncated() {
        let dir = ActorDirectory::in_memory();
        dir.upsert_actor(1, "alice", Role::User, 0).unwrap();
        let text = "é".repeat(MAX_EXCERPT_LEN + 10);
        let c = dir
            .upsert_content(ContentKind::Comment, 3, 1, &text, 0)
            .unwrap();
        assert_eq!(c.excerpt.chars().count(), MAX_EXCERPT_LEN);
    }

    #[test]
    fn test_reload_from_disk() {
        let temp = TempDir::new().unwrap();
        let db = RocksDbHandle::open(
            temp.path(),
            &crate::storage::RocksDbConfig::default(),
            COLUMN_FAMILIES,
        )
        .unwrap();

        {
            let dir = ActorDirectory::open(db.clone()).unwrap();
            dir.upsert_actor(1, "alice", Role::User, 0).unwrap();
            dir.upsert_actor(2, "bob", Role::User, 0).unwrap();
            dir.upsert_content(ContentKind::Post, 9, 2, "post", 0)
                .unwrap();
            dir.delete_actor(1, Vec::new()).unwrap();
        }

        let dir = ActorDirectory::open(db).unwrap();
        assert!(dir.get_actor(1).is_none());
        assert!(dir.upsert_actor(1, "alice", Role::User, 0).is_err());
        assert_eq!(dir.content_owner(ContentKind::Post, 9).unwrap(), 2);
    }
}
