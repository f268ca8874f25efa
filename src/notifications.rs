//! Notification inboxes and live stream sessions.
//!
//! Every notification is persisted before it is pushed anywhere. Pushing to
//! live sessions is best effort: a full or closed session channel is logged
//! and skipped, never reported back to the mutation that triggered the
//! notification. Clients reconcile by pulling the inbox, so the broker keeps
//! no replay buffer.
//!
//! The unread count is always computed from the inbox itself.
//!
//! ## Storage Layout
//!
//! - `notifications`: `{notification_id}` -> [`Notification`]
//! - `meta`: `next_notification_id` -> `u64`
//!
//! The next id is recovered as the larger of the highest stored id and the
//! `meta` high-water mark. Only removals raise the mark, in the same batch
//! as the removal, so a deleted id is never handed out again.

use crate::constants::{
    DEFAULT_TITLE, MAX_NOTIFICATION_CONTENT_LEN, TITLE_MAX_CHARS, TITLE_SENTENCE_CUTOFF,
};
use crate::error::{MurmurError, Result};
use crate::storage::{
    commit, id_key, BatchOp, RocksDbHandle, CF_META, CF_NOTIFICATIONS, META_NEXT_NOTIFICATION_ID,
};
use crate::sync::{lock, read_lock, write_lock, RowMap};
use crate::types::{
    format_timestamp, ActorId, ContentId, NotificationId, NotificationKind, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

// =============================================================================
// Notification Rows
// =============================================================================

/// What a notification refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Actor whose action caused the notification, if any.
    pub creator_id: Option<ActorId>,
    /// Creator display name, captured when the notification is created.
    pub creator_name: String,
    pub post_id: Option<ContentId>,
    pub comment_id: Option<ContentId>,
    pub content: String,
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: ActorId,
    pub kind: NotificationKind,
    pub payload: NotificationPayload,
    pub created_at: Timestamp,
    pub read: bool,
}

impl Notification {
    /// Client-facing shape.
    pub fn view(&self) -> NotificationView {
        NotificationView {
            id: self.id,
            creator_name: self.payload.creator_name.clone(),
            title: notification_title(&self.payload.content),
            creation_date: format_timestamp(self.created_at),
            content: self.payload.content.clone(),
            read: self.read,
        }
    }
}

/// JSON shape sent to clients on both the pull and stream paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: NotificationId,
    pub creator_name: String,
    pub title: String,
    pub creation_date: String,
    pub content: String,
    pub read: bool,
}

/// Short title derived from the content.
///
/// Content over 50 characters is cut with an ellipsis; a period within the
/// first 30 characters ends the title early.
pub fn notification_title(content: &str) -> String {
    if content.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    if let Some(pos) = title.chars().position(|c| c == '.') {
        if pos > 0 && pos < TITLE_SENTENCE_CUTOFF {
            title = title.chars().take(pos).collect();
        }
    }
    title
}

#[derive(Debug, Default)]
struct Inbox {
    items: BTreeMap<NotificationId, Notification>,
}

// =============================================================================
// Stream Sessions
// =============================================================================

/// An event pushed to a live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// First event of every stream; a liveness marker only.
    Connected,
    Notification(NotificationView),
}

impl StreamEvent {
    /// Event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Connected => "connected",
            StreamEvent::Notification(_) => "notification",
        }
    }

    /// Event data on the wire.
    pub fn data(&self) -> Result<String> {
        match self {
            StreamEvent::Connected => Ok("connected".to_string()),
            StreamEvent::Notification(view) => serde_json::to_string(view).map_err(|e| {
                MurmurError::serialization(format!("Failed to encode notification: {}", e))
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct SessionHandle {
    id: u64,
    tx: mpsc::Sender<StreamEvent>,
}

/// Live sessions keyed by actor. An actor may hold several at once.
#[derive(Debug, Default)]
struct SessionRegistry {
    sessions: RwLock<HashMap<ActorId, Vec<SessionHandle>>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    fn register(&self, actor: ActorId, tx: mpsc::Sender<StreamEvent>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        write_lock(&self.sessions)
            .entry(actor)
            .or_default()
            .push(SessionHandle { id, tx });
        id
    }

    fn unregister(&self, actor: ActorId, ids: &[u64]) {
        let mut sessions = write_lock(&self.sessions);
        if let Some(list) = sessions.get_mut(&actor) {
            list.retain(|s| !ids.contains(&s.id));
            if list.is_empty() {
                sessions.remove(&actor);
            }
        }
    }

    fn handles(&self, actor: ActorId) -> Vec<SessionHandle> {
        read_lock(&self.sessions)
            .get(&actor)
            .cloned()
            .unwrap_or_default()
    }

    fn drop_actor(&self, actor: ActorId) -> usize {
        write_lock(&self.sessions)
            .remove(&actor)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}

/// Removes its session from the registry when dropped.
#[derive(Debug)]
struct SessionGuard {
    registry: Arc<SessionRegistry>,
    actor: ActorId,
    session_id: u64,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.actor, &[self.session_id]);
        info!(actor = self.actor, session = self.session_id, "Stream session closed");
    }
}

/// Receiving end of one live session.
#[derive(Debug)]
pub struct NotificationStream {
    rx: mpsc::Receiver<StreamEvent>,
    guard: SessionGuard,
}

impl NotificationStream {
    /// Waits for the next event. `None` once the session has been closed
    /// by the broker (for example after the actor was deleted).
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Session identifier, unique per broker.
    pub fn session_id(&self) -> u64 {
        self.guard.session_id
    }

    /// Actor this session belongs to.
    pub fn actor(&self) -> ActorId {
        self.guard.actor
    }
}

// =============================================================================
// Broker
// =============================================================================

/// Notification storage and live fan-out.
pub struct NotificationBroker {
    db: Option<RocksDbHandle>,
    inboxes: RowMap<ActorId, Inbox>,
    /// Notification id -> recipient. Locked after an inbox, never before.
    owners: RwLock<HashMap<NotificationId, ActorId>>,
    next_id: AtomicU64,
    /// Last high-water mark written to `meta`. Held while a removal commits.
    persisted_next: Mutex<u64>,
    registry: Arc<SessionRegistry>,
    channel_capacity: usize,
    page_size: usize,
}

impl NotificationBroker {
    /// Creates an empty, memory-only broker.
    pub fn in_memory(channel_capacity: usize, page_size: usize) -> Self {
        Self {
            db: None,
            inboxes: RowMap::new(),
            owners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            persisted_next: Mutex::new(1),
            registry: Arc::new(SessionRegistry::default()),
            channel_capacity: channel_capacity.max(1),
            page_size: page_size.max(1),
        }
    }

    /// Opens the broker, loading every stored notification.
    pub fn open(db: RocksDbHandle, channel_capacity: usize, page_size: usize) -> Result<Self> {
        let stored = db.collect_all::<Notification>(CF_NOTIFICATIONS)?;
        let stored_next: u64 = db.get(CF_META, META_NEXT_NOTIFICATION_ID)?.unwrap_or(1);
        let next = stored
            .iter()
            .map(|n| n.id + 1)
            .max()
            .unwrap_or(1)
            .max(stored_next);

        let mut inboxes: HashMap<ActorId, Inbox> = HashMap::new();
        let mut owners = HashMap::new();
        let count = stored.len();
        for n in stored {
            owners.insert(n.id, n.recipient);
            inboxes.entry(n.recipient).or_default().items.insert(n.id, n);
        }

        info!(
            notifications = count,
            recipients = inboxes.len(),
            next_notification_id = next,
            "Loaded notifications"
        );

        Ok(Self {
            db: Some(db),
            inboxes: RowMap::from_rows(inboxes),
            owners: RwLock::new(owners),
            next_id: AtomicU64::new(next),
            persisted_next: Mutex::new(stored_next),
            registry: Arc::new(SessionRegistry::default()),
            channel_capacity: channel_capacity.max(1),
            page_size: page_size.max(1),
        })
    }

    /// Stores a notification and pushes it to every live session of the
    /// recipient. Never waits for stream delivery.
    pub fn enqueue(
        &self,
        recipient: ActorId,
        kind: NotificationKind,
        payload: NotificationPayload,
        now: Timestamp,
    ) -> Result<Notification> {
        if payload.content.chars().count() > MAX_NOTIFICATION_CONTENT_LEN {
            return Err(MurmurError::validation(format!(
                "content exceeds {} characters",
                MAX_NOTIFICATION_CONTENT_LEN
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let notification = Notification {
            id,
            recipient,
            kind,
            payload,
            created_at: now,
            read: false,
        };

        {
            let inbox = self.inboxes.get_or_insert_with(recipient, Inbox::default);
            let mut inbox = lock(&inbox);
            commit(
                self.db.as_ref(),
                &[BatchOp::put(CF_NOTIFICATIONS, id_key(id).to_vec(), &notification)?],
            )?;
            inbox.items.insert(id, notification.clone());
            write_lock(&self.owners).insert(id, recipient);
        }

        debug!(notification = id, recipient, kind = %kind, "Notification stored");
        self.push(&notification);
        Ok(notification)
    }

    /// Fans a notification out to all live sessions of its recipient.
    fn push(&self, notification: &Notification) {
        let sessions = self.registry.handles(notification.recipient);
        if sessions.is_empty() {
            return;
        }

        let event = StreamEvent::Notification(notification.view());
        let mut closed = Vec::new();
        for session in &sessions {
            match session.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let err = MurmurError::transient_delivery(format!(
                        "session {} buffer full, notification {} left for pull",
                        session.id, notification.id
                    ));
                    warn!(recipient = notification.recipient, "{}", err);
                }
                Err(TrySendError::Closed(_)) => {
                    let err = MurmurError::transient_delivery(format!(
                        "session {} closed",
                        session.id
                    ));
                    warn!(recipient = notification.recipient, "{}", err);
                    closed.push(session.id);
                }
            }
        }

        if !closed.is_empty() {
            self.registry.unregister(notification.recipient, &closed);
        }
    }

    /// Opens a live session for `actor`. The first event is always
    /// [`StreamEvent::Connected`].
    pub fn connect(&self, actor: ActorId) -> NotificationStream {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        // Fresh channel with capacity >= 1, cannot fail.
        let _ = tx.try_send(StreamEvent::Connected);
        let session_id = self.registry.register(actor, tx);

        info!(actor, session = session_id, "Stream session opened");

        NotificationStream {
            rx,
            guard: SessionGuard {
                registry: Arc::clone(&self.registry),
                actor,
                session_id,
            },
        }
    }

    /// Number of live sessions for `actor`.
    pub fn session_count(&self, actor: ActorId) -> usize {
        self.registry.handles(actor).len()
    }

    /// Newest notifications of `actor`, at most one page.
    pub fn load(&self, actor: ActorId) -> Vec<Notification> {
        self.inboxes
            .get(actor)
            .map(|inbox| {
                lock(&inbox)
                    .items
                    .values()
                    .rev()
                    .take(self.page_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of unread notifications, counted from the inbox.
    pub fn unread_count(&self, actor: ActorId) -> u64 {
        self.inboxes
            .get(actor)
            .map(|inbox| lock(&inbox).items.values().filter(|n| !n.read).count() as u64)
            .unwrap_or(0)
    }

    /// Resolves a notification id to its inbox, checking ownership.
    fn owned_inbox(&self, actor: ActorId, id: NotificationId) -> Result<Arc<Mutex<Inbox>>> {
        let owner = read_lock(&self.owners)
            .get(&id)
            .copied()
            .ok_or_else(|| MurmurError::not_found(format!("Notification {}", id)))?;
        if owner != actor {
            return Err(MurmurError::forbidden(format!(
                "notification {} belongs to another actor",
                id
            )));
        }
        self.inboxes
            .get(actor)
            .ok_or_else(|| MurmurError::not_found(format!("Notification {}", id)))
    }

    /// Commits removals together with a high-water mark covering every id
    /// handed out so far. The mark only ever grows.
    fn commit_removal(&self, mut ops: Vec<BatchOp>) -> Result<()> {
        let mut persisted = lock(&self.persisted_next);
        let high_water = (*persisted).max(self.next_id.load(Ordering::SeqCst));
        if high_water > *persisted {
            ops.push(BatchOp::put(
                CF_META,
                META_NEXT_NOTIFICATION_ID.to_vec(),
                &high_water,
            )?);
        }
        commit(self.db.as_ref(), &ops)?;
        *persisted = high_water;
        Ok(())
    }

    /// Marks one notification read. Already-read notifications are left as is.
    pub fn mark_read(&self, actor: ActorId, id: NotificationId) -> Result<Notification> {
        let inbox = self.owned_inbox(actor, id)?;
        let mut inbox = lock(&inbox);
        let current = inbox
            .items
            .get(&id)
            .ok_or_else(|| MurmurError::not_found(format!("Notification {}", id)))?;
        if current.read {
            return Ok(current.clone());
        }

        let updated = Notification {
            read: true,
            ..current.clone()
        };
        commit(
            self.db.as_ref(),
            &[BatchOp::put(CF_NOTIFICATIONS, id_key(id).to_vec(), &updated)?],
        )?;
        inbox.items.insert(id, updated.clone());
        Ok(updated)
    }

    /// Marks every notification of `actor` read. Returns how many changed.
    pub fn mark_all_read(&self, actor: ActorId) -> Result<usize> {
        let Some(inbox) = self.inboxes.get(actor) else {
            return Ok(0);
        };
        let mut inbox = lock(&inbox);

        let updated: Vec<Notification> = inbox
            .items
            .values()
            .filter(|n| !n.read)
            .map(|n| Notification {
                read: true,
                ..n.clone()
            })
            .collect();
        if updated.is_empty() {
            return Ok(0);
        }

        let ops = updated
            .iter()
            .map(|n| BatchOp::put(CF_NOTIFICATIONS, id_key(n.id).to_vec(), n))
            .collect::<Result<Vec<_>>>()?;
        commit(self.db.as_ref(), &ops)?;

        let changed = updated.len();
        for n in updated {
            inbox.items.insert(n.id, n);
        }
        debug!(actor, changed, "Marked all notifications read");
        Ok(changed)
    }

    /// Deletes one notification. Its id is never reused.
    pub fn delete(&self, actor: ActorId, id: NotificationId) -> Result<()> {
        let inbox = self.owned_inbox(actor, id)?;
        let mut inbox = lock(&inbox);
        self.commit_removal(vec![BatchOp::delete(CF_NOTIFICATIONS, id_key(id).to_vec())])?;
        inbox.items.remove(&id);
        write_lock(&self.owners).remove(&id);
        Ok(())
    }

    /// Deletes every notification of `actor`. Returns how many were removed.
    pub fn clear(&self, actor: ActorId) -> Result<usize> {
        let Some(inbox) = self.inboxes.get(actor) else {
            return Ok(0);
        };
        let mut inbox = lock(&inbox);
        if inbox.items.is_empty() {
            return Ok(0);
        }

        let ops: Vec<BatchOp> = inbox
            .items
            .keys()
            .map(|id| BatchOp::delete(CF_NOTIFICATIONS, id_key(*id).to_vec()))
            .collect();
        self.commit_removal(ops)?;

        let removed = inbox.items.len();
        let mut owners = write_lock(&self.owners);
        for id in inbox.items.keys() {
            owners.remove(id);
        }
        drop(owners);
        inbox.items.clear();

        debug!(actor, removed, "Cleared notifications");
        Ok(removed)
    }

    /// Removes everything the broker holds for a deleted actor: stored
    /// notifications and live sessions. Open streams end.
    pub fn purge_actor(&self, actor: ActorId) -> Result<usize> {
        let removed = self.clear(actor)?;
        self.inboxes.remove(actor);
        let sessions = self.registry.drop_actor(actor);
        info!(actor, removed, sessions, "Purged notifications of actor");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{RocksDbConfig, COLUMN_FAMILIES};
    use tempfile::TempDir;

    fn payload(content: &str) -> NotificationPayload {
        NotificationPayload {
            creator_id: Some(1),
            creator_name: "alice".to_string(),
            content: content.to_string(),
            ..Default::default()
        }
    }

    fn broker() -> NotificationBroker {
        NotificationBroker::in_memory(4, 50)
    }

    #[test]
    fn test_title_rules() {
        assert_eq!(notification_title(""), "Notification");
        assert_eq!(notification_title("alice liked your post"), "alice liked your post");
        assert_eq!(notification_title("Hello there. More text"), "Hello there");
        assert_eq!(notification_title(".starts with period"), ".starts with period");

        let long = "a".repeat(60);
        assert_eq!(notification_title(&long), format!("{}...", "a".repeat(50)));

        let late_period = format!("{}. tail", "b".repeat(35));
        assert_eq!(notification_title(&late_period), late_period);
    }

    #[test]
    fn test_unread_count_tracks_inbox() {
        let broker = broker();
        broker
            .enqueue(2, NotificationKind::Follow, payload("a"), 1)
            .unwrap();
        let second = broker
            .enqueue(2, NotificationKind::Like, payload("b"), 2)
            .unwrap();
        assert_eq!(broker.unread_count(2), 2);

        broker.mark_read(2, second.id).unwrap();
        broker.mark_read(2, second.id).unwrap();
        assert_eq!(broker.unread_count(2), 1);

        assert_eq!(broker.mark_all_read(2).unwrap(), 1);
        assert_eq!(broker.unread_count(2), 0);
        assert_eq!(broker.mark_all_read(2).unwrap(), 0);

        broker
            .enqueue(2, NotificationKind::System, payload("c"), 3)
            .unwrap();
        assert_eq!(broker.unread_count(2), 1);
    }

    #[test]
    fn test_load_is_newest_first_and_paged() {
        let broker = NotificationBroker::in_memory(4, 3);
        for i in 0..5 {
            broker
                .enqueue(2, NotificationKind::Like, payload(&format!("n{}", i)), i)
                .unwrap();
        }
        let loaded = broker.load(2);
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].payload.content, "n4");
        assert_eq!(loaded[2].payload.content, "n2");
    }

    #[test]
    fn test_ownership_checks() {
        let broker = broker();
        let n = broker
            .enqueue(2, NotificationKind::Like, payload("x"), 0)
            .unwrap();

        assert!(matches!(broker.mark_read(3, n.id), Err(MurmurError::Forbidden(_))));
        assert!(matches!(broker.delete(3, n.id), Err(MurmurError::Forbidden(_))));
        assert!(matches!(broker.mark_read(2, 999), Err(MurmurError::NotFound(_))));
    }

    #[test]
    fn test_deleted_ids_are_not_reused() {
        let broker = broker();
        let n = broker
            .enqueue(2, NotificationKind::Like, payload("x"), 0)
            .unwrap();
        broker.delete(2, n.id).unwrap();
        assert!(matches!(broker.mark_read(2, n.id), Err(MurmurError::NotFound(_))));

        let next = broker
            .enqueue(2, NotificationKind::Like, payload("y"), 1)
            .unwrap();
        assert!(next.id > n.id);
        assert_eq!(broker.clear(2).unwrap(), 1);
        assert!(broker.load(2).is_empty());
    }

    #[test]
    fn test_content_limit() {
        let broker = broker();
        let long = "x".repeat(MAX_NOTIFICATION_CONTENT_LEN + 1);
        assert!(matches!(
            broker.enqueue(2, NotificationKind::System, payload(&long), 0),
            Err(MurmurError::Validation(_))
        ));
        assert_eq!(broker.unread_count(2), 0);
    }

    #[tokio::test]
    async fn test_stream_receives_connected_then_notifications() {
        let broker = broker();
        let mut first = broker.connect(2);
        let mut second = broker.connect(2);
        assert_eq!(broker.session_count(2), 2);

        let n = broker
            .enqueue(2, NotificationKind::Follow, payload("alice followed you"), 0)
            .unwrap();

        for stream in [&mut first, &mut second] {
            assert_eq!(stream.recv().await, Some(StreamEvent::Connected));
            match stream.recv().await {
                Some(StreamEvent::Notification(view)) => {
                    assert_eq!(view.id, n.id);
                    assert_eq!(view.creator_name, "alice");
                    assert!(!view.read);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }

        drop(first);
        assert_eq!(broker.session_count(2), 1);
    }

    #[tokio::test]
    async fn test_full_session_does_not_block_enqueue() {
        let broker = NotificationBroker::in_memory(1, 50);
        let _stream = broker.connect(2);

        // Connected already fills the buffer; every push is dropped.
        for i in 0..3 {
            broker
                .enqueue(2, NotificationKind::Like, payload("x"), i)
                .unwrap();
        }
        assert_eq!(broker.unread_count(2), 3);
        assert_eq!(broker.session_count(2), 1);
    }

    #[tokio::test]
    async fn test_purge_ends_streams() {
        let broker = broker();
        let mut stream = broker.connect(2);
        broker
            .enqueue(2, NotificationKind::Like, payload("x"), 0)
            .unwrap();

        assert_eq!(broker.purge_actor(2).unwrap(), 1);
        assert!(broker.inboxes.get(2).is_none());
        assert_eq!(stream.recv().await, Some(StreamEvent::Connected));
        assert!(matches!(stream.recv().await, Some(StreamEvent::Notification(_))));
        assert_eq!(stream.recv().await, None);
    }

    #[test]
    fn test_stream_event_wire_format() {
        let view = NotificationView {
            id: 7,
            creator_name: "alice".into(),
            title: "t".into(),
            creation_date: "2024-01-01T00:00:00Z".into(),
            content: "c".into(),
            read: false,
        };
        let event = StreamEvent::Notification(view);
        assert_eq!(event.name(), "notification");
        let json: serde_json::Value = serde_json::from_str(&event.data().unwrap()).unwrap();
        assert_eq!(json["creatorName"], "alice");
        assert_eq!(json["creationDate"], "2024-01-01T00:00:00Z");
        assert_eq!(StreamEvent::Connected.name(), "connected");
    }

    #[test]
    fn test_reload_from_disk() {
        let temp = TempDir::new().unwrap();
        let db =
            RocksDbHandle::open(temp.path(), &RocksDbConfig::default(), COLUMN_FAMILIES).unwrap();

        let deleted = {
            let broker = NotificationBroker::open(db.clone(), 4, 50).unwrap();
            let a = broker
                .enqueue(2, NotificationKind::Like, payload("a"), 0)
                .unwrap();
            let b = broker
                .enqueue(2, NotificationKind::Like, payload("b"), 1)
                .unwrap();
            broker.mark_read(2, a.id).unwrap();
            broker.delete(2, b.id).unwrap();
            b.id
        };

        let broker = NotificationBroker::open(db, 4, 50).unwrap();
        assert_eq!(broker.load(2).len(), 1);
        assert_eq!(broker.unread_count(2), 0);
        let next = broker
            .enqueue(2, NotificationKind::Like, payload("c"), 2)
            .unwrap();
        assert!(next.id > deleted);
    }

    #[test]
    fn test_high_water_mark_never_moves_back() {
        let temp = TempDir::new().unwrap();
        let db =
            RocksDbHandle::open(temp.path(), &RocksDbConfig::default(), COLUMN_FAMILIES).unwrap();

        let newest = {
            let broker = NotificationBroker::open(db.clone(), 4, 50).unwrap();
            let older = broker
                .enqueue(2, NotificationKind::Like, payload("a"), 0)
                .unwrap();
            let newest = broker
                .enqueue(3, NotificationKind::Like, payload("b"), 1)
                .unwrap();
            broker.delete(3, newest.id).unwrap();
            // Removing an older id afterwards must not lower the mark.
            broker.delete(2, older.id).unwrap();
            newest.id
        };

        let stored: Option<u64> = db.get(CF_META, META_NEXT_NOTIFICATION_ID).unwrap();
        assert_eq!(stored, Some(newest + 1));

        let broker = NotificationBroker::open(db, 4, 50).unwrap();
        let next = broker
            .enqueue(3, NotificationKind::Like, payload("c"), 2)
            .unwrap();
        assert!(next.id > newest);
    }
}
