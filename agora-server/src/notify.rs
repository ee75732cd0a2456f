use agora_common::{Notification, NotificationKind, NotificationUuid, UserId};
use chrono::Utc;
use sled::{Db, Tree};
use uuid::Uuid;

use crate::store::put;
use crate::{AppError, Result};

/// Side channel for telling a user something happened. Callers treat failures
/// as non-fatal.
pub trait Notifier: Send + Sync {
    fn notify(&self, recipient: &UserId, actor: &UserId, kind: NotificationKind) -> anyhow::Result<()>;
}

/// Per-recipient inbox. Keys sort by recipient, then by a monotonic sequence.
#[derive(Clone)]
pub struct Notifications {
    db: Db,
    tree: Tree,
}

impl Notifications {
    pub fn new(db: &Db) -> Result<Self> {
        Ok(Self {
            db: db.clone(),
            tree: db.open_tree("notifications")?,
        })
    }

    /// Newest first.
    pub fn inbox(&self, user: &UserId) -> Result<Vec<Notification>> {
        let mut inbox = self
            .tree
            .scan_prefix(inbox_prefix(user))
            .values()
            .map(|value| Ok(serde_json::from_slice(&value?)?))
            .collect::<Result<Vec<Notification>>>()?;
        inbox.reverse();
        Ok(inbox)
    }

    pub fn mark_read(&self, user: &UserId, uuid: &NotificationUuid) -> Result<Notification> {
        for entry in self.tree.scan_prefix(inbox_prefix(user)) {
            let (key, value) = entry?;
            let mut notification: Notification = serde_json::from_slice(&value)?;
            if &notification.uuid == uuid {
                notification.read = true;
                put(&self.tree, key, &notification)?;
                return Ok(notification);
            }
        }
        Err(AppError::NotFound(format!("notification {}", uuid.0)))
    }
}

impl Notifier for Notifications {
    fn notify(&self, recipient: &UserId, actor: &UserId, kind: NotificationKind) -> anyhow::Result<()> {
        let notification = Notification {
            uuid: NotificationUuid(Uuid::new_v4().to_string()),
            recipient: recipient.clone(),
            actor: actor.clone(),
            kind,
            read: false,
            created_at: Utc::now(),
        };
        let key = format!(
            "{}{:020}:{}",
            inbox_prefix(recipient),
            self.db.generate_id()?,
            notification.uuid.0
        );
        self.tree.insert(key, serde_json::to_vec(&notification)?)?;
        Ok(())
    }
}

fn inbox_prefix(user: &UserId) -> String {
    format!("{user}/")
}
