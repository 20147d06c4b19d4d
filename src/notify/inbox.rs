//! Recipient-side notification lifecycle: created -> read -> deleted

use bson::DateTime;
use std::sync::Arc;
use tracing::debug;

use super::NotificationView;
use crate::db::store::{NotificationStore, Page};
use crate::types::{EngineError, Result};

/// Notification inbox of every actor
#[derive(Clone)]
pub struct Inbox {
    notifications: Arc<dyn NotificationStore>,
}

impl Inbox {
    pub fn new(notifications: Arc<dyn NotificationStore>) -> Self {
        Self { notifications }
    }

    /// Newest first
    pub async fn list(&self, recipient_id: &str, unread_only: bool, page: Page) -> Result<Vec<NotificationView>> {
        let records = self
            .notifications
            .list_notifications(recipient_id, unread_only, page)
            .await?;
        Ok(records.iter().map(NotificationView::from).collect())
    }

    pub async fn unread_count(&self, recipient_id: &str) -> Result<u64> {
        self.notifications.count_unread(recipient_id).await
    }

    /// Mark one of the recipient's notifications read. Idempotent.
    pub async fn mark_read(&self, notification_id: &str, recipient_id: &str) -> Result<()> {
        if !self
            .notifications
            .mark_read(notification_id, recipient_id, DateTime::now())
            .await?
        {
            return Err(not_found(notification_id));
        }
        Ok(())
    }

    /// Returns how many notifications changed
    pub async fn mark_all_read(&self, recipient_id: &str) -> Result<u64> {
        let changed = self
            .notifications
            .mark_all_read(recipient_id, DateTime::now())
            .await?;
        debug!(recipient_id = recipient_id, changed = changed, "Marked all notifications read");
        Ok(changed)
    }

    pub async fn delete(&self, notification_id: &str, recipient_id: &str) -> Result<()> {
        if !self
            .notifications
            .delete_notification(notification_id, recipient_id)
            .await?
        {
            return Err(not_found(notification_id));
        }
        Ok(())
    }
}

/// Someone else's record is reported exactly like a missing one
fn not_found(notification_id: &str) -> EngineError {
    EngineError::NotFound(format!("notification {notification_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{ActorDoc, NotificationType};
    use crate::db::store::ActorStore;
    use crate::db::MemoryStore;
    use crate::notify::{NotificationEvent, Notifier};
    use crate::realtime::LocalBroadcaster;
    use crate::tasks::TaskQueue;

    async fn seeded() -> (Arc<MemoryStore>, Inbox, Vec<String>) {
        let store = Arc::new(MemoryStore::new());
        for id in ["alice", "bob", "carol"] {
            store.insert_actor(ActorDoc::new(id, id)).await.unwrap();
        }
        let notifier = Notifier::new(
            store.clone(),
            store.clone(),
            Arc::new(LocalBroadcaster::new()),
            TaskQueue::new(),
        );

        let mut ids = Vec::new();
        for sender in ["bob", "carol", "bob"] {
            let event = NotificationEvent::new(NotificationType::Mention, "alice", sender);
            ids.push(notifier.notify(event).await.unwrap().unwrap().id);
        }
        (store.clone(), Inbox::new(store), ids)
    }

    #[tokio::test]
    async fn test_list_and_unread_count() {
        let (_store, inbox, _ids) = seeded().await;

        assert_eq!(inbox.list("alice", false, Page::default()).await.unwrap().len(), 3);
        assert_eq!(inbox.list("alice", false, Page::new(2, 2)).await.unwrap().len(), 1);
        assert_eq!(inbox.unread_count("alice").await.unwrap(), 3);
        assert!(inbox.list("bob", false, Page::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let (_store, inbox, ids) = seeded().await;

        inbox.mark_read(&ids[0], "alice").await.unwrap();
        inbox.mark_read(&ids[0], "alice").await.unwrap();

        assert_eq!(inbox.unread_count("alice").await.unwrap(), 2);
        assert_eq!(inbox.list("alice", true, Page::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_other_recipients_records_are_not_found() {
        let (_store, inbox, ids) = seeded().await;

        assert!(matches!(inbox.mark_read(&ids[0], "bob").await, Err(EngineError::NotFound(_))));
        assert!(matches!(inbox.delete(&ids[0], "bob").await, Err(EngineError::NotFound(_))));
        assert_eq!(inbox.unread_count("alice").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_mark_all_read_then_delete() {
        let (store, inbox, ids) = seeded().await;

        assert_eq!(inbox.mark_all_read("alice").await.unwrap(), 3);
        assert_eq!(inbox.mark_all_read("alice").await.unwrap(), 0);

        tokio_test::assert_ok!(inbox.delete(&ids[1], "alice").await);
        assert_eq!(store.all_notifications().len(), 2);
        assert!(matches!(inbox.delete(&ids[1], "alice").await, Err(EngineError::NotFound(_))));
    }
}
