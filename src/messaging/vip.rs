use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{publish_json, Publisher};

pub const VIP_QUEUE: &str = "vipQueue";
pub const DEFAULT_VIP_ACCOUNT: &str = "10000";
/// Notifications waiting for the broker before new ones are dropped
pub const DEFAULT_VIP_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipNotification {
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(rename = "readAt")]
    pub read_at: String,
}

/// Publishes VIP read notifications from a background task so request handling never waits
/// on the broker. `shutdown` drains what was queued and joins the task.
pub struct VipNotifier {
    vip_accounts: HashSet<String>,
    tx: Mutex<Option<mpsc::Sender<VipNotification>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl VipNotifier {
    pub fn spawn(publisher: Arc<dyn Publisher>) -> Self {
        Self::with_accounts(publisher, [DEFAULT_VIP_ACCOUNT])
    }

    pub fn with_accounts<I, S>(publisher: Arc<dyn Publisher>, accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_capacity(publisher, accounts, DEFAULT_VIP_QUEUE_CAPACITY)
    }

    /// Like [`with_accounts`](Self::with_accounts) with at most `capacity` queued notifications
    pub fn with_capacity<I, S>(publisher: Arc<dyn Publisher>, accounts: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, mut rx) = mpsc::channel::<VipNotification>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if let Err(e) = publish_json(publisher.as_ref(), VIP_QUEUE, &notification).await {
                    warn!(account_id = %notification.account_id, error = %e, "Failed to publish VIP notification");
                }
            }
        });

        Self {
            vip_accounts: accounts.into_iter().map(Into::into).collect(),
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn is_vip(&self, account_id: &str) -> bool {
        self.vip_accounts.contains(account_id)
    }

    /// Queue a notification when `account_id` is a VIP. Returns whether one was queued;
    /// nothing is queued after `shutdown` or while the queue is full.
    pub fn notify(&self, account_id: &str) -> bool {
        if !self.is_vip(account_id) {
            return false;
        }
        let notification = VipNotification {
            account_id: account_id.to_string(),
            read_at: chrono::Utc::now().to_rfc3339(),
        };
        debug!(account_id, "Queueing VIP notification");
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        match tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(account_id = %dropped.account_id, "VIP queue full, dropping notification");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Publish everything still queued, then stop the worker. Later calls return immediately.
    pub async fn shutdown(&self) {
        drop(self.tx.lock().take());
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "VIP notifier task ended abnormally");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::RecordingPublisher;

    #[tokio::test]
    async fn test_only_vip_accounts_are_published() {
        let publisher = Arc::new(RecordingPublisher::new());
        let notifier = VipNotifier::spawn(publisher.clone());

        assert!(!notifier.notify("123"));
        assert!(notifier.notify("10000"));
        notifier.shutdown().await;

        let messages = publisher.on_topic(VIP_QUEUE);
        assert_eq!(messages.len(), 1);
        let notification: VipNotification = serde_json::from_slice(&messages[0].payload).unwrap();
        assert_eq!(notification.account_id, "10000");
        assert!(chrono::DateTime::parse_from_rfc3339(&notification.read_at).is_ok());
    }

    /// Holds every publish until released
    struct GatedPublisher {
        gate: tokio::sync::Semaphore,
        inner: RecordingPublisher,
    }

    #[async_trait::async_trait]
    impl Publisher for GatedPublisher {
        async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), crate::messaging::PublishError> {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            self.inner.publish(topic, payload).await
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_notifications() {
        let publisher = Arc::new(GatedPublisher {
            gate: tokio::sync::Semaphore::new(0),
            inner: RecordingPublisher::new(),
        });
        let notifier = VipNotifier::with_capacity(publisher.clone(), ["1"], 2);

        let queued = (0..10).filter(|_| notifier.notify("1")).count();
        // two in the queue, at most one more already taken by the stalled worker
        assert!((2..=3).contains(&queued), "queued {}", queued);

        publisher.gate.add_permits(10);
        notifier.shutdown().await;
        assert_eq!(publisher.inner.on_topic(VIP_QUEUE).len(), queued);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let publisher = Arc::new(RecordingPublisher::new());
        let notifier = VipNotifier::with_accounts(publisher.clone(), ["1", "2"]);

        for _ in 0..5 {
            notifier.notify("1");
            notifier.notify("2");
        }
        notifier.shutdown().await;
        assert_eq!(publisher.messages().len(), 10);

        assert!(!notifier.notify("1"));
        notifier.shutdown().await;
        assert_eq!(publisher.messages().len(), 10);
    }
}
