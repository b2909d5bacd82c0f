use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{DiscoveryToken, DISCOVERY_TOPIC};
use crate::messaging::{publish_json, Publisher};

pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically tells the discovery channel that this instance is UP
pub struct DiscoveryAnnouncer {
    publisher: Arc<dyn Publisher>,
    address: String,
    interval: Duration,
}

impl DiscoveryAnnouncer {
    pub fn new(publisher: Arc<dyn Publisher>, address: impl Into<String>) -> Self {
        Self {
            publisher,
            address: address.into(),
            interval: DEFAULT_ANNOUNCE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Start the background task. The first UP token goes out immediately.
    pub fn start(self) -> AnnouncerHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let publisher = Arc::clone(&self.publisher);
        let address = self.address.clone();
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        announce(publisher.as_ref(), DiscoveryToken::up(address.as_str())).await;
                    }
                }
            }
            debug!("Discovery announcer stopped");
        });

        info!(address = %self.address, interval = ?self.interval, "Discovery announcer started");
        AnnouncerHandle {
            publisher: self.publisher,
            address: self.address,
            stop_tx,
            task,
        }
    }
}

/// Publish failures are logged and dropped
async fn announce(publisher: &dyn Publisher, token: DiscoveryToken) {
    match publish_json(publisher, DISCOVERY_TOPIC, &token).await {
        Ok(()) => debug!(state = ?token.state, address = %token.address, "Published discovery token"),
        Err(e) => warn!(state = ?token.state, error = %e, "Failed to publish discovery token"),
    }
}

/// Running announcer. Dropping it ends the announcements without a DOWN token.
pub struct AnnouncerHandle {
    publisher: Arc<dyn Publisher>,
    address: String,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl AnnouncerHandle {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Stop announcing and publish exactly one DOWN token before returning
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Discovery announcer task ended abnormally");
        }
        announce(self.publisher.as_ref(), DiscoveryToken::down(self.address.as_str())).await;
        info!(address = %self.address, "Deregistered from discovery");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::InstanceState;
    use crate::messaging::{PublishError, RecordingPublisher};
    use async_trait::async_trait;

    fn tokens(publisher: &RecordingPublisher) -> Vec<DiscoveryToken> {
        publisher
            .on_topic(DISCOVERY_TOPIC)
            .iter()
            .map(|m| serde_json::from_slice(&m.payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_first_up_token_is_immediate() {
        let publisher = Arc::new(RecordingPublisher::new());
        let handle = DiscoveryAnnouncer::new(publisher.clone(), "10.0.0.3").start();

        tokio::time::timeout(Duration::from_secs(1), publisher.wait_for(1))
            .await
            .unwrap();
        assert_eq!(tokens(&publisher)[0], DiscoveryToken::up("10.0.0.3"));

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_repeats_every_interval() {
        let publisher = Arc::new(RecordingPublisher::new());
        let handle = DiscoveryAnnouncer::new(publisher.clone(), "10.0.0.3")
            .with_interval(Duration::from_millis(20))
            .start();

        tokio::time::timeout(Duration::from_secs(1), publisher.wait_for(3))
            .await
            .unwrap();
        handle.stop().await;

        let tokens = tokens(&publisher);
        let (last, ups) = tokens.split_last().unwrap();
        assert!(ups.len() >= 3);
        assert!(ups.iter().all(|t| t.state == InstanceState::Up));
        assert_eq!(*last, DiscoveryToken::down("10.0.0.3"));
    }

    #[tokio::test]
    async fn test_stop_publishes_exactly_one_down_token() {
        let publisher = Arc::new(RecordingPublisher::new());
        let handle = DiscoveryAnnouncer::new(publisher.clone(), "10.0.0.3").start();
        publisher.wait_for(1).await;

        handle.stop().await;
        // nothing is published after stop returns
        tokio::time::sleep(Duration::from_millis(50)).await;

        let tokens = tokens(&publisher);
        let downs: Vec<_> = tokens
            .iter()
            .filter(|t| t.state == InstanceState::Down)
            .collect();
        assert_eq!(downs.len(), 1);
        assert_eq!(downs[0].address, "10.0.0.3");
        assert_eq!(tokens.last().unwrap().state, InstanceState::Down);
    }

    struct FailingPublisher;

    #[async_trait]
    impl Publisher for FailingPublisher {
        async fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<(), PublishError> {
            Err(PublishError::Rejected(503))
        }
    }

    #[tokio::test]
    async fn test_publish_failures_do_not_stop_the_announcer() {
        let handle = DiscoveryAnnouncer::new(Arc::new(FailingPublisher), "10.0.0.3")
            .with_interval(Duration::from_millis(10))
            .start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handle.address(), "10.0.0.3");
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .unwrap();
    }
}
