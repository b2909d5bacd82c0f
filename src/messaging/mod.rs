//! Publish side of the message broker. The broker itself lives outside this crate;
//! everything here talks to it through the [`Publisher`] capability.

pub mod vip;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::info;

pub use vip::{VipNotification, VipNotifier, DEFAULT_VIP_QUEUE_CAPACITY, VIP_QUEUE};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Broker transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Broker rejected message with status {0}")]
    Rejected(u16),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Fire-and-forget publish onto a named topic. Implementations must be safe for concurrent use.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// Serialize `message` as JSON and publish it
pub async fn publish_json<T: Serialize + ?Sized>(
    publisher: &dyn Publisher,
    topic: &str,
    message: &T,
) -> Result<(), PublishError> {
    let payload = serde_json::to_vec(message)?;
    publisher.publish(topic, &payload).await
}

/// Publishes through the broker's HTTP bridge: `POST {base_url}/topics/{topic}`
pub struct HttpPublisher {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPublisher {
    pub fn new(base_url: impl Into<String>) -> Result<Self, PublishError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let url = format!("{}/topics/{}", self.base_url, topic);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Used when no broker is configured: messages only reach the log
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        info!(topic, payload = %String::from_utf8_lossy(payload), "Publishing message");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Keeps every message in memory; lets callers wait for a given number of publishes
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
    published: Notify,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().clone()
    }

    pub fn on_topic(&self, topic: &str) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Resolve once at least `count` messages were published
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.published.notified();
            if self.messages.lock().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.messages.lock().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        self.published.notify_waiters();
        Ok(())
    }
}
