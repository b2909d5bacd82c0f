use std::sync::Arc;

use tracing::debug;

use super::{Account, AccountStore};
use crate::client::DownstreamClient;
use crate::error::AppError;
use crate::messaging::VipNotifier;
use crate::observability::TraceContext;

/// Read path for accounts: stored record enriched with downstream data
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    downstream: Arc<DownstreamClient>,
    vip: Arc<VipNotifier>,
    served_by: String,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        downstream: Arc<DownstreamClient>,
        vip: Arc<VipNotifier>,
        served_by: impl Into<String>,
    ) -> Self {
        Self {
            store,
            downstream,
            vip,
            served_by: served_by.into(),
        }
    }

    /// Downstream outages only degrade `quote` and `image_data`; they never fail the read
    pub async fn fetch_account(&self, ctx: &TraceContext, account_id: &str) -> Result<Account, AppError> {
        let mut account = self
            .store
            .get(account_id)
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", account_id)))?;

        let (quote, image) = tokio::join!(
            self.downstream.get_quote(ctx),
            self.downstream.get_account_image(ctx, account_id)
        );
        account.quote = quote;
        account.image_data = image;
        account.served_by = self.served_by.clone();

        if self.vip.notify(&account.id) {
            debug!(account_id, "VIP account read");
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::InMemoryAccountStore;
    use crate::client::{AccountImage, HttpCaller, Quote, ResilientClient};
    use crate::messaging::{RecordingPublisher, VIP_QUEUE};
    use crate::resilience::{CircuitBreakerRegistry, RetryConfig};
    use std::time::Duration;
    use wiremock::{matchers::*, Mock, MockServer, ResponseTemplate};

    fn service(base: &str, publisher: Arc<RecordingPublisher>) -> AccountService {
        let registry = Arc::new(CircuitBreakerRegistry::new());
        let caller = HttpCaller::new(RetryConfig::new(2, Duration::from_millis(10))).unwrap();
        let client = Arc::new(ResilientClient::new(registry, caller));
        let downstream = Arc::new(DownstreamClient::new(
            client,
            format!("{}/api/quote", base),
            format!("{}/accounts/", base),
        ));
        AccountService::new(
            Arc::new(InMemoryAccountStore::seeded(10)),
            downstream,
            Arc::new(VipNotifier::spawn(publisher)),
            "10.0.0.3",
        )
    }

    #[tokio::test]
    async fn test_fetch_account_enriches_record() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"quote":"May the source be with you. Always","ipAddress":"10.0.0.5:8080","language":"en"}"#,
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/accounts/10001"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id":"10001","url":"http://imageservice/file/cake.jpg","servedBy":"10.0.0.9"}"#,
            ))
            .mount(&mock_server)
            .await;

        let publisher = Arc::new(RecordingPublisher::new());
        let service = service(&mock_server.uri(), publisher.clone());
        let account = service
            .fetch_account(&TraceContext::new(), "10001")
            .await
            .unwrap();

        assert_eq!(account.name, "Person_1");
        assert_eq!(account.served_by, "10.0.0.3");
        assert_eq!(account.quote.text, "May the source be with you. Always");
        assert_eq!(account.image_data.url, "http://imageservice/file/cake.jpg");

        service.vip.shutdown().await;
        assert!(publisher.on_topic(VIP_QUEUE).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_account_survives_downstream_outage() {
        let publisher = Arc::new(RecordingPublisher::new());
        let service = service("http://127.0.0.1:1", publisher.clone());

        let account = service
            .fetch_account(&TraceContext::new(), "10000")
            .await
            .unwrap();

        assert_eq!(account.quote, Quote::fallback());
        assert_eq!(account.image_data, AccountImage::fallback());

        service.vip.shutdown().await;
        assert_eq!(publisher.on_topic(VIP_QUEUE).len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_unknown_account() {
        let publisher = Arc::new(RecordingPublisher::new());
        let service = service("http://127.0.0.1:1", publisher);

        match service.fetch_account(&TraceContext::new(), "42").await {
            Err(AppError::NotFound(msg)) => assert!(msg.contains("42")),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }
}
