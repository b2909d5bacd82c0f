use poem::Request;
use poem_openapi::{param::Path, payload::Json, ApiResponse, Object, OpenApi};
use std::sync::Arc;

use crate::accounts::{Account, AccountEvent, AccountService};
use crate::client::{AccountImage, Quote};
use crate::error::AppError;
use crate::observability::trace_context;

pub struct AccountsApi {
    service: Arc<AccountService>,
}

impl AccountsApi {
    pub fn new(service: Arc<AccountService>) -> Self {
        Self { service }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Object)]
pub struct QuoteBody {
    #[oai(rename = "quote")]
    #[serde(rename = "quote")]
    pub text: String,
    #[oai(rename = "ipAddress")]
    #[serde(rename = "ipAddress")]
    pub served_by: String,
    pub language: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Object)]
#[oai(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub struct ImageBody {
    pub id: String,
    pub url: String,
    pub served_by: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Object)]
#[oai(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub struct AccountEventBody {
    pub id: String,
    pub event_name: String,
    pub created: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Object)]
#[oai(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub struct AccountBody {
    pub id: String,
    pub name: String,
    pub served_by: String,
    pub quote: QuoteBody,
    pub image_data: ImageBody,
    pub account_events: Vec<AccountEventBody>,
}

impl From<Quote> for QuoteBody {
    fn from(q: Quote) -> Self {
        Self {
            text: q.text,
            served_by: q.served_by,
            language: q.language,
        }
    }
}

impl From<AccountImage> for ImageBody {
    fn from(i: AccountImage) -> Self {
        Self {
            id: i.id,
            url: i.url,
            served_by: i.served_by,
        }
    }
}

impl From<AccountEvent> for AccountEventBody {
    fn from(e: AccountEvent) -> Self {
        Self {
            id: e.id,
            event_name: e.event_name,
            created: e.created,
        }
    }
}

impl From<Account> for AccountBody {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            name: a.name,
            served_by: a.served_by,
            quote: a.quote.into(),
            image_data: a.image_data.into(),
            account_events: a.account_events.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(ApiResponse)]
pub enum GetAccountResponse {
    #[oai(status = 200)]
    Ok(Json<AccountBody>),

    #[oai(status = 404)]
    NotFound,
}

#[OpenApi]
impl AccountsApi {
    #[oai(path = "/accounts/:account_id", method = "get")]
    async fn get_account(
        &self,
        req: &Request,
        account_id: Path<String>,
    ) -> Result<GetAccountResponse, poem::Error> {
        let ctx = trace_context(req);
        match self.service.fetch_account(&ctx, &account_id.0).await {
            Ok(account) => Ok(GetAccountResponse::Ok(Json(account.into()))),
            Err(AppError::NotFound(_)) => Ok(GetAccountResponse::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::InMemoryAccountStore;
    use crate::client::{DownstreamClient, HttpCaller, ResilientClient};
    use crate::messaging::{LogPublisher, VipNotifier};
    use crate::resilience::{CircuitBreakerRegistry, RetryConfig};
    use std::time::Duration;

    fn api() -> AccountsApi {
        let registry = Arc::new(CircuitBreakerRegistry::new());
        let caller = HttpCaller::new(RetryConfig::new(1, Duration::ZERO)).unwrap();
        let client = Arc::new(ResilientClient::new(registry, caller));
        let downstream = Arc::new(DownstreamClient::new(
            client,
            "http://127.0.0.1:1/api/quote",
            "http://127.0.0.1:1/accounts/",
        ));
        let service = AccountService::new(
            Arc::new(InMemoryAccountStore::seeded(5)),
            downstream,
            Arc::new(VipNotifier::spawn(Arc::new(LogPublisher))),
            "10.0.0.3",
        );
        AccountsApi::new(Arc::new(service))
    }

    #[tokio::test]
    async fn test_get_account_serves_fallbacks() {
        let req = Request::builder().finish();
        let resp = api()
            .get_account(&req, Path("10002".to_string()))
            .await
            .unwrap();

        match resp {
            GetAccountResponse::Ok(Json(body)) => {
                assert_eq!(body.name, "Person_2");
                assert_eq!(body.quote.text, "Text Breaker");
                assert_eq!(body.image_data.served_by, "fallback");
                let json = serde_json::to_value(&body).unwrap();
                assert_eq!(json["quote"]["ipAddress"], "circuit-breaker");
                assert_eq!(json["imageData"]["url"], "http://path.to.placeholder");
            }
            _ => panic!("Expected Ok response"),
        }
    }

    #[tokio::test]
    async fn test_get_unknown_account() {
        let req = Request::builder().finish();
        let resp = api()
            .get_account(&req, Path("1".to_string()))
            .await
            .unwrap();
        assert!(matches!(resp, GetAccountResponse::NotFound));
    }
}
