use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::client::caller::CallRequest;
use crate::client::resilient_client::{fallback_on_error, ResilientClient};
use crate::observability::TraceContext;

pub const QUOTES_CIRCUIT: &str = "quotes-service";
pub const IMAGES_CIRCUIT: &str = "account-to-image";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Quote {
    #[serde(rename = "quote", default)]
    pub text: String,
    #[serde(rename = "ipAddress", default)]
    pub served_by: String,
    #[serde(default)]
    pub language: String,
}

impl Quote {
    /// Stand-in served whenever the quotes service cannot answer
    pub fn fallback() -> Self {
        Self {
            text: "Text Breaker".to_string(),
            served_by: "circuit-breaker".to_string(),
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccountImage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "servedBy", default)]
    pub served_by: String,
}

impl AccountImage {
    pub fn fallback() -> Self {
        Self {
            id: String::new(),
            url: "http://path.to.placeholder".to_string(),
            served_by: "fallback".to_string(),
        }
    }
}

/// Typed access to the quotes and image services. Always answers, degrading to fallbacks.
pub struct DownstreamClient {
    client: Arc<ResilientClient>,
    quotes_url: String,
    images_url: String,
}

impl DownstreamClient {
    /// `images_url` is a prefix the account id is appended to
    pub fn new(
        client: Arc<ResilientClient>,
        quotes_url: impl Into<String>,
        images_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            quotes_url: quotes_url.into(),
            images_url: images_url.into(),
        }
    }

    pub async fn get_quote(&self, ctx: &TraceContext) -> Quote {
        let request = CallRequest::get(&self.quotes_url).with_context(ctx);
        let result = self.client.perform_request(QUOTES_CIRCUIT, request).await;

        // decode failures share the fallback path
        fallback_on_error(QUOTES_CIRCUIT, result.map(Some), || None)
            .and_then(|body| decode(QUOTES_CIRCUIT, &body))
            .unwrap_or_else(Quote::fallback)
    }

    pub async fn get_account_image(&self, ctx: &TraceContext, account_id: &str) -> AccountImage {
        let url = format!("{}{}", self.images_url, account_id);
        let request = CallRequest::get(url).with_context(ctx);
        let result = self.client.perform_request(IMAGES_CIRCUIT, request).await;

        fallback_on_error(IMAGES_CIRCUIT, result.map(Some), || None)
            .and_then(|body| decode(IMAGES_CIRCUIT, &body))
            .unwrap_or_else(AccountImage::fallback)
    }
}

fn decode<T: serde::de::DeserializeOwned>(circuit: &str, body: &[u8]) -> Option<T> {
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(e) => {
            error!(circuit = %circuit, error = %e, "Could not decode downstream body");
            None
        }
    }
}
