pub mod service;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::client::{AccountImage, Quote};

pub use service::AccountService;
pub use store::{AccountStore, InMemoryAccountStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AccountEvent {
    pub id: String,
    #[serde(rename = "eventName")]
    pub event_name: String,
    pub created: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(rename = "servedBy", default)]
    pub served_by: String,
    #[serde(default)]
    pub quote: Quote,
    #[serde(rename = "imageData", default)]
    pub image_data: AccountImage,
    #[serde(rename = "accountEvents", default)]
    pub account_events: Vec<AccountEvent>,
}

impl Account {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}
