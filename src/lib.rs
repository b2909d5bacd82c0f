pub mod accounts;
pub mod api;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod observability;
pub mod resilience;
