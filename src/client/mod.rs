pub mod caller;
pub mod downstream;
pub mod error;
pub mod resilient_client;

pub use caller::{CallRequest, HttpCaller};
pub use downstream::{AccountImage, DownstreamClient, Quote, IMAGES_CIRCUIT, QUOTES_CIRCUIT};
pub use error::AttemptError;
pub use resilient_client::{fallback_on_error, ResilientClient};
