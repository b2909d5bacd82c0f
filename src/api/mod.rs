pub mod accounts;
pub mod health;
pub mod metrics;

pub use accounts::*;
pub use health::*;
pub use metrics::*;
