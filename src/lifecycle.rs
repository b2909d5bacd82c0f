use std::fmt::Display;
use std::future::Future;

use tracing::{error, info};

use crate::discovery::DiscoveryAnnouncer;
use crate::messaging::VipNotifier;

/// Announce the instance while `server` runs.
///
/// Once `server` finishes, successfully or not, the announcer publishes its DOWN token and the
/// VIP queue is drained before the server's result is returned.
pub async fn run_announced<F, E>(
    announcer: DiscoveryAnnouncer,
    vip: &VipNotifier,
    server: F,
) -> Result<(), E>
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    let handle = announcer.start();
    let result = server.await;

    match &result {
        Ok(()) => info!("Server stopped, deregistering"),
        Err(e) => error!(error = %e, "Server failed, deregistering"),
    }
    handle.stop().await;
    vip.shutdown().await;
    result
}
