use std::sync::Arc;

use anyhow::Context;
use poem::{
    listener::{Listener, TcpListener},
    EndpointExt,
};
use poem_openapi::OpenApiService;
use tracing::{info, warn};

use svcguard::accounts::{AccountService, InMemoryAccountStore};
use svcguard::api::{AccountsApi, HealthApi, MetricsApi};
use svcguard::client::{DownstreamClient, HttpCaller, ResilientClient};
use svcguard::config::{Config, Settings};
use svcguard::discovery::{resolve_address, DiscoveryAnnouncer};
use svcguard::lifecycle::run_announced;
use svcguard::logging;
use svcguard::messaging::{HttpPublisher, LogPublisher, Publisher, VipNotifier};
use svcguard::observability::RequestTracingMiddleware;
use svcguard::resilience::{CircuitBreakerRegistry, RetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    let settings = Settings::from_env();
    logging::init(config.json_logs);

    let registry = Arc::new(CircuitBreakerRegistry::new());
    registry.configure_from_settings(&config.circuits, &settings);
    info!(circuits = ?config.circuits, "Circuits configured");

    let caller = HttpCaller::new(RetryConfig::default()).context("failed to build HTTP client")?;
    let client = Arc::new(ResilientClient::new(registry.clone(), caller));
    let downstream = Arc::new(DownstreamClient::new(
        client,
        config.quotes_url.clone(),
        config.images_url.clone(),
    ));

    let publisher: Arc<dyn Publisher> = match &config.broker_url {
        Some(url) => Arc::new(HttpPublisher::new(url.clone()).context("failed to build broker client")?),
        None => {
            warn!("BROKER_URL not set, publishing to the log only");
            Arc::new(LogPublisher)
        }
    };

    let address = config
        .advertised_address
        .clone()
        .unwrap_or_else(resolve_address);

    let vip = Arc::new(VipNotifier::spawn(publisher.clone()));
    let accounts = Arc::new(AccountService::new(
        Arc::new(InMemoryAccountStore::seeded(100)),
        downstream,
        vip.clone(),
        address.clone(),
    ));

    let api_service = OpenApiService::new(
        (
            HealthApi::new(registry.clone(), config.service_name.clone(), address.clone()),
            MetricsApi::new(registry),
            AccountsApi::new(accounts),
        ),
        config.service_name.clone(),
        env!("CARGO_PKG_VERSION"),
    )
    .server(format!("http://localhost:{}", config.port));

    let ui = api_service.swagger_ui();
    let spec = api_service.spec_endpoint();

    let app = poem::Route::new()
        .nest("/", api_service)
        .nest("/docs", ui)
        .nest("/spec", spec)
        .with(RequestTracingMiddleware);

    let addr = format!("0.0.0.0:{}", config.port);
    // bound before the first UP token goes out
    let acceptor = TcpListener::bind(addr.clone())
        .into_acceptor()
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, %address, service = %config.service_name, "Starting server");

    let announcer = DiscoveryAnnouncer::new(publisher, address.clone())
        .with_interval(config.discovery_interval);
    let server = poem::Server::new_with_acceptor(acceptor)
        .run_with_graceful_shutdown(app, shutdown_signal(), None);

    run_announced(announcer, &vip, server)
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
