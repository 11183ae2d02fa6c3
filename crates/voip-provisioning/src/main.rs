//! VoIP Provisioning Service - Entry point.

use ami_client::AmiClient;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voip_provisioning::{
    api::{create_router_with_throttle, AppState, RegistrationThrottle},
    config::{Config, LogConfig},
    pjsip::PjsipConfigWriter,
    AccountRegistry, Provisioner, ReloadCoordinator, Store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.log);

    info!("Starting VoIP Provisioning Service");

    // Initialize storage
    let store = if config.registry.persist {
        Store::file(config.registry.path.clone())
    } else {
        info!("Persistence disabled, using in-memory storage");
        Store::memory()
    };
    let registry = AccountRegistry::load(store).await;

    let writer = PjsipConfigWriter::new(
        &config.telephony.config_path,
        &config.telephony.account_template,
    )
    .context("Invalid telephony configuration")?;
    info!(path = ?writer.path(), template = writer.template(), "PJSIP config writer ready");

    // Initialize AMI client
    let ami = AmiClient::new(
        &config.ami.host,
        config.ami.port,
        &config.ami.username,
        &config.ami.secret,
        config.ami.timeout,
    );
    if ami.health_check().await {
        info!(addr = ami.addr(), "Manager interface reachable");
    } else {
        warn!(addr = ami.addr(), "Manager interface unreachable - reloads will be retried per request");
    }

    let reloader = ReloadCoordinator::new(
        Arc::new(ami),
        &config.telephony.reload_module,
        config.reload.retry_policy(),
    )
    .with_health_ttl(config.ami.health_ttl);

    let provisioner = Provisioner::new(
        registry,
        Arc::new(writer),
        Arc::new(reloader),
        &config.telephony.server_address,
    );

    // Create application state
    let state = AppState::new(provisioner);

    // Create router with the registration quota
    let throttle = RegistrationThrottle::new(config.rate_limit.quota());
    let app = create_router_with_throttle(state, throttle);

    // Bind to address
    let addr = SocketAddr::new(
        config
            .server
            .listen_addr
            .parse()
            .context("Invalid listen address")?,
        config.server.port,
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

fn init_logging(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
