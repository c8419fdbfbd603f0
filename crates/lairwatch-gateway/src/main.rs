//! Gateway entry point.
//!
//! Starts one watch relay per resource collection, the cooldown sweeper
//! and the HTTP server, then runs until `Ctrl-C`.
//!
//! ```text
//! control plane --watch--> relays --> Hub --> /api/v1/events subscribers
//! POST .../attacks --> RateGate --> KubeClient::create
//! ```

use std::sync::Arc;

use lairwatch_gateway::{AppState, GatewayConfig, RateGate, build_router, start_server};
use lairwatch_kube::{KubeClient, KubeConfig};
use lairwatch_relay::ratelimit::spawn_sweeper;
use lairwatch_relay::watch::spawn_default_relays;
use lairwatch_relay::shutdown::channel as shutdown_channel;
use lairwatch_relay::{Hub, RateLimiter};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the control-plane client
/// cannot be built, or the server fails to bind.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("lairwatch-gateway starting");

    let config = GatewayConfig::from_env()?;
    info!(
        host = config.server.host,
        port = config.server.port,
        attack_cooldown_ms = config.relay.rate_limit.cooldown.as_millis(),
        queue_capacity = config.relay.subscriber_queue_capacity,
        "configuration loaded"
    );

    let kube = KubeClient::new(&KubeConfig::from_env()?)?;
    let (trigger, shutdown) = shutdown_channel();

    let hub = Arc::new(Hub::new());
    let source = Arc::new(kube.clone());
    let mut tasks = spawn_default_relays(&source, &hub, config.relay.backoff, &shutdown);

    let limiter = Arc::new(RateLimiter::with_config(&config.relay.rate_limit));
    tasks.push(spawn_sweeper(
        Arc::clone(&limiter),
        config.relay.rate_limit.sweep_period,
        shutdown.clone(),
    ));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c received, shutting down");
                trigger.trigger();
            }
            Err(e) => warn!("failed to install ctrl-c handler: {e}"),
        }
    });

    let state = AppState::new(
        Arc::clone(&hub),
        kube,
        RateGate::per_target(limiter),
        config.relay.subscriber_queue_capacity,
        shutdown.clone(),
    );
    let served = start_server(&config.server, build_router(state), shutdown).await;

    for task in tasks {
        if let Err(e) = task.await {
            error!("background task failed: {e}");
        }
    }

    served?;
    info!("lairwatch-gateway stopped");
    Ok(())
}
