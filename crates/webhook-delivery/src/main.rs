/*!
 * Webhook Delivery Service
 *
 * Polls Postgres for due deliveries and sends signed webhooks to customer
 * endpoints.
 *
 * ## Architecture
 *
 * ```text
 * Main Process
 *     │
 *     ├──> Dispatcher poll loop
 *          ├──> claim due deliveries (FOR UPDATE SKIP LOCKED)
 *          └──> bounded worker pool (tokio tasks, semaphore)
 *               ├──> Worker: sign → POST → classify → CompleteAttempt
 *               ├──> Worker: sign → POST → classify → CompleteAttempt
 *               ...
 * ```
 *
 * ## Configuration
 *
 * Environment variables (see `config::DeliveryConfig` for the full list):
 * - DATABASE_URL: PostgreSQL connection URL
 * - MAX_CONCURRENCY: Number of concurrent workers (default: 32)
 * - BATCH_SIZE: Rows claimed per poll (default: 100)
 * - POLL_INTERVAL_MS: Idle sleep between polls (default: 1000)
 * - MAX_ATTEMPTS: Attempts before dead-letter (default: 8)
 * - HEALTH_PORT: health/ready/metrics HTTP port (default: 8080)
 */

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use webhook_delivery::config::DeliveryConfig;
use webhook_delivery::dispatcher::Dispatcher;
use webhook_delivery::health::{ServiceState, build_router};
use webhook_delivery::store::Store;
use webhook_delivery::attempter::Attempter;

#[tokio::main]
async fn main() -> Result<()> {
    webhook_delivery_common::init_tracing();

    info!("starting webhook delivery service");

    let config = DeliveryConfig::from_env().context("failed to load configuration")?;

    info!(
        database = %config.database_url.split('@').next_back().unwrap_or("***"),
        max_concurrency = config.max_concurrency,
        batch_size = config.batch_size,
        max_attempts = config.max_attempts,
        "configuration loaded"
    );

    info!("connecting to PostgreSQL...");
    let db_pool = webhook_delivery_common::create_pool(
        &config.database_url,
        config.database_max_connections,
    )
    .await
    .context("failed to create database pool")?;
    info!("PostgreSQL connected");

    let store = Store::new(db_pool);
    let attempter = Attempter::new(config.attempt_timeout).context("failed to build HTTP client")?;
    let dispatcher = Dispatcher::new(store.clone(), attempter, &config);

    // Health server starts before the dispatcher's startup sweep so
    // liveness checks succeed immediately; readiness flips once the sweep
    // and worker pool are up.
    let service_state = ServiceState::new(store.clone());
    let health_router = build_router(service_state.clone());
    let health_addr = format!("0.0.0.0:{}", config.health_port);
    info!(addr = %health_addr, "starting health/ready/metrics server");
    let health_listener = tokio::net::TcpListener::bind(&health_addr)
        .await
        .with_context(|| format!("failed to bind health server to {health_addr}"))?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, health_router).await {
            tracing::error!(error = %e, "health server failed");
        }
    });

    info!("running startup recovery sweep...");
    dispatcher
        .recover()
        .await
        .context("startup recovery sweep failed")?;

    let shutdown = CancellationToken::new();
    let dispatcher_shutdown = shutdown.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatcher_shutdown).await;
    });

    service_state.mark_ready();
    info!(
        "webhook delivery is ready — health: http://0.0.0.0:{}/health, ready: http://0.0.0.0:{}/ready",
        config.health_port, config.health_port
    );
    info!("press Ctrl+C to shut down gracefully");

    signal::ctrl_c().await.context("failed to listen for ctrl_c")?;
    info!("received shutdown signal, stopping dispatcher...");
    shutdown.cancel();

    let _ = dispatcher_handle.await;
    info!("webhook delivery stopped");
    Ok(())
}
