use anyhow::Result;
use dira_core::AppContext;
use dira_core::Config;
use dira_lifecycle::run as run_lifecycle;
use dira_outbox::poller::run as run_outbox;
use dira_subscriptions::run_expiry_sweep;
use std::time::Duration;
use tokio;
use tracing;
use tracing_subscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Dira background runner");

    // Load configuration
    let config = Config::from_env();
    let ctx = AppContext::new(config).await?;

    tracing::info!("Application context initialized");

    // Outbox poller drains queued emails and translations continuously
    let ctx_clone = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = run_outbox(ctx_clone).await {
            tracing::error!("Outbox poller error: {}", e);
        }
    });

    // Daily maintenance: lifecycle passes, then the subscription sweep
    let ctx_clone = ctx.clone();
    tokio::spawn(async move {
        let interval = Duration::from_secs(ctx_clone.config.scheduler.daily_interval_secs);
        loop {
            match run_lifecycle(&ctx_clone).await {
                Ok(report) => {
                    tracing::info!(
                        deleted = report.deleted,
                        marked_taken = report.marked_taken,
                        warnings_sent = report.warnings_sent,
                        "Lifecycle maintenance complete"
                    );
                }
                Err(e) => tracing::error!("Lifecycle maintenance error: {}", e),
            }

            match run_expiry_sweep(&ctx_clone).await {
                Ok(expired) => tracing::info!(expired, "Subscription expiry sweep complete"),
                Err(e) => tracing::error!("Subscription expiry sweep error: {}", e),
            }

            tokio::time::sleep(interval).await;
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping");

    Ok(())
}
