use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        // Spawn traffic tasks
        tokio::spawn(Self::traffic_estimation_job(Arc::clone(&self)));
        tokio::spawn(Self::traffic_refresh_job(Arc::clone(&self)));

        // Spawn monitoring tasks
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Sample online users into the traffic ledger (runs every interval)
    async fn traffic_estimation_job(scheduler: Arc<Self>) {
        let period = Duration::from_secs(scheduler.context.config.traffic.interval_secs);
        let mut interval = interval(period);
        // First tick completes immediately; sampling starts one period in
        interval.tick().await;

        loop {
            interval.tick().await;

            match tasks::estimate_traffic(&scheduler.context).await {
                Ok(bytes) => {
                    crate::metrics::record_background_job("traffic_estimation", true);
                    debug!("Traffic tick recorded {} bytes", bytes);
                }
                Err(e) => {
                    crate::metrics::record_background_job("traffic_estimation", false);
                    error!("Failed to record traffic tick: {}", e);
                }
            }
        }
    }

    /// Reload traffic totals from the ledger (runs at startup, then hourly)
    async fn traffic_refresh_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600)); // Every hour

        loop {
            interval.tick().await;
            let summary = tasks::refresh_traffic(&scheduler.context).await;
            info!(
                "Traffic totals refreshed ({:?}): today {}",
                summary.provenance,
                crate::traffic::format_bytes(summary.today)
            );
        }
    }

    /// Health check job (runs every configured interval)
    async fn health_check_job(scheduler: Arc<Self>) {
        let period = Duration::from_secs(scheduler.context.config.storage.health_check_interval_secs);
        let mut interval = interval(period);

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    // Silent success - store is reachable
                    crate::metrics::record_background_job("health_check", true);
                }
                Err(e) => {
                    crate::metrics::record_background_job("health_check", false);
                    error!("Health check failed: {}", e);
                }
            }
        }
    }
}
