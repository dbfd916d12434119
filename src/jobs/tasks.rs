/// Background task implementations
use crate::{
    context::AppContext,
    error::ConsoleResult,
    models::collections,
    store::Query,
    traffic::TrafficSummary,
};
use chrono::Utc;
use tracing::debug;

/// Record one traffic interval from the latest online-user count
///
/// Skipped while the users feed is degraded, since its counters are unknown.
pub async fn estimate_traffic(ctx: &AppContext) -> ConsoleResult<u64> {
    let stats = ctx.aggregator.stats();
    if stats.users_degraded {
        debug!("Users feed degraded; skipping traffic tick");
        return Ok(0);
    }
    ctx.traffic.record_tick(stats.online_users, Utc::now()).await
}

/// Reload traffic totals; never fails, falls back to placeholder figures
pub async fn refresh_traffic(ctx: &AppContext) -> TrafficSummary {
    ctx.traffic.load(Utc::now()).await
}

/// Health check - verify the document store answers queries
pub async fn health_check(ctx: &AppContext) -> ConsoleResult<()> {
    ctx.store
        .query(&Query::collection(collections::ADMINS).limit(1))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attribution::StaticAttribution,
        config::ConsoleConfig,
        store::MemoryStore,
    };
    use std::sync::Arc;

    fn context(store: Arc<MemoryStore>) -> AppContext {
        let config = ConsoleConfig::from_lookup(|key| match key {
            "CONSOLE_JWT_SECRET" => Some("0123456789abcdef0123456789abcdef".to_string()),
            _ => None,
        })
        .unwrap();
        AppContext::with_store(config, store, Arc::new(StaticAttribution::unknown()))
    }

    #[tokio::test]
    async fn test_health_check_follows_store() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());
        assert!(health_check(&ctx).await.is_ok());

        store.set_offline(true);
        assert!(health_check(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_estimate_traffic_without_online_users() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());

        assert_eq!(estimate_traffic(&ctx).await.unwrap(), 0);
        assert_eq!(store.count("traffic").await, 1);
    }
    #[tokio::test]
    async fn test_estimate_traffic_skips_degraded_users_feed() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(store.clone());
        let mut stats = ctx.aggregator.watch_stats();

        store.set_offline(true);
        ctx.aggregator.subscribe_users(|_| {});
        stats
            .wait_for(|s| s.users_degraded)
            .await
            .unwrap();
        store.set_offline(false);

        assert_eq!(estimate_traffic(&ctx).await.unwrap(), 0);
        assert_eq!(store.count("traffic").await, 0);
    }
}
