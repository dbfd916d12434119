/// Application context and dependency injection
use crate::{
    aggregator::{DashboardFeed, LiveAggregator},
    attribution::{Attribution, HttpAttribution, StaticAttribution},
    audit::AuditLogger,
    config::{ConsoleConfig, StoreBackend},
    db,
    error::ConsoleResult,
    moderation::ModerationEngine,
    store::{DocumentStore, MemoryStore, SqliteStore},
    traffic::TrafficEstimator,
};
use std::sync::Arc;
use tracing::info;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ConsoleConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub audit: AuditLogger,
    pub moderation: Arc<ModerationEngine>,
    pub aggregator: Arc<LiveAggregator>,
    pub feed: Arc<DashboardFeed>,
    pub traffic: Arc<TrafficEstimator>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ConsoleConfig) -> ConsoleResult<Self> {
        // Validate configuration
        config.validate()?;

        let store = Self::open_store(&config).await?;

        let attribution: Arc<dyn Attribution> = if config.attribution.enabled {
            Arc::new(HttpAttribution::new(config.attribution_config()))
        } else {
            Arc::new(StaticAttribution::unknown())
        };

        Ok(Self::with_store(config, store, attribution))
    }

    /// Assemble the services over an already opened store
    pub fn with_store(
        config: ConsoleConfig,
        store: Arc<dyn DocumentStore>,
        attribution: Arc<dyn Attribution>,
    ) -> Self {
        let audit = AuditLogger::new(store.clone(), attribution);
        let moderation = Arc::new(ModerationEngine::new(
            store.clone(),
            audit.clone(),
            config.moderation_options(),
        ));
        let aggregator = Arc::new(LiveAggregator::new(store.clone()));
        let traffic = Arc::new(TrafficEstimator::new(store.clone(), config.traffic_options()));

        Self {
            config: Arc::new(config),
            store,
            audit,
            moderation,
            aggregator,
            feed: DashboardFeed::new(),
            traffic,
        }
    }

    /// Start the live subscriptions behind the dashboard feed
    pub fn start_feeds(&self) {
        self.feed
            .attach(&self.aggregator, self.config.dashboard.log_limit);
        info!("Live feeds started: {:?}", self.aggregator.active());
    }

    /// Tear down live subscriptions
    pub fn shutdown(&self) {
        self.aggregator.dispose_all();
    }

    async fn open_store(config: &ConsoleConfig) -> ConsoleResult<Arc<dyn DocumentStore>> {
        match &config.storage.backend {
            StoreBackend::Memory => {
                info!("Using in-memory document store");
                Ok(Arc::new(MemoryStore::with_max_batch_ops(
                    config.storage.max_batch_ops,
                )))
            }
            StoreBackend::Sqlite { path } => {
                info!("Using SQLite document store at {:?}", path);
                let pool = db::create_pool(path, db::DatabaseOptions::default()).await?;
                db::test_connection(&pool).await?;
                Ok(Arc::new(
                    SqliteStore::new(pool, config.storage.max_batch_ops).await?,
                ))
            }
        }
    }
}
