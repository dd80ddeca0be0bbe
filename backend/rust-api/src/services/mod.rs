use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, StorageBackend};
use crate::store::{GradingStore, MemoryStore, MongoStore};
use answer_key_service::AnswerKeyService;
use attempt_service::AttemptService;
use recalculation_service::RecalculationService;
use scan_service::ScanService;
use scanner::{ScanProcessor, SubprocessScanner};
use statistics_service::StatisticsService;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn GradingStore>,
    pub scanner: Arc<dyn ScanProcessor>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn GradingStore> = match config.storage {
            StorageBackend::Mongo => {
                tracing::info!("Connecting to MongoDB...");
                let client = mongodb::Client::with_uri_str(&config.mongo_uri).await?;
                let store = MongoStore::new(client.database(&config.mongo_database));

                tokio::time::timeout(Duration::from_secs(30), store.ensure_indexes())
                    .await
                    .map_err(|_| anyhow::anyhow!("MongoDB index setup timeout after 30s"))??;

                tracing::info!(database = %config.mongo_database, "MongoDB connection established");
                Arc::new(store)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage, data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let scanner = Arc::new(SubprocessScanner::new(config.scanner.clone()));
        Ok(Self::with_components(config, store, scanner))
    }

    pub fn with_components(
        config: Config,
        store: Arc<dyn GradingStore>,
        scanner: Arc<dyn ScanProcessor>,
    ) -> Self {
        Self {
            config,
            store,
            scanner,
        }
    }

    pub fn attempts(&self) -> AttemptService {
        AttemptService::new(self.store.clone())
    }

    pub fn answer_keys(&self) -> AnswerKeyService {
        AnswerKeyService::new(
            self.store.clone(),
            self.scanner.clone(),
            self.config.scanner.dummy_key_length,
        )
    }

    pub fn scans(&self) -> ScanService {
        ScanService::new(
            self.store.clone(),
            self.scanner.clone(),
            self.config.scanner.batch_concurrency,
        )
    }

    pub fn recalculation(&self) -> RecalculationService {
        RecalculationService::new(self.store.clone(), self.config.cascade_concurrency)
    }

    pub fn statistics(&self) -> StatisticsService {
        StatisticsService::new(self.store.clone())
    }
}

pub mod answer_key_service;
pub mod attempt_service;
pub mod recalculation_service;
pub mod scan_service;
pub mod scanner;
pub mod scoring;
pub mod statistics_service;
