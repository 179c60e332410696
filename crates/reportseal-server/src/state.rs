//! Shared application state handed to every router.

use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;

use crate::config::{Config, ConfigError, DEFAULT_MAX_UPLOAD_BYTES};
use crate::db;
use crate::error::AppError;
use crate::ledger::{EvmLedger, Ledger};
use crate::registry::{MemoryReportStore, PgReportStore, ReportStore};
use crate::storage::{ContentStore, PinataClient};

/// Clients built once at startup. A misconfigured section keeps its
/// configuration error so the endpoints that need it fail before any I/O.
#[derive(Clone)]
pub struct AppState {
    storage: Result<Arc<dyn ContentStore>, ConfigError>,
    ledger: Result<Arc<dyn Ledger>, ConfigError>,
    registry: Arc<dyn ReportStore>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        storage: Result<Arc<dyn ContentStore>, ConfigError>,
        ledger: Result<Arc<dyn Ledger>, ConfigError>,
        registry: Arc<dyn ReportStore>,
    ) -> Self {
        Self {
            storage,
            ledger,
            registry,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Builds the production clients from configuration.
    ///
    /// Uses PostgreSQL when `DATABASE_URL` is set, otherwise the in-memory
    /// registry. Only a malformed URL or client setup failure is fatal.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let storage: Result<Arc<dyn ContentStore>, ConfigError> = match config.storage() {
            Ok(section) => {
                let client = PinataClient::new(section.clone(), config.http_timeout)
                    .context("Failed to build storage client")?;
                Ok(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!(variable = e.variable(), "Storage disabled: {}", e);
                Err(e)
            }
        };

        let ledger: Result<Arc<dyn Ledger>, ConfigError> = match config.ledger() {
            Ok(section) => {
                let client = EvmLedger::new(section.clone(), config.http_timeout)
                    .context("Failed to build ledger client")?;
                Ok(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!(variable = e.variable(), "Ledger disabled: {}", e);
                Err(e)
            }
        };

        let registry: Arc<dyn ReportStore> = match &config.database_url {
            Some(url) => {
                let pool = db::create_pool(url.expose_secret(), config.http_timeout)
                    .context("Invalid DATABASE_URL")?;
                let store = PgReportStore::new(pool, config.http_timeout);
                // An unreachable database only degrades the registry; calls retry the migrations.
                if let Err(e) = store.ensure_schema().await {
                    tracing::error!(error = %e, "Registry database unavailable at startup");
                }
                tracing::info!("Registry backed by PostgreSQL");
                Arc::new(store)
            }
            None => {
                tracing::warn!("DATABASE_URL not set; registry entries are kept in memory and lost on restart");
                Arc::new(MemoryReportStore::new())
            }
        };

        Ok(Self::new(storage, ledger, registry).with_max_upload_bytes(config.max_upload_bytes))
    }

    pub fn storage(&self) -> Result<&Arc<dyn ContentStore>, AppError> {
        self.storage.as_ref().map_err(|e| AppError::Config(e.clone()))
    }

    pub fn ledger(&self) -> Result<&Arc<dyn Ledger>, AppError> {
        self.ledger.as_ref().map_err(|e| AppError::Config(e.clone()))
    }

    pub fn registry(&self) -> &Arc<dyn ReportStore> {
        &self.registry
    }
}
