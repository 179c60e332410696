//! PostgreSQL registry backend.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reportseal_crypto::ReportDigest;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::{RegistryError, RegistryNotifier, ReportStore};
use crate::db;
use crate::models::{NewReportEntry, ReportEntry, ReportEntryRow};

const ENTRY_COLUMNS: &str = "id, seq, owner_identity, digest, timestamp, cid, retrieval_url, \
     transaction_ref, block_number, chain_id, network_name, created_at";

pub struct PgReportStore {
    pool: PgPool,
    notifier: RegistryNotifier,
    /// Upper bound for a single registry call.
    call_timeout: Duration,
    /// Set once migrations have run; retried by the next call until then.
    schema: OnceCell<()>,
}

impl PgReportStore {
    pub fn new(pool: PgPool, call_timeout: Duration) -> Self {
        Self {
            pool,
            notifier: RegistryNotifier::new(),
            call_timeout,
            schema: OnceCell::new(),
        }
    }

    /// Applies pending migrations, once per process.
    pub async fn ensure_schema(&self) -> Result<(), RegistryError> {
        self.schema
            .get_or_try_init(|| async {
                match tokio::time::timeout(self.call_timeout, db::run_migrations(&self.pool)).await {
                    Ok(Ok(())) => {
                        tracing::info!("Registry migrations applied");
                        Ok(())
                    }
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Registry migrations failed");
                        Err(RegistryError::Unavailable(format!("Registry migrations failed: {}", e)))
                    }
                    Err(_) => {
                        tracing::error!(timeout = ?self.call_timeout, "Registry migrations timed out");
                        Err(RegistryError::Unavailable(format!(
                            "Registry migrations timed out after {:?}",
                            self.call_timeout
                        )))
                    }
                }
            })
            .await
            .map(|_| ())
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, RegistryError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(operation, error = %e, "Registry query failed");
                Err(RegistryError::Unavailable(format!("{} failed: {}", operation, e)))
            }
            Err(_) => {
                tracing::error!(operation, timeout = ?self.call_timeout, "Registry query timed out");
                Err(RegistryError::Unavailable(format!(
                    "{} timed out after {:?}",
                    operation, self.call_timeout
                )))
            }
        }
    }
}

fn into_entry(row: ReportEntryRow) -> Result<ReportEntry, RegistryError> {
    ReportEntry::try_from(row).map_err(|e| RegistryError::Unavailable(format!("Corrupt registry row: {}", e)))
}

#[async_trait]
impl ReportStore for PgReportStore {
    async fn add_entry(&self, entry: NewReportEntry) -> Result<ReportEntry, RegistryError> {
        self.ensure_schema().await?;
        let id = Uuid::new_v4();
        let (cid, retrieval_url) = match &entry.storage_receipt {
            Some(receipt) => (Some(receipt.cid.to_string()), Some(receipt.retrieval_url.clone())),
            None => (None, None),
        };
        let query = format!(
            r#"
            INSERT INTO report_entries
                (id, owner_identity, digest, timestamp, cid, retrieval_url,
                 transaction_ref, block_number, chain_id, network_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            ENTRY_COLUMNS
        );

        let row: ReportEntryRow = self
            .bounded(
                "add_entry",
                sqlx::query_as(&query)
                    .bind(id)
                    .bind(&entry.owner_identity)
                    .bind(entry.digest.to_string())
                    .bind(entry.timestamp)
                    .bind(cid)
                    .bind(retrieval_url)
                    .bind(&entry.transaction_ref)
                    .bind(entry.block_number.map(|n| n as i64))
                    .bind(entry.network.as_ref().map(|n| n.chain_id as i64))
                    .bind(entry.network.as_ref().map(|n| n.name.clone()))
                    .fetch_one(&self.pool),
            )
            .await?;

        let stored = into_entry(row)?;
        tracing::info!(
            id = %stored.id,
            owner = %stored.owner_identity,
            digest = %stored.digest,
            "Registry entry recorded"
        );
        self.notifier.notify(&stored.owner_identity);
        Ok(stored)
    }

    async fn list_by_owner(&self, owner_identity: &str) -> Result<Vec<ReportEntry>, RegistryError> {
        self.ensure_schema().await?;
        let query = format!(
            "SELECT {} FROM report_entries WHERE owner_identity = $1 ORDER BY created_at DESC, seq DESC",
            ENTRY_COLUMNS
        );
        let rows: Vec<ReportEntryRow> = self
            .bounded(
                "list_by_owner",
                sqlx::query_as(&query).bind(owner_identity).fetch_all(&self.pool),
            )
            .await?;
        rows.into_iter().map(into_entry).collect()
    }

    async fn find_by_digest(&self, digest: &ReportDigest) -> Result<Option<ReportEntry>, RegistryError> {
        self.ensure_schema().await?;
        let query = format!(
            "SELECT {} FROM report_entries WHERE digest = $1 ORDER BY created_at ASC, seq ASC LIMIT 1",
            ENTRY_COLUMNS
        );
        let row: Option<ReportEntryRow> = self
            .bounded(
                "find_by_digest",
                sqlx::query_as(&query).bind(digest.to_string()).fetch_optional(&self.pool),
            )
            .await?;
        row.map(into_entry).transpose()
    }

    fn notifier(&self) -> &RegistryNotifier {
        &self.notifier
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
