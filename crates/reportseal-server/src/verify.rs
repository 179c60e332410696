//! Verification orchestrator.
//!
//! `Received -> Hashing -> LookingUp -> {Verified | NotFound}`. A negative
//! result is an ordinary outcome, not an error. Nothing is retried here.

use std::fmt;

use chrono::{DateTime, Utc};
use reportseal_crypto::{LedgerRecord, ReportDigest};
use serde::Serialize;

use crate::error::AppError;
use crate::ledger::timestamp_to_datetime;
use crate::models::ReportEntry;
use crate::state::AppState;

pub const NOT_FOUND_MESSAGE: &str = "Report not found on blockchain";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyState {
    Received,
    Hashing,
    LookingUp,
    Verified,
    NotFound,
}

impl fmt::Display for VerifyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerifyState::Received => "received",
            VerifyState::Hashing => "hashing",
            VerifyState::LookingUp => "looking_up",
            VerifyState::Verified => "verified",
            VerifyState::NotFound => "not_found",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub valid: bool,
    pub digest: ReportDigest,
    /// Ledger timestamp in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchored_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<LedgerRecord>,
    /// Registry entry for the digest, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<ReportEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

struct Verification {
    state: VerifyState,
}

impl Verification {
    fn new() -> Self {
        tracing::debug!(state = %VerifyState::Received, "Verification started");
        Self {
            state: VerifyState::Received,
        }
    }

    fn advance(&mut self, next: VerifyState) {
        tracing::debug!(from = %self.state, to = %next, "Verification state change");
        self.state = next;
    }
}

/// Checks whether `bytes` were anchored on the ledger.
pub async fn verify_report(state: &AppState, bytes: &[u8]) -> Result<VerificationOutcome, AppError> {
    let mut verification = Verification::new();
    // Misconfiguration is reported before the artifact is even hashed.
    let ledger = state.ledger()?;

    verification.advance(VerifyState::Hashing);
    let digest = reportseal_crypto::digest(bytes);

    verification.advance(VerifyState::LookingUp);
    let record = ledger.lookup_record(&digest).await?;

    let Some(record) = record else {
        verification.advance(VerifyState::NotFound);
        tracing::info!(digest = %digest, "Report not anchored");
        return Ok(VerificationOutcome {
            valid: false,
            digest,
            timestamp: None,
            anchored_at: None,
            record: None,
            entry: None,
            message: Some(NOT_FOUND_MESSAGE.to_string()),
        });
    };

    verification.advance(VerifyState::Verified);
    tracing::info!(digest = %digest, timestamp = record.timestamp, "Report verified");

    let entry = match state.registry().find_by_digest(&digest).await {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!(digest = %digest, error = %e, "Registry lookup skipped");
            None
        }
    };

    Ok(VerificationOutcome {
        valid: true,
        digest,
        timestamp: Some(record.timestamp),
        anchored_at: timestamp_to_datetime(record.timestamp),
        record: Some(record),
        entry,
        message: None,
    })
}
