//! ReportSeal Server - API for report integrity
//!
//! This crate provides the REST API that pins SEO reports to IPFS, anchors
//! their digests on an EVM ledger and keeps a registry of who published what.

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod routes;
pub mod state;
pub mod storage;
pub mod verify;

pub use config::{Config, ConfigError};
pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;
