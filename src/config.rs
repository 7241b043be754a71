// ⚙️ Configuration - Command-line flags with environment fallbacks
// Shared by the CLI and the HTTP server binaries

use crate::db::Database;
use crate::service::ServiceContext;
use anyhow::{anyhow, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_DATABASE: &str = "recommendations.db";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_LOG: &str = "info";

#[derive(Args, Debug, Clone)]
pub struct ServiceConfig {
    /// SQLite database holding users, products, transactions and rules
    #[arg(long, env = "RECOMMENDATION_DB", default_value = DEFAULT_DATABASE, global = true)]
    pub database: PathBuf,

    /// Address the HTTP server listens on
    #[arg(long, env = "RECOMMENDATION_BIND", default_value = DEFAULT_BIND, global = true)]
    pub bind: String,

    /// Log filter directive (e.g. "info", "recommendation_service=debug")
    #[arg(long, env = "RUST_LOG", default_value = DEFAULT_LOG, global = true)]
    pub log: String,
}

impl ServiceConfig {
    pub fn open_database(&self) -> Result<Database> {
        tracing::info!(path = ?self.database, "opening database");
        Database::open(&self.database)
    }

    /// One database backs the aggregates, the rule store and the stats store
    pub fn build_context(&self) -> Result<ServiceContext<Database>> {
        let db = self.open_database()?;
        Ok(context_for(db))
    }
}

pub fn context_for(db: Database) -> ServiceContext<Database> {
    ServiceContext::new(db.clone(), Arc::new(db.clone()), Arc::new(db))
}

/// Install the global fmt subscriber; fails on a bad directive or a second call
pub fn init_tracing(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|e| anyhow!("invalid log filter {:?}: {}", filter, e))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("tracing already initialized: {}", e))
}

// ============================================================================
// TESTS
// ============================================================================
