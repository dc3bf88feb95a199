//! # SQLite database methods
//!
//! "Low-level" SQLite interactions for the pipeline, maintained as simple functions (rather than stateful structs)
//! that accept a `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or create an atomic
//! transaction as the need arises and pass `&mut *tx` through without any other changes.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod blacklist;
pub mod orders;
pub mod profits;
pub mod settings;
pub mod shops;
pub mod tracking;
pub mod wallets;
pub mod webhook_events;

const SQLITE_DB_URL: &str = "sqlite://data/bundle_store.db";

pub fn db_url() -> String {
    let result = env::var("BPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("BPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    // Writers on different pool connections contend for SQLite's single write lock; wait for it instead of
    // surfacing SQLITE_BUSY to the caller.
    let options = SqliteConnectOptions::from_str(url)?.busy_timeout(Duration::from_secs(10));
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// Unique-constraint conflicts are part of the pipeline's dedup design and are treated as benign by callers.
pub fn is_unique_violation(e: &SqlxError) -> bool {
    matches!(e, SqlxError::Database(db) if db.is_unique_violation())
}
