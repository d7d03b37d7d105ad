//! # SQLite backend
//!
//! The low-level queries live in [`orders`], [`events`] and [`effects`] as plain functions that take a
//! `&mut SqliteConnection`. Callers can pass a pooled connection, or open a transaction and pass that instead when
//! several statements must be atomic. [`SqliteDatabase`] composes them into the storage traits.
use std::env;

use log::*;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};

mod errors;
mod sqlite_impl;

pub mod effects;
pub mod events;
pub mod orders;

pub use errors::SqliteDatabaseError;
pub use sqlite_impl::SqliteDatabase;

const SQLITE_DB_URL: &str = "sqlite://data/dpg_store.db";

pub fn db_url() -> String {
    let result = env::var("DPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ DPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqliteDatabaseError> {
    if !Sqlite::database_exists(url).await? {
        info!("🗃️ Database {url} does not exist. Creating it.");
        Sqlite::create_database(url).await?;
    }
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
