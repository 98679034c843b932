//! bpd-db
//!
//! Persistence Gateway: one transaction per reconciled batch.
//!
//! The pool is opened once by the process and injected into
//! [`PgEventStore`]; nothing in here reads global state after construction.

mod provision;
mod store;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub use provision::{provision_identity_table, provision_target};
pub use store::{EventStore, PgEventStore};

pub const ENV_DB_URL: &str = "BPD_DATABASE_URL";
pub const ENV_DB_MAX_CONNECTIONS: &str = "BPD_DB_MAX_CONNECTIONS";

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Connect to Postgres using BPD_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let max = std::env::var(ENV_DB_MAX_CONNECTIONS)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_MAX_CONNECTIONS);

    let pool = PgPoolOptions::new()
        .max_connections(max)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct TableStatus {
    pub table: String,
    pub exists: bool,
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub tables: Vec<TableStatus>,
}

/// Connectivity check plus presence of each named table.
pub async fn status(pool: &PgPool, tables: &[String]) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let mut out = Vec::with_capacity(tables.len());
    for table in tables {
        let (schema, name) = split_table(table);
        let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
            r#"
            select exists (
                select 1
                from information_schema.tables
                where table_schema = $1 and table_name = $2
            )
            "#,
        )
        .bind(schema)
        .bind(name)
        .fetch_one(pool)
        .await
        .with_context(|| format!("status table-exists query failed for {table}"))?;
        out.push(TableStatus {
            table: table.clone(),
            exists,
        });
    }

    Ok(DbStatus {
        ok: one == 1,
        tables: out,
    })
}

/// `schema.name` -> (`schema`, `name`); bare names live in `public`.
pub(crate) fn split_table(table: &str) -> (&str, &str) {
    match table.split_once('.') {
        Some((schema, name)) => (schema, name),
        None => ("public", table),
    }
}

/// Validated identifier ready for interpolation.
pub(crate) fn checked_table(table: &str) -> Result<&str> {
    if bpd_config::is_valid_table_identifier(table) {
        Ok(table)
    } else {
        anyhow::bail!("refusing unsafe table identifier {table:?}")
    }
}
