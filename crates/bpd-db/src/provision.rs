//! Operator-side table creation (`bpd db provision`). Idempotent.

use anyhow::{Context, Result};
use bpd_config::PersistTarget;
use sqlx::PgPool;

use crate::{checked_table, split_table};

async fn ensure_schema(pool: &PgPool, table: &str) -> Result<()> {
    let (schema, _) = split_table(table);
    if schema != "public" {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
            .execute(pool)
            .await
            .with_context(|| format!("create schema {schema} failed"))?;
    }
    Ok(())
}

/// Create the per-machine front/rear table.
pub async fn provision_target(pool: &PgPool, target: &PersistTarget) -> Result<()> {
    let table = checked_table(&target.events_table)?;
    ensure_schema(pool, table).await?;
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id          BIGSERIAL PRIMARY KEY,
            epochtime   BIGINT,
            lotno       VARCHAR(255),
            pro         VARCHAR(255),
            counter     BIGINT NOT NULL DEFAULT 1,
            front       DOUBLE PRECISION DEFAULT 0,
            rear        DOUBLE PRECISION DEFAULT 0,
            delta       DOUBLE PRECISION DEFAULT 0,
            created_at  TIMESTAMPTZ DEFAULT now(),
            updated_at  TIMESTAMPTZ DEFAULT now()
        )
        "#
    ))
    .execute(pool)
    .await
    .with_context(|| format!("create table {table} failed"))?;
    Ok(())
}

/// Create the production-identity table when it does not exist yet.
///
/// In production this table belongs to the planning system; this is for
/// fresh environments and tests.
pub async fn provision_identity_table(pool: &PgPool, target: &PersistTarget) -> Result<()> {
    let table = checked_table(&target.identity_table)?;
    ensure_schema(pool, table).await?;
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id          SERIAL PRIMARY KEY,
            lotno       VARCHAR(50),
            prod_order  VARCHAR(50),
            "isActive"  VARCHAR(20),
            last_update TIMESTAMPTZ
        )
        "#
    ))
    .execute(pool)
    .await
    .with_context(|| format!("create table {table} failed"))?;
    Ok(())
}
