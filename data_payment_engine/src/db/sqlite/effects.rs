use chrono::{Duration, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::db_types::{EffectRecord, EffectType, OrderId};

const EFFECT_SELECT: &str = r#"
    SELECT order_id, effect_type, status, attempts, last_error, claimed_at, created_at, updated_at
    FROM side_effects
"#;

/// Claims the effect for the caller. The first claim inserts a `running` record. Later claims only succeed if the
/// previous attempt failed, or if its lease has run out. Each step is a single conditional statement, so two
/// concurrent callers can never both win.
pub async fn claim(
    order_id: &OrderId,
    effect: EffectType,
    lease: Duration,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let now = Utc::now();
    let lease_expires_at = (now + lease).timestamp_millis();
    let inserted = sqlx::query(
        r#"
            INSERT INTO side_effects
                (order_id, effect_type, status, attempts, claimed_at, lease_expires_at, created_at, updated_at)
            VALUES (?, ?, 'running', 1, ?, ?, ?, ?)
            ON CONFLICT (order_id, effect_type) DO NOTHING;
        "#,
    )
    .bind(order_id)
    .bind(effect)
    .bind(now)
    .bind(lease_expires_at)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if inserted == 1 {
        trace!("🗃️ First claim on {effect} for order {order_id}");
        return Ok(true);
    }
    let reclaimed = sqlx::query(
        r#"
            UPDATE side_effects
            SET status = 'running', attempts = attempts + 1, claimed_at = ?, lease_expires_at = ?, updated_at = ?
            WHERE order_id = ? AND effect_type = ?
            AND (status = 'failed' OR (status = 'running' AND lease_expires_at < ?));
        "#,
    )
    .bind(now)
    .bind(lease_expires_at)
    .bind(now)
    .bind(order_id)
    .bind(effect)
    .bind(now.timestamp_millis())
    .execute(conn)
    .await?
    .rows_affected();
    if reclaimed == 1 {
        debug!("🗃️ Re-claimed {effect} for order {order_id}");
    }
    Ok(reclaimed == 1)
}

/// Moves a `running` effect to `done` or `failed`. Returns `false` if there was no running claim to settle.
pub async fn settle(
    order_id: &OrderId,
    effect: EffectType,
    error: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let status = if error.is_some() { "failed" } else { "done" };
    let rows = sqlx::query(
        r#"
            UPDATE side_effects
            SET status = ?, last_error = COALESCE(?, last_error), updated_at = ?
            WHERE order_id = ? AND effect_type = ? AND status = 'running';
        "#,
    )
    .bind(status)
    .bind(error)
    .bind(Utc::now())
    .bind(order_id)
    .bind(effect)
    .execute(conn)
    .await?
    .rows_affected();
    Ok(rows == 1)
}

pub async fn fetch_effect(
    order_id: &OrderId,
    effect: EffectType,
    conn: &mut SqliteConnection,
) -> Result<Option<EffectRecord>, sqlx::Error> {
    let sql = format!("{EFFECT_SELECT} WHERE order_id = ? AND effect_type = ?");
    sqlx::query_as::<_, EffectRecord>(&sql).bind(order_id).bind(effect).fetch_optional(conn).await
}

pub async fn fetch_effects_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<EffectRecord>, sqlx::Error> {
    let sql = format!("{EFFECT_SELECT} WHERE order_id = ? ORDER BY created_at ASC");
    sqlx::query_as::<_, EffectRecord>(&sql).bind(order_id).fetch_all(conn).await
}
