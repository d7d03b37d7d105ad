use sqlx::SqliteConnection;

use crate::db_types::GatewayEvent;

const EVENT_SELECT: &str = r#"
    SELECT
        event_key,
        provider_id,
        provider_ref,
        event_type,
        outcome,
        amount,
        buyer_contact,
        dataset_id,
        display_name,
        user_id,
        receipt_type,
        receipt_identifier,
        received_at
    FROM gateway_events
"#;

/// Stores the event unless its key is already present. The unique key makes this safe under concurrent delivery:
/// exactly one insert affects a row.
pub async fn insert_if_new(event: &GatewayEvent, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let rows = sqlx::query(
        r#"
            INSERT INTO gateway_events (
                event_key,
                provider_id,
                provider_ref,
                event_type,
                outcome,
                amount,
                buyer_contact,
                dataset_id,
                display_name,
                user_id,
                receipt_type,
                receipt_identifier,
                received_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (event_key) DO NOTHING;
        "#,
    )
    .bind(&event.event_key)
    .bind(&event.provider_id)
    .bind(&event.provider_ref)
    .bind(&event.event_type)
    .bind(event.outcome)
    .bind(event.amount)
    .bind(&event.buyer_contact)
    .bind(&event.dataset_id)
    .bind(&event.display_name)
    .bind(&event.user_id)
    .bind(event.receipt_type)
    .bind(&event.receipt_identifier)
    .bind(event.received_at)
    .execute(conn)
    .await?
    .rows_affected();
    Ok(rows == 1)
}

pub async fn delete_event(event_key: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM gateway_events WHERE event_key = ?").bind(event_key).execute(conn).await?;
    Ok(())
}

pub async fn fetch_event(event_key: &str, conn: &mut SqliteConnection) -> Result<Option<GatewayEvent>, sqlx::Error> {
    let sql = format!("{EVENT_SELECT} WHERE event_key = ?");
    sqlx::query_as::<_, GatewayEvent>(&sql).bind(event_key).fetch_optional(conn).await
}

pub async fn fetch_events_for_provider_ref(
    provider_id: &str,
    provider_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<GatewayEvent>, sqlx::Error> {
    let sql = format!("{EVENT_SELECT} WHERE provider_id = ? AND provider_ref = ? ORDER BY received_at ASC");
    sqlx::query_as::<_, GatewayEvent>(&sql).bind(provider_id).bind(provider_ref).fetch_all(conn).await
}
