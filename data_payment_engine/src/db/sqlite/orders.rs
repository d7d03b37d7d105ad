use chrono::{DateTime, Utc};
use log::*;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId, PaymentStatus},
    order_objects::{OrderQueryFilter, OrderStats},
};

const ORDER_SELECT: &str = r#"
    SELECT
        order_id,
        provider_id,
        provider_ref,
        user_id,
        dataset_id,
        display_name,
        price,
        buyer_contact,
        receipt_type,
        receipt_identifier,
        payment_status,
        delivery_status,
        delivery_url,
        created_at,
        completed_at,
        updated_at
    FROM orders
"#;

/// Inserts the order with the given payment status. Returns `false` without changing anything if the order id or
/// the provider reference is already taken.
pub async fn insert_order(
    order: &NewOrder,
    status: PaymentStatus,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let completed_at = (status == PaymentStatus::Completed).then_some(at);
    let rows = sqlx::query(
        r#"
            INSERT INTO orders (
                order_id,
                provider_id,
                provider_ref,
                user_id,
                dataset_id,
                display_name,
                price,
                buyer_contact,
                receipt_type,
                receipt_identifier,
                payment_status,
                delivery_status,
                created_at,
                completed_at,
                updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)
            ON CONFLICT DO NOTHING;
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.provider_id)
    .bind(&order.provider_ref)
    .bind(&order.user_id)
    .bind(&order.dataset_id)
    .bind(&order.display_name)
    .bind(order.price)
    .bind(&order.buyer_contact)
    .bind(order.receipt_type)
    .bind(&order.receipt_identifier)
    .bind(status)
    .bind(at)
    .bind(completed_at)
    .bind(at)
    .execute(conn)
    .await?
    .rows_affected();
    trace!("🗃️ Insert of order {} affected {rows} rows", order.order_id);
    Ok(rows == 1)
}

pub async fn fetch_order_by_id(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let sql = format!("{ORDER_SELECT} WHERE order_id = ?");
    sqlx::query_as::<_, Order>(&sql).bind(order_id).fetch_optional(conn).await
}

pub async fn fetch_order_by_provider_ref(
    provider_id: &str,
    provider_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let sql = format!("{ORDER_SELECT} WHERE provider_id = ? AND provider_ref = ?");
    sqlx::query_as::<_, Order>(&sql).bind(provider_id).bind(provider_ref).fetch_optional(conn).await
}

/// Compare-and-swap from `pending` to the given terminal status. `completed_at` is only written on the transition to
/// `completed`. Returns `true` if a row was changed.
pub async fn transition_pending(
    provider_id: &str,
    provider_ref: &str,
    status: PaymentStatus,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let completed_at = (status == PaymentStatus::Completed).then_some(at);
    let rows = sqlx::query(
        r#"
            UPDATE orders
            SET payment_status = ?, completed_at = ?, updated_at = ?
            WHERE provider_id = ? AND provider_ref = ? AND payment_status = 'pending';
        "#,
    )
    .bind(status)
    .bind(completed_at)
    .bind(at)
    .bind(provider_id)
    .bind(provider_ref)
    .execute(conn)
    .await?
    .rows_affected();
    Ok(rows == 1)
}

/// Marks a completed, undelivered order as delivered. Returns `true` if a row was changed.
pub async fn mark_delivered(
    order_id: &OrderId,
    delivery_url: &str,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let rows = sqlx::query(
        r#"
            UPDATE orders
            SET delivery_status = 'delivered', delivery_url = ?, updated_at = ?
            WHERE order_id = ? AND payment_status = 'completed' AND delivery_status = 'pending';
        "#,
    )
    .bind(delivery_url)
    .bind(at)
    .bind(order_id)
    .execute(conn)
    .await?
    .rows_affected();
    Ok(rows == 1)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in descending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(ORDER_SELECT);
    if !query.is_empty() {
        builder.push(" WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(provider_id) = query.provider_id {
        where_clause.push("provider_id = ");
        where_clause.push_bind_unseparated(provider_id);
    }
    if let Some(dataset_id) = query.dataset_id {
        where_clause.push("dataset_id = ");
        where_clause.push_bind_unseparated(dataset_id);
    }
    if let Some(user_id) = query.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if !query.payment_statuses.is_empty() {
        let statuses = query.payment_statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
        where_clause.push(format!("payment_status IN ({statuses})"));
    }
    if let Some(status) = query.delivery_status {
        where_clause.push("delivery_status = ");
        where_clause.push_bind_unseparated(status);
    }
    builder.push(" ORDER BY created_at DESC");
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }
    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {}", orders.len());
    Ok(orders)
}

pub async fn fetch_order_stats(conn: &mut SqliteConnection) -> Result<OrderStats, sqlx::Error> {
    let (total_orders, completed_orders, total_revenue) = sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN payment_status = 'completed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN payment_status = 'completed' THEN price ELSE 0 END), 0)
            FROM orders;
        "#,
    )
    .fetch_one(conn)
    .await?;
    Ok(OrderStats { total_revenue: total_revenue.into(), total_orders, completed_orders })
}

/// Completed orders that still have outstanding side effects. An effect counts as settled once it is `done`, or once
/// it has failed `max_attempts` times.
pub async fn fetch_effect_backlog(
    limit: i64,
    max_attempts: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let sql = format!(
        r#"{ORDER_SELECT}
        WHERE payment_status = 'completed' AND (
            (delivery_status = 'pending' AND NOT EXISTS (
                SELECT 1 FROM side_effects s
                WHERE s.order_id = orders.order_id AND s.effect_type = 'delivery'
                AND (s.status = 'done' OR s.attempts >= ?)
            ))
            OR
            (receipt_type != 'none' AND NOT EXISTS (
                SELECT 1 FROM side_effects s
                WHERE s.order_id = orders.order_id AND s.effect_type = 'receipt'
                AND (s.status = 'done' OR s.attempts >= ?)
            ))
        )
        ORDER BY completed_at ASC
        LIMIT ?"#
    );
    sqlx::query_as::<_, Order>(&sql).bind(max_attempts).bind(max_attempts).bind(limit).fetch_all(conn).await
}
