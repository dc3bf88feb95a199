use chrono::Duration;
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{FulfillmentStatus, NewOrder, Order, OrderId, PaymentStatus},
    traits::{OrderQueryFilter, PipelineError},
};

/// Inserts the order into the database, returning `false` in the second parameter if the order already exists.
pub async fn idempotent_insert(
    order: NewOrder,
    conn: &mut SqliteConnection,
) -> Result<(Order, bool), PipelineError> {
    let inserted = match fetch_order_by_order_id(&order.order_id, conn).await? {
        Some(order) => (order, false),
        None => {
            let order = insert_order(order, conn).await?;
            debug!("📝️ Order [{}] inserted with id {}", order.order_id, order.id);
            (order, true)
        },
    };
    Ok(inserted)
}

async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PipelineError> {
    let total = order.total_price();
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                shop_id,
                msisdn,
                network,
                volume_mb,
                cost_price,
                margin,
                total_price,
                payment_reference
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.shop_id)
    .bind(order.msisdn)
    .bind(order.network.to_string())
    .bind(order.volume_mb)
    .bind(order.cost_price.value())
    .bind(order.margin.value())
    .bind(total.value())
    .bind(order.payment_reference)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.to_string());
    }
    if let Some(shop_id) = query.shop_id {
        where_clause.push("shop_id = ");
        where_clause.push_bind_unseparated(shop_id);
    }
    if let Some(msisdn) = query.msisdn {
        where_clause.push("msisdn = ");
        where_clause.push_bind_unseparated(msisdn);
    }
    if let Some(network) = query.network {
        where_clause.push("network = ");
        where_clause.push_bind_unseparated(network.to_string());
    }
    if query.payment_status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let statuses =
            query.payment_status.as_ref().unwrap().iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("payment_status IN ({statuses})"));
    }
    if query.fulfillment_status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let statuses =
            query.fulfillment_status.as_ref().unwrap().iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("fulfillment_status IN ({statuses})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("📝️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Order>();
    let orders = query.fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}

/// Claim transition `Pending -> Completed`. `None` means a concurrent path already resolved the payment.
pub(crate) async fn mark_paid(
    order_id: &OrderId,
    reference: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PipelineError> {
    let order = sqlx::query_as(
        "UPDATE orders SET payment_status = 'Completed', payment_reference = COALESCE($2, payment_reference), \
         updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND payment_status = 'Pending' RETURNING *",
    )
    .bind(order_id.as_str())
    .bind(reference)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Claim transition `Pending -> Failed | Abandoned`.
pub(crate) async fn mark_payment_failed(
    order_id: &OrderId,
    status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PipelineError> {
    let order = sqlx::query_as(
        "UPDATE orders SET payment_status = $2, updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND \
         payment_status = 'Pending' RETURNING *",
    )
    .bind(order_id.as_str())
    .bind(status.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Claim transition for dispatch: `Unfulfilled | Failed -> Processing`, guarded on the payment being completed.
/// The guard is what enforces "no dispatch before payment" at the storage level.
pub(crate) async fn claim_for_dispatch(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PipelineError> {
    let order = sqlx::query_as(
        "UPDATE orders SET fulfillment_status = 'Processing', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND \
         payment_status = 'Completed' AND fulfillment_status IN ('Unfulfilled', 'Failed') RETURNING *",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Claim transition to `Delivered`. Anything already `Delivered` misses the claim, which is how duplicate webhook
/// deliveries become no-ops.
pub(crate) async fn mark_delivered(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PipelineError> {
    let order = sqlx::query_as(
        "UPDATE orders SET fulfillment_status = 'Delivered', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND \
         fulfillment_status != 'Delivered' RETURNING *",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Terminal fulfillment failure, claimed from `Processing`.
pub(crate) async fn mark_fulfillment_failed(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PipelineError> {
    let order = sqlx::query_as(
        "UPDATE orders SET fulfillment_status = 'Failed', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND \
         fulfillment_status = 'Processing' RETURNING *",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Claims each order with a conditional update; orders that lost the race are simply absent from the result.
pub(crate) async fn claim_many(
    order_ids: &[OrderId],
    expected: FulfillmentStatus,
    new_status: FulfillmentStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, PipelineError> {
    let mut claimed = Vec::with_capacity(order_ids.len());
    for order_id in order_ids {
        let order: Option<Order> = sqlx::query_as(
            "UPDATE orders SET fulfillment_status = $3, updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND \
             fulfillment_status = $2 RETURNING *",
        )
        .bind(order_id.as_str())
        .bind(expected.to_string())
        .bind(new_status.to_string())
        .fetch_optional(&mut *conn)
        .await?;
        match order {
            Some(order) => claimed.push(order),
            None => trace!("📝️ Order {order_id} was not in {expected}; excluded from the claimed set"),
        }
    }
    Ok(claimed)
}

/// Orders that should have resolved but haven't: payment still pending and older than the threshold.
pub(crate) async fn stale_pending(
    older_than: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, PipelineError> {
    let rows = sqlx::query_as(
        "SELECT * FROM orders WHERE payment_status = 'Pending' AND (unixepoch(CURRENT_TIMESTAMP) - \
         unixepoch(created_at)) > $1 ORDER BY created_at ASC",
    )
    .bind(older_than.num_seconds())
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Repair claim: `Failed -> Pending`, so the reconciler can re-drive the order through the normal flow.
pub(crate) async fn reset_failed(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PipelineError> {
    let order = sqlx::query_as(
        "UPDATE orders SET payment_status = 'Pending', updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 AND \
         payment_status = 'Failed' RETURNING *",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Orders marked failed despite evidence of payment: a completed ledger debit for their order id, or a gateway
/// payment reference on the order itself.
pub(crate) async fn failed_but_paid(conn: &mut SqliteConnection) -> Result<Vec<Order>, PipelineError> {
    let rows = sqlx::query_as(
        r#"
        SELECT DISTINCT orders.*
        FROM orders
        LEFT JOIN wallet_transactions
               ON wallet_transactions.reference = orders.order_id
              AND wallet_transactions.tx_type = 'Debit'
              AND wallet_transactions.status = 'Completed'
        WHERE orders.payment_status = 'Failed'
          AND (wallet_transactions.id IS NOT NULL OR orders.payment_reference IS NOT NULL)
        ORDER BY orders.created_at ASC
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Paid orders in a non-terminal-failure state with no profit record at all.
pub(crate) async fn missing_profit(conn: &mut SqliteConnection) -> Result<Vec<Order>, PipelineError> {
    let rows = sqlx::query_as(
        r#"
        SELECT orders.*
        FROM orders
        LEFT JOIN profits ON profits.order_id = orders.order_id AND profits.shop_id = orders.shop_id
        WHERE orders.payment_status = 'Completed'
          AND orders.fulfillment_status != 'Failed'
          AND profits.id IS NULL
        ORDER BY orders.created_at ASC
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
