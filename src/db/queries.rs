use crate::models::{DeliveryRow, StoreConfigRow};
use sqlx::PgPool;

/// 查询所有待对账的配送单 (按门店、ID 排序)
pub async fn list_pending_deliveries(pool: &PgPool) -> Result<Vec<DeliveryRow>, sqlx::Error> {
    sqlx::query_as::<_, DeliveryRow>(
        r#"
        SELECT id, store_id, supplier_name, invoice_reference, bl_number,
               amount, scheduled_date, status
        FROM deliveries
        WHERE status = 'pending'
        ORDER BY store_id, id
        "#,
    )
    .fetch_all(pool)
    .await
}

/// 查询单个配送单
pub async fn get_delivery(pool: &PgPool, delivery_id: i64) -> Result<Option<DeliveryRow>, sqlx::Error> {
    sqlx::query_as::<_, DeliveryRow>(
        r#"
        SELECT id, store_id, supplier_name, invoice_reference, bl_number,
               amount, scheduled_date, status
        FROM deliveries
        WHERE id = $1
        "#,
    )
    .bind(delivery_id)
    .fetch_optional(pool)
    .await
}

/// 标记配送单已对账 (仅当仍为待对账状态时更新)
pub async fn mark_delivery_reconciled(pool: &PgPool, delivery_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE deliveries
        SET status = 'reconciled', reconciled_at = now()
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(delivery_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// 查询门店对账配置
pub async fn get_store_config(pool: &PgPool, store_id: i64) -> Result<Option<StoreConfigRow>, sqlx::Error> {
    sqlx::query_as::<_, StoreConfigRow>(
        r#"
        SELECT store_id, table_id, base_url, api_token,
               invoice_ref_column, bl_number_column, amount_column,
               supplier_column, date_column
        FROM store_reconciliation_configs
        WHERE store_id = $1
        "#,
    )
    .bind(store_id)
    .fetch_optional(pool)
    .await
}
