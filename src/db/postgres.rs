use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

use super::queries;
use super::store::{DeliveryStore, StoreConfigLookup, StoreConfigSource};
use crate::error::StoreError;
use crate::models::{Delivery, StoreReconciliationConfig};

/// 查询超时: 超时视为存储不可用
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

async fn with_timeout<T, F>(what: &str, fut: F) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => {
            tracing::error!("✗ {} 超时 (>{:?})", what, QUERY_TIMEOUT);
            Err(StoreError::Unavailable(format!("{what} timed out")))
        }
    }
}

/// PostgreSQL 配送单存储
#[derive(Debug, Clone)]
pub struct PgDeliveryStore {
    pool: PgPool,
}

impl PgDeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeliveryStore for PgDeliveryStore {
    async fn list_pending(&self) -> Result<Vec<Delivery>, StoreError> {
        let rows = with_timeout("list_pending_deliveries", queries::list_pending_deliveries(&self.pool)).await?;
        Ok(rows.into_iter().map(Delivery::from).collect())
    }

    async fn get(&self, delivery_id: i64) -> Result<Option<Delivery>, StoreError> {
        let row = with_timeout("get_delivery", queries::get_delivery(&self.pool, delivery_id)).await?;
        Ok(row.map(Delivery::from))
    }

    async fn mark_reconciled(&self, delivery_id: i64) -> Result<bool, StoreError> {
        with_timeout(
            "mark_delivery_reconciled",
            queries::mark_delivery_reconciled(&self.pool, delivery_id),
        )
        .await
    }
}

/// PostgreSQL 门店配置来源
#[derive(Debug, Clone)]
pub struct PgStoreConfigSource {
    pool: PgPool,
}

impl PgStoreConfigSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreConfigSource for PgStoreConfigSource {
    async fn get_config(&self, store_id: i64) -> Result<StoreConfigLookup, StoreError> {
        let row = with_timeout("get_store_config", queries::get_store_config(&self.pool, store_id)).await?;
        Ok(match row {
            None => StoreConfigLookup::Missing,
            Some(row) => match StoreReconciliationConfig::try_from(row) {
                Ok(config) => StoreConfigLookup::Found(config),
                Err(e) => StoreConfigLookup::Invalid(e),
            },
        })
    }
}
