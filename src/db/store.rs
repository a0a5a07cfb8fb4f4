use async_trait::async_trait;

use crate::error::{ConfigError, StoreError};
use crate::models::{Delivery, StoreReconciliationConfig};

/// 配送单持久层 (外部协作方)
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// 所有待对账的配送单
    async fn list_pending(&self) -> Result<Vec<Delivery>, StoreError>;

    async fn get(&self, delivery_id: i64) -> Result<Option<Delivery>, StoreError>;

    /// 标记为已对账; 返回是否确实发生了状态变化
    async fn mark_reconciled(&self, delivery_id: i64) -> Result<bool, StoreError>;
}

/// 门店配置查询结果
#[derive(Debug)]
pub enum StoreConfigLookup {
    Found(StoreReconciliationConfig),
    Invalid(ConfigError),
    Missing,
}

/// 门店对账配置来源 (外部协作方)
#[async_trait]
pub trait StoreConfigSource: Send + Sync {
    async fn get_config(&self, store_id: i64) -> Result<StoreConfigLookup, StoreError>;
}
