use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::ConfigError;

/// 外部表列名映射
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub invoice_ref: String,
    pub bl_number: String,
    pub amount: String,
    pub supplier: String,
    /// 可选: 日期列, 未配置时跳过 供应商+日期 策略
    pub date: Option<String>,
}

/// 门店对账配置表 (store_reconciliation_configs)
#[derive(Debug, Clone, FromRow)]
pub struct StoreConfigRow {
    pub store_id: i64,
    pub table_id: Option<String>,
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub invoice_ref_column: Option<String>,
    pub bl_number_column: Option<String>,
    pub amount_column: Option<String>,
    pub supplier_column: Option<String>,
    pub date_column: Option<String>,
}

/// 门店对账配置 (外部拥有, 此处只读)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreReconciliationConfig {
    pub store_id: i64,
    pub table_id: String,
    pub base_url: String,
    pub api_token: String,
    pub columns: ColumnMapping,
}

impl std::fmt::Debug for StoreReconciliationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreReconciliationConfig")
            .field("store_id", &self.store_id)
            .field("table_id", &self.table_id)
            .field("base_url", &self.base_url)
            .field("api_token", &"<redacted>")
            .field("columns", &self.columns)
            .finish()
    }
}

impl StoreReconciliationConfig {
    /// 校验必填字段: 缺失即为配置错误, 而非匹配失败
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("base_url", &self.base_url),
            ("table_id", &self.table_id),
            ("api_token", &self.api_token),
            ("invoice_ref column", &self.columns.invoice_ref),
            ("bl_number column", &self.columns.bl_number),
            ("amount column", &self.columns.amount),
            ("supplier column", &self.columns.supplier),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::StoreConfigInvalid {
                    store_id: self.store_id,
                    reason: format!("{name} is empty"),
                });
            }
        }
        Ok(())
    }
}

impl TryFrom<StoreConfigRow> for StoreReconciliationConfig {
    type Error = ConfigError;

    fn try_from(row: StoreConfigRow) -> Result<Self, Self::Error> {
        let store_id = row.store_id;
        let take = |value: Option<String>, name: &str| {
            value.ok_or_else(|| ConfigError::StoreConfigInvalid {
                store_id,
                reason: format!("{name} is null"),
            })
        };

        let config = Self {
            store_id,
            table_id: take(row.table_id, "table_id")?,
            base_url: take(row.base_url, "base_url")?,
            api_token: take(row.api_token, "api_token")?,
            columns: ColumnMapping {
                invoice_ref: take(row.invoice_ref_column, "invoice_ref_column")?,
                bl_number: take(row.bl_number_column, "bl_number_column")?,
                amount: take(row.amount_column, "amount_column")?,
                supplier: take(row.supplier_column, "supplier_column")?,
                date: row.date_column.filter(|c| !c.trim().is_empty()),
            },
        };
        config.validate()?;
        Ok(config)
    }
}
