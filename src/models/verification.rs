use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::delivery::DeliverySnapshot;
use super::record::ExternalInvoiceRecord;

/// 缓存与批量请求的寻址单元: (配送单ID, 门店ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VerificationKey {
    pub delivery_id: i64,
    pub store_id: i64,
}

impl VerificationKey {
    pub fn new(delivery_id: i64, store_id: i64) -> Self {
        Self { delivery_id, store_id }
    }
}

impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.delivery_id, self.store_id)
    }
}

/// 命中的匹配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStrategy {
    InvoiceRef,
    BlNumber,
    SupplierAmount,
    SupplierDate,
}

/// 对外暴露的匹配类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    InvoiceRef,
    BlNumber,
    SupplierAmount,
    SupplierDate,
    None,
    ConfigError,
    ApiError,
    SystemError,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::InvoiceRef => "INVOICE_REF",
            MatchType::BlNumber => "BL_NUMBER",
            MatchType::SupplierAmount => "SUPPLIER_AMOUNT",
            MatchType::SupplierDate => "SUPPLIER_DATE",
            MatchType::None => "NONE",
            MatchType::ConfigError => "CONFIG_ERROR",
            MatchType::ApiError => "API_ERROR",
            MatchType::SystemError => "SYSTEM_ERROR",
        }
    }
}

impl From<MatchStrategy> for MatchType {
    fn from(strategy: MatchStrategy) -> Self {
        match strategy {
            MatchStrategy::InvoiceRef => MatchType::InvoiceRef,
            MatchStrategy::BlNumber => MatchType::BlNumber,
            MatchStrategy::SupplierAmount => MatchType::SupplierAmount,
            MatchStrategy::SupplierDate => MatchType::SupplierDate,
        }
    }
}

/// 校验结论: 每种结果携带各自的数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Matched {
        strategy: MatchStrategy,
        record: ExternalInvoiceRecord,
        /// 发票号命中但供应商不一致 (仅告警, 不影响 exists)
        supplier_mismatch: bool,
        /// 同一策略下命中多条候选, 取了第一条
        ambiguous: bool,
    },
    NotFound {
        /// 0 表示外部表没有返回任何候选
        candidates_seen: usize,
    },
    ConfigError {
        message: String,
    },
    ApiError {
        message: String,
        status: Option<u16>,
    },
    SystemError {
        message: String,
    },
}

impl VerificationOutcome {
    pub fn match_type(&self) -> MatchType {
        match self {
            VerificationOutcome::Matched { strategy, .. } => (*strategy).into(),
            VerificationOutcome::NotFound { .. } => MatchType::None,
            VerificationOutcome::ConfigError { .. } => MatchType::ConfigError,
            VerificationOutcome::ApiError { .. } => MatchType::ApiError,
            VerificationOutcome::SystemError { .. } => MatchType::SystemError,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            VerificationOutcome::ConfigError { .. }
                | VerificationOutcome::ApiError { .. }
                | VerificationOutcome::SystemError { .. }
        )
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            VerificationOutcome::ConfigError { message }
            | VerificationOutcome::ApiError { message, .. }
            | VerificationOutcome::SystemError { message } => Some(message),
            _ => None,
        }
    }
}

/// 校验结果: 一经计算即不可变, 数据变化需失效后重算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub outcome: VerificationOutcome,
    pub verified_at: DateTime<Utc>,
}

impl VerificationResult {
    pub fn new(outcome: VerificationOutcome, verified_at: DateTime<Utc>) -> Self {
        Self { outcome, verified_at }
    }

    pub fn exists(&self) -> bool {
        matches!(self.outcome, VerificationOutcome::Matched { .. })
    }

    pub fn match_type(&self) -> MatchType {
        self.outcome.match_type()
    }

    pub fn matched_record(&self) -> Option<&ExternalInvoiceRecord> {
        match &self.outcome {
            VerificationOutcome::Matched { record, .. } => Some(record),
            _ => None,
        }
    }

    /// 只有确定性的结论才允许缓存; 错误结果下次重新请求
    pub fn is_cacheable(&self) -> bool {
        !self.outcome.is_error()
    }
}

/// 单条校验请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub delivery_id: i64,
    pub store_id: i64,
    pub invoice_reference: Option<String>,
    pub supplier_name: Option<String>,
    pub bl_number: Option<String>,
    pub amount: Option<BigDecimal>,
    pub delivery_date: Option<NaiveDate>,
}

impl VerificationRequest {
    pub fn key(&self) -> VerificationKey {
        VerificationKey::new(self.delivery_id, self.store_id)
    }

    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            supplier_name: self.supplier_name.clone(),
            invoice_reference: self.invoice_reference.clone(),
            bl_number: self.bl_number.clone(),
            amount: self.amount.clone(),
            scheduled_date: self.delivery_date,
        }
    }
}

impl From<&super::delivery::Delivery> for VerificationRequest {
    fn from(d: &super::delivery::Delivery) -> Self {
        Self {
            delivery_id: d.id,
            store_id: d.store_id,
            invoice_reference: d.invoice_reference.clone(),
            supplier_name: d.supplier_name.clone(),
            bl_number: d.bl_number.clone(),
            amount: d.amount.clone(),
            delivery_date: d.scheduled_date,
        }
    }
}

/// 批量校验的单项结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkItemResult {
    pub key: VerificationKey,
    pub result: VerificationResult,
    pub cache_hit: bool,
}
