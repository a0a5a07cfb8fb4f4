//! 外部发票表访问
//!
//! 每个门店在自己的外部表 (NocoDB 风格的表格 API) 中维护发票记录,
//! 通过门店配置中的列名映射来读取。

pub mod client;

use async_trait::async_trait;

use crate::models::{ExternalInvoiceRecord, StoreReconciliationConfig};

pub use client::HttpRecordClient;

/// 外部表调用错误, 统一归类为 API_ERROR
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("external table returned HTTP {status}")]
    Status { status: u16 },

    #[error("failed to decode response: {0}")]
    Decode(String),

    /// 过滤值含有表格 API where 语法的保留字符, 无法构造精确匹配
    #[error("filter value {0:?} contains reserved characters")]
    InvalidFilter(String),
}

impl ExternalError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ExternalError::Status { status } => Some(*status),
            _ => None,
        }
    }

    /// 重试无法改变结果的错误返回 false
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExternalError::InvalidFilter(_))
    }
}

/// 候选发票记录来源
///
/// 实现方不做重试, 重试策略由批量校验调用方决定。
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// 按列精确过滤 (区分大小写) 查询候选记录
    async fn fetch_by_column(
        &self,
        config: &StoreReconciliationConfig,
        column: &str,
        value: &str,
    ) -> Result<Vec<ExternalInvoiceRecord>, ExternalError>;

    /// 按发票号列查询候选记录
    async fn fetch_candidates(
        &self,
        config: &StoreReconciliationConfig,
        invoice_ref: &str,
    ) -> Result<Vec<ExternalInvoiceRecord>, ExternalError> {
        self.fetch_by_column(config, &config.columns.invoice_ref, invoice_ref)
            .await
    }
}
