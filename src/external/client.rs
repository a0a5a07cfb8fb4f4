use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

use super::{ExternalError, RecordSource};
use crate::models::{ExternalInvoiceRecord, StoreReconciliationConfig};

/// where 子句 `(col,eq,value)~and(...)` 的分隔字符
const FILTER_RESERVED: &[char] = &[',', '(', ')', '~'];

/// 表格 API 分页响应
#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    list: Vec<ExternalInvoiceRecord>,
}

/// 外部发票表 HTTP 客户端
///
/// `GET {base_url}/api/v2/tables/{table_id}/records?where=(col,eq,value)`,
/// 鉴权头 `xc-token`。每次调用自带超时, 不做内部重试。
#[derive(Debug, Clone)]
pub struct HttpRecordClient {
    client: Client,
    timeout: Duration,
    page_limit: u32,
}

impl HttpRecordClient {
    pub fn new(timeout: Duration, page_limit: u32) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            timeout,
            page_limit,
        })
    }

    fn records_url(config: &StoreReconciliationConfig) -> String {
        format!(
            "{}/api/v2/tables/{}/records",
            config.base_url.trim_end_matches('/'),
            config.table_id
        )
    }

    async fn send(
        &self,
        config: &StoreReconciliationConfig,
        column: &str,
        value: &str,
    ) -> Result<Vec<ExternalInvoiceRecord>, ExternalError> {
        if value.contains(FILTER_RESERVED) {
            return Err(ExternalError::InvalidFilter(value.to_string()));
        }
        let filter = format!("({column},eq,{value})");
        let response = self
            .client
            .get(Self::records_url(config))
            .header("xc-token", &config.api_token)
            .query(&[("where", filter.as_str())])
            .query(&[("limit", self.page_limit)])
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                store_id = config.store_id,
                table_id = %config.table_id,
                status = status.as_u16(),
                "External table returned non-success status"
            );
            return Err(ExternalError::Status {
                status: status.as_u16(),
            });
        }

        let page: RecordPage = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ExternalError::Timeout(self.timeout)
            } else {
                ExternalError::Decode(e.to_string())
            }
        })?;
        Ok(page.list)
    }

    fn classify(&self, err: reqwest::Error) -> ExternalError {
        if err.is_timeout() {
            ExternalError::Timeout(self.timeout)
        } else {
            ExternalError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl RecordSource for HttpRecordClient {
    async fn fetch_by_column(
        &self,
        config: &StoreReconciliationConfig,
        column: &str,
        value: &str,
    ) -> Result<Vec<ExternalInvoiceRecord>, ExternalError> {
        let start = Instant::now();

        // 整体超时兜底 (连接 + 读取 + 解码)
        let result = match tokio::time::timeout(self.timeout, self.send(config, column, value)).await {
            Ok(result) => result,
            Err(_) => Err(ExternalError::Timeout(self.timeout)),
        };

        match &result {
            Ok(records) => tracing::debug!(
                store_id = config.store_id,
                column,
                candidates = records.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Fetched candidate records"
            ),
            Err(e) => tracing::warn!(
                store_id = config.store_id,
                column,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Candidate fetch failed: {}",
                e
            ),
        }
        result
    }
}
