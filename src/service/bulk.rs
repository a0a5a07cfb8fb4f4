use futures::stream::{self, StreamExt};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::audit::{AuditLevel, AuditLogger};
use super::cache::VerificationCache;
use super::resolver;
use crate::clock::Clock;
use crate::db::{DeliveryStore, StoreConfigLookup, StoreConfigSource};
use crate::error::{ConfigError, StoreError};
use crate::external::{ExternalError, RecordSource};
use crate::models::{
    BulkItemResult, ExternalInvoiceRecord, StoreReconciliationConfig, VerificationKey,
    VerificationOutcome, VerificationRequest, VerificationResult,
};

/// 门店配置解析结果: 失败时为最终的错误结论
type ConfigState = Result<Arc<StoreReconciliationConfig>, VerificationOutcome>;

/// 批量校验参数
#[derive(Debug, Clone)]
pub struct BulkSettings {
    /// worker 数量, 即外部 API 同时在途请求上限
    pub concurrency: usize,
    /// API 错误的重试次数 (配置错误不重试)
    pub api_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            api_retries: 1,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// 批量校验编排: 先查缓存, 未命中再拉取候选 + 级联匹配 + 写缓存
///
/// 单项失败不会中断整批, 输出与输入一一对应 (按输入顺序)。
#[derive(Clone)]
pub struct BulkVerifier {
    cache: Arc<VerificationCache>,
    records: Arc<dyn RecordSource>,
    configs: Arc<dyn StoreConfigSource>,
    audit: Arc<AuditLogger>,
    clock: Arc<dyn Clock>,
    settings: BulkSettings,
}

impl BulkVerifier {
    pub fn new(
        cache: Arc<VerificationCache>,
        records: Arc<dyn RecordSource>,
        configs: Arc<dyn StoreConfigSource>,
        audit: Arc<AuditLogger>,
        clock: Arc<dyn Clock>,
        settings: BulkSettings,
    ) -> Self {
        Self {
            cache,
            records,
            configs,
            audit,
            clock,
            settings,
        }
    }

    pub fn cache(&self) -> &Arc<VerificationCache> {
        &self.cache
    }

    pub fn settings(&self) -> &BulkSettings {
        &self.settings
    }

    /// 批量校验入口
    pub async fn verify_bulk(&self, requests: Vec<VerificationRequest>) -> Vec<BulkItemResult> {
        let start = Instant::now();
        let total = requests.len();
        let mut slots: Vec<Option<BulkItemResult>> = vec![None; total];

        // Phase 1: 缓存查找 (内存操作, 不挂起); 同一键在批内只校验一次
        let mut misses: IndexMap<VerificationKey, (VerificationRequest, Vec<usize>)> = IndexMap::new();
        let mut cache_hits = 0;
        for (idx, req) in requests.into_iter().enumerate() {
            let key = req.key();
            if let Some((_, waiting)) = misses.get_mut(&key) {
                waiting.push(idx);
                continue;
            }
            match self.cache.get(&key) {
                Some(result) => {
                    cache_hits += 1;
                    slots[idx] = Some(BulkItemResult {
                        key,
                        result,
                        cache_hit: true,
                    });
                }
                None => {
                    misses.insert(key, (req, vec![idx]));
                }
            }
        }

        // Phase 2: 每个门店只解析一次配置
        let store_ids: IndexSet<i64> = misses.keys().map(|key| key.store_id).collect();
        let mut configs: HashMap<i64, ConfigState> = HashMap::with_capacity(store_ids.len());
        for store_id in store_ids {
            configs.insert(store_id, self.load_config(store_id).await);
        }

        // Phase 3: 有界并发拉取 + 匹配
        let concurrency = self.settings.concurrency.max(1);
        let fetched: Vec<(Vec<usize>, BulkItemResult)> = stream::iter(misses.into_values())
            .map(|(req, waiting)| {
                let worker = self.clone();
                let config = configs
                    .get(&req.store_id)
                    .cloned()
                    .unwrap_or_else(|| Err(VerificationOutcome::SystemError {
                        message: format!("config for store {} was not resolved", req.store_id),
                    }));
                async move {
                    let key = req.key();
                    let store_id = req.store_id;
                    // 在独立任务中执行, panic 在此边界被捕获为 SYSTEM_ERROR
                    let result = match tokio::spawn(async move { worker.verify_miss(req, config).await }).await {
                        Ok(result) => result,
                        Err(e) => {
                            let message = format!("verification task failed: {e}");
                            self.audit.error("verify", Some(store_id), format!("{key}: {message}"));
                            VerificationResult::new(VerificationOutcome::SystemError { message }, self.clock.now())
                        }
                    };
                    (
                        waiting,
                        BulkItemResult {
                            key,
                            result,
                            cache_hit: false,
                        },
                    )
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (waiting, item) in fetched {
            for idx in waiting {
                slots[idx] = Some(item.clone());
            }
        }

        let results: Vec<BulkItemResult> = slots.into_iter().flatten().collect();
        let errors = results.iter().filter(|r| r.result.outcome.is_error()).count();
        let matched = results.iter().filter(|r| r.result.exists()).count();
        self.audit.timed(
            AuditLevel::Info,
            "verify_bulk",
            None,
            format!(
                "Verified {} deliveries: {} cache hits, {} matched, {} errors",
                total, cache_hits, matched, errors
            ),
            start.elapsed(),
        );
        results
    }

    /// 单条校验 (同样先查缓存)
    pub async fn verify_one(&self, request: VerificationRequest) -> BulkItemResult {
        let key = request.key();
        self.verify_bulk(vec![request])
            .await
            .pop()
            .unwrap_or_else(|| BulkItemResult {
                key,
                result: VerificationResult::new(
                    VerificationOutcome::SystemError {
                        message: "verification produced no result".into(),
                    },
                    self.clock.now(),
                ),
                cache_hit: false,
            })
    }

    /// 按配送单ID校验: 读取配送单后走缓存/重新校验; 配送单不存在返回 None
    pub async fn verify_delivery(
        &self,
        deliveries: &dyn DeliveryStore,
        delivery_id: i64,
    ) -> Result<Option<BulkItemResult>, StoreError> {
        let Some(delivery) = deliveries.get(delivery_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.verify_one(VerificationRequest::from(&delivery)).await))
    }

    async fn load_config(&self, store_id: i64) -> ConfigState {
        match self.configs.get_config(store_id).await {
            Ok(StoreConfigLookup::Found(config)) => Ok(Arc::new(config)),
            Ok(StoreConfigLookup::Missing) => {
                let err = ConfigError::StoreConfigMissing(store_id);
                self.audit.error("load_store_config", Some(store_id), err.to_string());
                Err(VerificationOutcome::ConfigError {
                    message: err.to_string(),
                })
            }
            Ok(StoreConfigLookup::Invalid(err)) => {
                self.audit.error("load_store_config", Some(store_id), err.to_string());
                Err(VerificationOutcome::ConfigError {
                    message: err.to_string(),
                })
            }
            Err(err) => {
                self.audit.error("load_store_config", Some(store_id), err.to_string());
                Err(VerificationOutcome::SystemError {
                    message: err.to_string(),
                })
            }
        }
    }

    async fn verify_miss(&self, req: VerificationRequest, config: ConfigState) -> VerificationResult {
        let key = req.key();
        let outcome = match config {
            Err(outcome) => outcome,
            Ok(config) => match self.fetch_with_retry(&req, &config).await {
                Err(err) => VerificationOutcome::ApiError {
                    message: err.to_string(),
                    status: err.status(),
                },
                Ok(candidates) => {
                    let outcome = resolver::resolve(&req.snapshot(), &candidates, &config.columns);
                    self.audit_outcome(&req, &outcome);
                    outcome
                }
            },
        };

        let result = VerificationResult::new(outcome, self.clock.now());
        if result.is_cacheable() {
            self.cache.put(key, result.clone());
        }
        result
    }

    /// 按发票号查询; 无发票号时按 BL 号查询; 都没有则不发请求
    async fn fetch_with_retry(
        &self,
        req: &VerificationRequest,
        config: &StoreReconciliationConfig,
    ) -> Result<Vec<ExternalInvoiceRecord>, ExternalError> {
        let invoice_ref = req.invoice_reference.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let bl_number = req.bl_number.as_deref().map(str::trim).filter(|s| !s.is_empty());
        if invoice_ref.is_none() && bl_number.is_none() {
            self.audit.debug(
                "fetch_candidates",
                Some(req.store_id),
                format!("{}: no invoice reference or BL number, skipping lookup", req.key()),
            );
            return Ok(Vec::new());
        }

        let mut attempt = 0;
        loop {
            let start = Instant::now();
            let fetched = match invoice_ref {
                Some(invoice_ref) => self.records.fetch_candidates(config, invoice_ref).await,
                None => {
                    self.records
                        .fetch_by_column(config, &config.columns.bl_number, bl_number.unwrap_or_default())
                        .await
                }
            };
            match fetched {
                Ok(records) => {
                    self.audit.timed(
                        AuditLevel::Debug,
                        "fetch_candidates",
                        Some(req.store_id),
                        format!("{}: {} candidates", req.key(), records.len()),
                        start.elapsed(),
                    );
                    return Ok(records);
                }
                Err(err) => {
                    self.audit.timed(
                        AuditLevel::Warn,
                        "fetch_candidates",
                        Some(req.store_id),
                        format!("{}: attempt {} failed: {}", req.key(), attempt + 1, err),
                        start.elapsed(),
                    );
                    if attempt >= self.settings.api_retries || !err.is_retryable() {
                        return Err(err);
                    }
                    attempt += 1;
                    tokio::time::sleep(self.settings.retry_backoff).await;
                }
            }
        }
    }

    fn audit_outcome(&self, req: &VerificationRequest, outcome: &VerificationOutcome) {
        let key = req.key();
        match outcome {
            VerificationOutcome::NotFound { candidates_seen: 0 } => {
                self.audit.info("resolve", Some(req.store_id), format!("{key}: no candidates"));
            }
            VerificationOutcome::NotFound { candidates_seen } => {
                self.audit.info(
                    "resolve",
                    Some(req.store_id),
                    format!("{key}: {candidates_seen} candidates, none matched"),
                );
            }
            VerificationOutcome::Matched {
                strategy,
                supplier_mismatch,
                ambiguous,
                ..
            } => {
                self.audit.debug("resolve", Some(req.store_id), format!("{key}: matched by {strategy:?}"));
                if *supplier_mismatch {
                    self.audit.warn(
                        "supplier_mismatch",
                        Some(req.store_id),
                        format!(
                            "{key}: invoice reference matched but supplier {:?} differs",
                            req.supplier_name.as_deref().unwrap_or_default()
                        ),
                    );
                }
                if *ambiguous {
                    self.audit.warn(
                        "ambiguous_match",
                        Some(req.store_id),
                        format!("{key}: several candidates matched by {strategy:?}, using the first"),
                    );
                }
            }
            _ => {}
        }
    }
}
