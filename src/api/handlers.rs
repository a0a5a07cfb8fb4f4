use crate::error::ApiError;
use crate::models::{
    BulkItemResult, ExternalInvoiceRecord, MatchType, ReconciliationRun, VerificationKey,
    VerificationOutcome, VerificationRequest,
};
use crate::service::{runs, AuditEntry, CacheStats, CleanupReport, SchedulerStatus};
use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;

/// 单次批量校验的最大条数
const MAX_BULK_ITEMS: usize = 1000;

/// 手动触发响应体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub run_id: u64,
    pub processed_deliveries: usize,
    pub reconciled_deliveries: usize,
    pub errors: Vec<String>,
}

/// 批量校验请求体
#[derive(Debug, Deserialize)]
pub struct BulkVerifyRequest {
    pub deliveries: Vec<BulkDeliveryInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeliveryInput {
    pub id: i64,
    /// 门店ID
    pub group_id: i64,
    pub invoice_reference: Option<String>,
    pub supplier_name: Option<String>,
    pub bl_number: Option<String>,
    pub amount: Option<BigDecimal>,
    pub delivery_date: Option<NaiveDate>,
}

impl From<BulkDeliveryInput> for VerificationRequest {
    fn from(input: BulkDeliveryInput) -> Self {
        Self {
            delivery_id: input.id,
            store_id: input.group_id,
            invoice_reference: input.invoice_reference,
            supplier_name: input.supplier_name,
            bl_number: input.bl_number,
            amount: input.amount,
            delivery_date: input.delivery_date,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkVerifyItem {
    pub delivery_id: i64,
    pub exists: bool,
    pub match_type: MatchType,
    pub cache_hit: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkVerifyResponse {
    pub results: Vec<BulkVerifyItem>,
}

/// 单条校验响应体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    pub delivery_id: i64,
    pub store_id: i64,
    pub exists: bool,
    pub match_type: MatchType,
    pub matched_record: Option<ExternalInvoiceRecord>,
    pub verified_at: DateTime<Utc>,
    pub cache_hit: bool,
    pub supplier_mismatch: bool,
    pub candidates_seen: Option<usize>,
    pub error: Option<String>,
}

impl From<BulkItemResult> for VerificationResponse {
    fn from(item: BulkItemResult) -> Self {
        let (supplier_mismatch, candidates_seen) = match &item.result.outcome {
            VerificationOutcome::Matched {
                supplier_mismatch, ..
            } => (*supplier_mismatch, None),
            VerificationOutcome::NotFound { candidates_seen } => (false, Some(*candidates_seen)),
            _ => (false, None),
        };
        Self {
            delivery_id: item.key.delivery_id,
            store_id: item.key.store_id,
            exists: item.result.exists(),
            match_type: item.result.match_type(),
            matched_record: item.result.matched_record().cloned(),
            verified_at: item.result.verified_at,
            cache_hit: item.cache_hit,
            supplier_mismatch,
            candidates_seen,
            error: item.result.outcome.error_message().map(str::to_string),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreScope {
    pub store_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct Limit {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub invalidated: bool,
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 手动触发对账: 单项失败以错误摘要返回, 不视为 HTTP 失败
pub async fn trigger_reconciliation(State(state): State<AppState>) -> Result<Json<TriggerResponse>, ApiError> {
    let summary = state.scheduler.trigger().await?;
    Ok(Json(TriggerResponse {
        run_id: summary.run_id,
        processed_deliveries: summary.processed_deliveries,
        reconciled_deliveries: summary.reconciled_deliveries,
        errors: summary.errors,
    }))
}

pub async fn reconciliation_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status().await)
}

pub async fn start_service(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.start().await)
}

pub async fn stop_service(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.stop().await)
}

pub async fn list_runs(
    State(state): State<AppState>,
    Query(limit): Query<Limit>,
) -> Json<Vec<ReconciliationRun>> {
    let limit = limit.limit.unwrap_or(20);
    Json(state.scheduler.job().ledger().recent(limit).await)
}

/// 运行历史 CSV 导出
pub async fn export_runs(State(state): State<AppState>) -> Result<Response, ApiError> {
    let runs = state.scheduler.job().ledger().recent(usize::MAX).await;
    let body = runs::export_runs_csv(&runs).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"reconciliation_runs.csv\""),
        ],
        body,
    )
        .into_response())
}

/// 批量校验
pub async fn bulk_verify(
    State(state): State<AppState>,
    Json(req): Json<BulkVerifyRequest>,
) -> Result<Json<BulkVerifyResponse>, ApiError> {
    if req.deliveries.len() > MAX_BULK_ITEMS {
        return Err(ApiError::BadRequest(format!(
            "at most {} deliveries per request, got {}",
            MAX_BULK_ITEMS,
            req.deliveries.len()
        )));
    }

    let requests: Vec<VerificationRequest> = req.deliveries.into_iter().map(Into::into).collect();
    let results = state.verifier.verify_bulk(requests).await;
    Ok(Json(BulkVerifyResponse {
        results: results
            .into_iter()
            .map(|item| BulkVerifyItem {
                delivery_id: item.key.delivery_id,
                exists: item.result.exists(),
                match_type: item.result.match_type(),
                cache_hit: item.cache_hit,
            })
            .collect(),
    }))
}

/// 单条校验: 有缓存直接返回, 否则重新校验
pub async fn get_verification(
    State(state): State<AppState>,
    Path(delivery_id): Path<i64>,
) -> Result<Json<VerificationResponse>, ApiError> {
    let item = state
        .verifier
        .verify_delivery(state.deliveries.as_ref(), delivery_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("delivery {delivery_id}")))?;
    Ok(Json(item.into()))
}

/// 失效单条缓存 (配送单数据变化后调用)
pub async fn invalidate_verification(
    State(state): State<AppState>,
    Path(delivery_id): Path<i64>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    let delivery = state
        .deliveries
        .get(delivery_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("delivery {delivery_id}")))?;
    let key = VerificationKey::new(delivery.id, delivery.store_id);
    let invalidated = state.verifier.cache().invalidate(&key);
    state
        .audit
        .info("invalidate", Some(key.store_id), format!("{key}: invalidated={invalidated}"));
    Ok(Json(InvalidateResponse { invalidated }))
}

pub async fn cache_stats(
    State(state): State<AppState>,
    Query(scope): Query<StoreScope>,
) -> Json<CacheStats> {
    Json(state.verifier.cache().stats(scope.store_id))
}

pub async fn cleanup_cache(
    State(state): State<AppState>,
    Query(scope): Query<StoreScope>,
) -> Json<CleanupReport> {
    let report = state.verifier.cache().cleanup(scope.store_id);
    state.audit.info(
        "cache_cleanup",
        scope.store_id,
        format!("Removed {} expired entries", report.cleaned_count),
    );
    Json(report)
}

pub async fn recent_audit(
    State(state): State<AppState>,
    Query(limit): Query<Limit>,
) -> Json<Vec<AuditEntry>> {
    Json(state.audit.recent(limit.limit.unwrap_or(100)))
}
