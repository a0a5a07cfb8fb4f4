use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// 配置错误 (启动配置与门店对账配置)
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("store {0} has no reconciliation config")]
    StoreConfigMissing(i64),

    #[error("store {store_id} reconciliation config is invalid: {reason}")]
    StoreConfigInvalid { store_id: i64, reason: String },

    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// 外部协作方存储 (配送单 / 门店配置) 的错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// 对账任务错误
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("a reconciliation run is already in progress")]
    AlreadyRunning,

    #[error("failed to load pending deliveries: {0}")]
    DeliveryStore(#[from] StoreError),

    #[error("reconciliation run aborted: {0}")]
    Aborted(String),
}

/// HTTP 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// HTTP 接口错误
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Job(JobError::AlreadyRunning) => (StatusCode::CONFLICT, "run_in_progress"),
            ApiError::Job(JobError::DeliveryStore(_)) | ApiError::Store(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            ApiError::Job(JobError::Aborted(_)) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("API error: {}", self);
        }
        let body = ErrorResponse {
            code: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
