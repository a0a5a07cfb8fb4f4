use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub reconciliation: ReconciliationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 同时处理的最大请求数
    pub max_in_flight: usize,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 连接串可能带密码
        let url = match self.url.split_once('@') {
            Some((_, host)) => format!("postgres://***@{host}"),
            None => self.url.clone(),
        };
        f.debug_struct("DatabaseConfig")
            .field("url", &url)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// 对账引擎参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// 定时对账间隔 (分钟)
    pub interval_minutes: u64,
    /// 启动时是否自动开启定时任务
    pub autostart: bool,
    /// 批量校验并发数 (外部 API 同时在途请求上限)
    pub concurrency: usize,
    /// 校验缓存全局 TTL (秒)
    pub cache_ttl_secs: u64,
    /// 外部表请求超时 (秒)
    pub request_timeout_secs: u64,
    /// 单次查询返回的最大候选数
    pub page_limit: u32,
    /// API 错误的调用方重试次数
    pub api_retries: u32,
    pub retry_backoff_ms: u64,
    /// 保留的运行记录条数
    pub run_history: usize,
    /// 审计日志内存保留条数
    pub audit_capacity: usize,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 20,
            autostart: true,
            concurrency: 5,
            cache_ttl_secs: 30 * 60,
            request_timeout_secs: 10,
            page_limit: 25,
            api_retries: 1,
            retry_backoff_ms: 500,
            run_history: 50,
            audit_capacity: 500,
        }
    }
}

impl ReconciliationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_in_flight: 256,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/store_ops".to_string(),
                max_connections: 20,
            },
            reconciliation: ReconciliationConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从环境变量加载配置
    ///
    /// 默认值 < `RECON_*` 变量 (例如 `RECON_RECONCILIATION__INTERVAL_MINUTES=5`)
    /// < 兼容旧部署的 `DATABASE_URL` / `SERVER_HOST` / `SERVER_PORT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(
            Environment::with_prefix("RECON")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
    }

    fn from_environment(env: Environment) -> Result<Self, ConfigError> {
        let defaults = Config::try_from(&AppConfig::default())?;
        let settings = Config::builder()
            .add_source(defaults)
            .add_source(env)
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option(
                "server.port",
                std::env::var("SERVER_PORT").ok().and_then(|p| p.parse::<i64>().ok()),
            )?
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.reconciliation;
        if r.interval_minutes == 0 {
            return Err(ConfigError::Invalid("interval_minutes must be > 0".into()));
        }
        if r.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be > 0".into()));
        }
        if r.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache_ttl_secs must be > 0".into()));
        }
        if r.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_environment(
            Environment::with_prefix("RECON")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(source)),
        )
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.reconciliation.interval_minutes, 20);
        assert_eq!(config.reconciliation.concurrency, 5);
        assert_eq!(config.reconciliation.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_env_overrides() {
        let config = load(&[
            ("RECON_RECONCILIATION__INTERVAL_MINUTES", "5"),
            ("RECON_RECONCILIATION__AUTOSTART", "false"),
        ])
        .unwrap();
        assert_eq!(config.reconciliation.interval(), Duration::from_secs(300));
        assert!(!config.reconciliation.autostart);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = load(&[("RECON_RECONCILIATION__CONCURRENCY", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_debug_hides_database_password() {
        let db = DatabaseConfig {
            url: "postgres://app:hunter2@db:5432/ops".into(),
            max_connections: 5,
        };
        assert!(!format!("{db:?}").contains("hunter2"));
    }
}
