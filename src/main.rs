use bl_reconcile::{
    api::{self, AppState},
    clock::{Clock, SystemClock},
    create_pool,
    db::{PgDeliveryStore, PgStoreConfigSource},
    service::{AuditLogger, BulkSettings, RunLedger},
    AppConfig, BulkVerifier, HttpRecordClient, ReconciliationJob, ReconciliationScheduler,
    VerificationCache,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 使用本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env()?;
    info!("Starting server with config: {:?}", config);
    let recon = &config.reconciliation;

    // 创建数据库连接池 (外部协作方: 配送单 + 门店配置)
    let pool = create_pool(&config.database.url, config.database.max_connections)?;
    info!("Database pool created");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let audit = Arc::new(AuditLogger::with_clock(recon.audit_capacity, clock.clone()));
    let deliveries = Arc::new(PgDeliveryStore::new(pool.clone()));
    let store_configs = Arc::new(PgStoreConfigSource::new(pool));
    let records = Arc::new(HttpRecordClient::new(recon.request_timeout(), recon.page_limit)?);
    let cache = Arc::new(VerificationCache::with_clock(recon.cache_ttl(), clock.clone()));

    // 组装对账引擎
    let verifier = BulkVerifier::new(
        cache,
        records,
        store_configs,
        audit.clone(),
        clock.clone(),
        BulkSettings {
            concurrency: recon.concurrency,
            api_retries: recon.api_retries,
            retry_backoff: recon.retry_backoff(),
        },
    );
    let job = Arc::new(ReconciliationJob::new(
        deliveries.clone(),
        verifier.clone(),
        Arc::new(RunLedger::new(recon.run_history)),
        audit.clone(),
        clock.clone(),
    ));
    let scheduler = Arc::new(ReconciliationScheduler::new(job, recon.interval(), clock));

    if recon.autostart {
        scheduler.start().await;
    }

    let state = AppState {
        scheduler: scheduler.clone(),
        verifier,
        deliveries,
        audit,
    };
    let app = api::router(state).layer(ServiceBuilder::new().concurrency_limit(config.server.max_in_flight));

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST   /api/reconciliation/trigger     - manual reconciliation run");
    info!("  GET    /api/reconciliation/status      - scheduler status");
    info!("  POST   /api/verification/bulk          - bulk verification");
    info!("  GET    /api/verification/:delivery_id  - single verification");
    info!("  DELETE /api/verification/cache         - cache cleanup");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    scheduler.stop().await;
    Ok(())
}
