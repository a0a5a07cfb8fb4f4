use indexmap::IndexMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use super::audit::{AuditLevel, AuditLogger};
use super::bulk::BulkVerifier;
use super::runs::RunLedger;
use crate::clock::Clock;
use crate::db::DeliveryStore;
use crate::error::JobError;
use crate::models::{
    Delivery, ReconciliationRun, RunStatus, RunSummary, RunTrigger, VerificationRequest,
};

/// 对账任务: 拉取待对账配送单 -> 批量校验 -> 串行回写状态 -> 记录运行
///
/// 同一进程内同时最多一个运行; 运行中再次触发直接拒绝。
pub struct ReconciliationJob {
    deliveries: Arc<dyn DeliveryStore>,
    verifier: BulkVerifier,
    ledger: Arc<RunLedger>,
    audit: Arc<AuditLogger>,
    clock: Arc<dyn Clock>,
    run_lock: Mutex<()>,
}

impl ReconciliationJob {
    pub fn new(
        deliveries: Arc<dyn DeliveryStore>,
        verifier: BulkVerifier,
        ledger: Arc<RunLedger>,
        audit: Arc<AuditLogger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            deliveries,
            verifier,
            ledger,
            audit,
            clock,
            run_lock: Mutex::new(()),
        }
    }

    pub fn ledger(&self) -> &Arc<RunLedger> {
        &self.ledger
    }

    pub async fn is_running(&self) -> bool {
        self.ledger.current().await.is_some()
    }

    /// 执行一次对账
    pub async fn run(&self, trigger: RunTrigger) -> Result<RunSummary, JobError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            self.audit.warn(
                "reconcile",
                None,
                format!("{trigger:?} trigger ignored: a run is already in progress"),
            );
            return Err(JobError::AlreadyRunning);
        };

        let start = Instant::now();
        let mut run = ReconciliationRun::start(self.ledger.next_id(), trigger, self.clock.now());
        self.ledger.begin(run.clone()).await;
        let mut unfinished = UnfinishedRun {
            ledger: Arc::clone(&self.ledger),
            clock: Arc::clone(&self.clock),
            run: Some(run.clone()),
        };
        self.audit.info("reconcile", None, format!("Run {} started ({trigger:?})", run.id));

        // Phase 1: 拉取待对账配送单
        let pending = match self.deliveries.list_pending().await {
            Ok(pending) => pending,
            Err(e) => {
                run.status = RunStatus::Failed;
                run.errors.push(format!("failed to load pending deliveries: {e}"));
                run.error_count = run.errors.len();
                run.ended_at = Some(self.clock.now());
                self.ledger.finish(run.clone()).await;
                unfinished.disarm();
                self.audit.timed(
                    AuditLevel::Error,
                    "reconcile",
                    None,
                    format!("Run {} failed: {}", run.id, e),
                    start.elapsed(),
                );
                return Err(JobError::DeliveryStore(e));
            }
        };

        // Phase 2: 按门店分组构建校验请求
        let mut by_store: IndexMap<i64, Vec<Delivery>> = IndexMap::new();
        for delivery in pending {
            by_store.entry(delivery.store_id).or_default().push(delivery);
        }
        let mut requests = Vec::new();
        for (store_id, group) in &by_store {
            self.audit.info(
                "reconcile",
                Some(*store_id),
                format!("{} deliveries awaiting reconciliation", group.len()),
            );
            requests.extend(group.iter().map(VerificationRequest::from));
        }

        // Phase 3: 批量校验
        let results = self.verifier.verify_bulk(requests).await;
        run.processed_count = results.len();
        unfinished.update(&run);

        // Phase 4: 串行回写, 避免同一配送单并发写
        for item in &results {
            let key = item.key;
            if item.result.exists() {
                match self.deliveries.mark_reconciled(key.delivery_id).await {
                    Ok(true) => {
                        run.reconciled_count += 1;
                        // 状态已变化, 缓存结果不再代表当前数据
                        self.verifier.cache().invalidate(&key);
                        self.audit.info(
                            "mark_reconciled",
                            Some(key.store_id),
                            format!("Delivery {} reconciled ({})", key.delivery_id, item.result.match_type().as_str()),
                        );
                    }
                    Ok(false) => {
                        self.verifier.cache().invalidate(&key);
                        self.audit.debug(
                            "mark_reconciled",
                            Some(key.store_id),
                            format!("Delivery {} was no longer pending", key.delivery_id),
                        );
                    }
                    Err(e) => {
                        let message = format!("{key}: failed to mark reconciled: {e}");
                        self.audit.error("mark_reconciled", Some(key.store_id), message.clone());
                        run.errors.push(message);
                    }
                }
            } else if let Some(message) = item.result.outcome.error_message() {
                run.errors.push(format!(
                    "{key}: {}: {}",
                    item.result.match_type().as_str(),
                    message
                ));
            }
            unfinished.update(&run);
        }

        // Phase 5: 定稿
        run.error_count = run.errors.len();
        run.status = RunStatus::Completed;
        run.ended_at = Some(self.clock.now());
        self.ledger.finish(run.clone()).await;
        unfinished.disarm();

        let level = if run.error_count > 0 {
            AuditLevel::Warn
        } else {
            AuditLevel::Info
        };
        self.audit.timed(
            level,
            "reconcile",
            None,
            format!(
                "Run {} finished: processed {}, reconciled {}, errors {}",
                run.id, run.processed_count, run.reconciled_count, run.error_count
            ),
            start.elapsed(),
        );

        Ok(RunSummary::from(&run))
    }
}

/// 未定稿的运行
///
/// 运行 future 在定稿前被丢弃时, 以最后登记的进度将其记为失败并移入历史,
/// 避免运行记录一直停留在进行中。
struct UnfinishedRun {
    ledger: Arc<RunLedger>,
    clock: Arc<dyn Clock>,
    run: Option<ReconciliationRun>,
}

impl UnfinishedRun {
    fn update(&mut self, run: &ReconciliationRun) {
        if let Some(snapshot) = self.run.as_mut() {
            snapshot.clone_from(run);
        }
    }

    fn disarm(&mut self) {
        self.run = None;
    }
}

impl Drop for UnfinishedRun {
    fn drop(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        tracing::error!("Reconciliation run {} interrupted before completion", run.id);
        let ledger = Arc::clone(&self.ledger);
        let ended_at = self.clock.now();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    ledger
                        .abandon(run, ended_at, "run interrupted before completion")
                        .await;
                });
            }
            Err(_) => tracing::error!("No runtime available to record interrupted run {}", run.id),
        }
    }
}
