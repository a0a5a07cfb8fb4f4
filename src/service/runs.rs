use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::models::{ReconciliationRun, RunStatus};

/// 对账运行记录簿: 当前运行 + 有界历史
#[derive(Debug)]
pub struct RunLedger {
    next_id: AtomicU64,
    capacity: usize,
    current: RwLock<Option<ReconciliationRun>>,
    history: RwLock<VecDeque<ReconciliationRun>>,
}

impl RunLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            current: RwLock::new(None),
            history: RwLock::new(VecDeque::new()),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// 登记开始的运行 (调用方已持有运行锁)
    pub async fn begin(&self, run: ReconciliationRun) {
        *self.current.write().await = Some(run);
    }

    /// 定稿并移入历史
    pub async fn finish(&self, run: ReconciliationRun) {
        debug_assert_ne!(run.status, RunStatus::Running);
        {
            let mut current = self.current.write().await;
            if current.as_ref().is_some_and(|c| c.id == run.id) {
                current.take();
            }
        }
        let mut history = self.history.write().await;
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(run);
    }

    /// 运行在定稿前中断: 以最后登记的状态标记为失败并移入历史
    pub async fn abandon(&self, mut run: ReconciliationRun, ended_at: DateTime<Utc>, reason: &str) {
        run.status = RunStatus::Failed;
        run.ended_at = Some(ended_at);
        run.errors.push(reason.to_string());
        run.error_count = run.errors.len();
        self.finish(run).await;
    }

    pub async fn current(&self) -> Option<ReconciliationRun> {
        self.current.read().await.clone()
    }

    /// 最近的运行, 新的在前
    pub async fn recent(&self, limit: usize) -> Vec<ReconciliationRun> {
        self.history
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn last(&self) -> Option<ReconciliationRun> {
        self.history.read().await.back().cloned()
    }
}

/// 将运行历史导出为 CSV
pub fn export_runs_csv(runs: &[ReconciliationRun]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "id",
        "trigger",
        "status",
        "started_at",
        "ended_at",
        "processed",
        "reconciled",
        "errors",
        "error_messages",
    ])?;

    for run in runs {
        let trigger = match run.trigger {
            crate::models::RunTrigger::Scheduled => "scheduled",
            crate::models::RunTrigger::Manual => "manual",
        };
        let status = match run.status {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        writer.write_record([
            run.id.to_string(),
            trigger.to_string(),
            status.to_string(),
            run.started_at.to_rfc3339(),
            run.ended_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            run.processed_count.to_string(),
            run.reconciled_count.to_string(),
            run.error_count.to_string(),
            run.errors.join(" | "),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}
