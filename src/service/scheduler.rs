//! 定时对账调度
//!
//! 显式构造、可注入的服务, 提供 start / stop / status 生命周期;
//! 停止不会中断正在执行的运行。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::job::ReconciliationJob;
use crate::clock::Clock;
use crate::error::JobError;
use crate::models::{RunSummary, RunTrigger};

/// 调度状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub active: bool,
    /// 下一次定时触发时间 (按配置的间隔推算), 停止时为空
    pub next_run: Option<DateTime<Utc>>,
    pub interval_minutes: u64,
}

struct Timer {
    anchor: DateTime<Utc>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ReconciliationScheduler {
    job: Arc<ReconciliationJob>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    timer: Mutex<Option<Timer>>,
}

impl ReconciliationScheduler {
    pub fn new(job: Arc<ReconciliationJob>, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            job,
            interval: interval.max(Duration::from_millis(1)),
            clock,
            timer: Mutex::new(None),
        }
    }

    pub fn job(&self) -> &Arc<ReconciliationJob> {
        &self.job
    }

    /// 启动定时器; 已启动时只记录日志
    pub async fn start(&self) -> SchedulerStatus {
        let mut timer = self.timer.lock().await;
        if timer.as_ref().is_some_and(|t| !t.task.is_finished()) {
            tracing::info!("Reconciliation scheduler already running");
            drop(timer);
            return self.status().await;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let job = Arc::clone(&self.job);
        let interval = self.interval;

        let task = tokio::spawn(async move {
            // 首次触发在一个间隔之后
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {},
                }

                match job.run(RunTrigger::Scheduled).await {
                    Ok(summary) => tracing::info!(
                        "Scheduled reconciliation: processed {}, reconciled {}, errors {}",
                        summary.processed_deliveries,
                        summary.reconciled_deliveries,
                        summary.errors.len()
                    ),
                    Err(JobError::AlreadyRunning) => {
                        tracing::info!("Scheduled reconciliation skipped: previous run still in progress")
                    }
                    Err(e) => tracing::error!("Scheduled reconciliation failed: {}", e),
                }
            }
            tracing::info!("Reconciliation scheduler loop exited");
        });

        *timer = Some(Timer {
            anchor: self.clock.now(),
            shutdown,
            task,
        });
        drop(timer);

        tracing::info!(
            "Reconciliation scheduler started, interval {:?}",
            self.interval
        );
        self.status().await
    }

    /// 停止定时器; 未启动时只记录日志
    pub async fn stop(&self) -> SchedulerStatus {
        match self.timer.lock().await.take() {
            Some(timer) => {
                // 进行中的运行会跑完, 循环在下一次等待时退出
                let _ = timer.shutdown.send(true);
                tracing::info!("Reconciliation scheduler stopped");
            }
            None => tracing::info!("Reconciliation scheduler already stopped"),
        }
        self.status().await
    }

    /// 手动触发一次对账
    ///
    /// 运行在独立任务中执行: 调用方被取消 (例如 HTTP 客户端断开) 时运行仍会跑完并记录。
    pub async fn trigger(&self) -> Result<RunSummary, JobError> {
        let job = Arc::clone(&self.job);
        tokio::spawn(async move { job.run(RunTrigger::Manual).await })
            .await
            .map_err(|e| JobError::Aborted(e.to_string()))?
    }

    pub async fn status(&self) -> SchedulerStatus {
        let timer = self.timer.lock().await;
        let next_run = timer.as_ref().and_then(|t| self.next_tick(t.anchor));
        SchedulerStatus {
            active: timer.is_some(),
            next_run,
            // 不足一分钟的间隔向上取整
            interval_minutes: self.interval.as_millis().div_ceil(60_000) as u64,
        }
    }

    fn next_tick(&self, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let interval = chrono::Duration::from_std(self.interval).ok()?;
        let interval_ms = interval.num_milliseconds().max(1);
        let elapsed_ms = (self.clock.now() - anchor).num_milliseconds().max(0);
        let ticks = elapsed_ms / interval_ms + 1;
        anchor.checked_add_signed(chrono::Duration::milliseconds(ticks * interval_ms))
    }
}
