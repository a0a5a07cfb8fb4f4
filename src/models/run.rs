use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 对账运行的触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// 对账运行记录: 开始时创建, 结束时定稿
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRun {
    pub id: u64,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub processed_count: usize,
    pub reconciled_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
}

impl ReconciliationRun {
    pub fn start(id: u64, trigger: RunTrigger, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            trigger,
            status: RunStatus::Running,
            started_at,
            ended_at: None,
            processed_count: 0,
            reconciled_count: 0,
            error_count: 0,
            errors: Vec::new(),
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// 一次运行的汇总 (手动触发接口返回)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: u64,
    pub processed_deliveries: usize,
    pub reconciled_deliveries: usize,
    pub errors: Vec<String>,
}

impl From<&ReconciliationRun> for RunSummary {
    fn from(run: &ReconciliationRun) -> Self {
        Self {
            run_id: run.id,
            processed_deliveries: run.processed_count,
            reconciled_deliveries: run.reconciled_count,
            errors: run.errors.clone(),
        }
    }
}
