use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// 一条审计记录
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub level: AuditLevel,
    pub operation: String,
    pub group_id: Option<i64>,
    pub message: String,
    pub duration_ms: Option<u64>,
}

/// 审计日志: 按操作名记录, 可选门店ID与耗时
///
/// 所有记录都会以 tracing 事件输出, 同时在内存中保留最近 `capacity` 条。
#[derive(Debug)]
pub struct AuditLogger {
    capacity: usize,
    recent: Mutex<VecDeque<AuditEntry>>,
    clock: Arc<dyn Clock>,
}

impl AuditLogger {
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity,
            recent: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            clock,
        }
    }

    pub fn debug(&self, operation: &str, group_id: Option<i64>, message: impl Into<String>) {
        self.record(AuditLevel::Debug, operation, group_id, message.into(), None);
    }

    pub fn info(&self, operation: &str, group_id: Option<i64>, message: impl Into<String>) {
        self.record(AuditLevel::Info, operation, group_id, message.into(), None);
    }

    pub fn warn(&self, operation: &str, group_id: Option<i64>, message: impl Into<String>) {
        self.record(AuditLevel::Warn, operation, group_id, message.into(), None);
    }

    pub fn error(&self, operation: &str, group_id: Option<i64>, message: impl Into<String>) {
        self.record(AuditLevel::Error, operation, group_id, message.into(), None);
    }

    /// 带耗时的记录
    pub fn timed(
        &self,
        level: AuditLevel,
        operation: &str,
        group_id: Option<i64>,
        message: impl Into<String>,
        duration: Duration,
    ) {
        self.record(level, operation, group_id, message.into(), Some(duration));
    }

    fn record(
        &self,
        level: AuditLevel,
        operation: &str,
        group_id: Option<i64>,
        message: String,
        duration: Option<Duration>,
    ) {
        let duration_ms = duration.map(|d| d.as_millis() as u64);
        match level {
            AuditLevel::Debug => {
                tracing::debug!(operation, group_id, duration_ms, "{}", message)
            }
            AuditLevel::Info => tracing::info!(operation, group_id, duration_ms, "{}", message),
            AuditLevel::Warn => tracing::warn!(operation, group_id, duration_ms, "{}", message),
            AuditLevel::Error => {
                tracing::error!(operation, group_id, duration_ms, "{}", message)
            }
        }

        if self.capacity == 0 {
            return;
        }
        let entry = AuditEntry {
            at: self.clock.now(),
            level,
            operation: operation.to_string(),
            group_id,
            message,
            duration_ms,
        };
        let mut recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(entry);
    }

    /// 最近的记录, 新的在前
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        recent.iter().rev().take(limit).cloned().collect()
    }

    /// 按操作名和级别筛选 (新的在前)
    pub fn find(&self, operation: &str, level: AuditLevel) -> Vec<AuditEntry> {
        let recent = self.recent.lock().unwrap_or_else(|p| p.into_inner());
        recent
            .iter()
            .rev()
            .filter(|e| e.operation == operation && e.level == level)
            .cloned()
            .collect()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let audit = AuditLogger::new(2);
        audit.info("op", None, "first");
        audit.warn("op", Some(3), "second");
        audit.error("op", Some(3), "third");

        let recent = audit.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "third");
        assert_eq!(recent[1].message, "second");
    }

    #[test]
    fn test_timed_records_duration_and_find_filters() {
        let audit = AuditLogger::new(10);
        audit.timed(
            AuditLevel::Info,
            "fetch_candidates",
            Some(7),
            "ok",
            Duration::from_millis(42),
        );
        audit.debug("fetch_candidates", Some(7), "detail");

        let found = audit.find("fetch_candidates", AuditLevel::Info);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].duration_ms, Some(42));
        assert_eq!(found[0].group_id, Some(7));
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let audit = AuditLogger::new(0);
        audit.info("op", None, "x");
        assert!(audit.recent(5).is_empty());
    }
}
