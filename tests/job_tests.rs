mod common;

use bl_reconcile::clock::ManualClock;
use bl_reconcile::error::JobError;
use bl_reconcile::models::{DeliveryStatus, RunStatus, RunTrigger, VerificationKey};
use bl_reconcile::ReconciliationScheduler;
use chrono::{TimeZone, Utc};
use common::fixtures::{delivery, record, store_config};
use common::memory::Script;
use common::{harness, harness_with_clock, settings, Harness};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn seeded() -> Harness {
    let h = harness(settings(5, 0));
    h.configs.insert(store_config(7));
    h.configs.insert(store_config(8));
    h.deliveries.insert(delivery(1, 7, "FAC1", "CMP"));
    h.deliveries.insert(delivery(2, 7, "FAC2", "CMP"));
    h.deliveries.insert(delivery(3, 8, "FAC3", "Metro"));
    h.records.records("FAC1", vec![record(json!({"RefFacture": "FAC1"}))]);
    h.records.records("FAC3", vec![record(json!({"RefFacture": "fac3 "}))]);
    h
}

#[tokio::test]
async fn test_run_reconciles_matched_deliveries() {
    let h = seeded();

    let summary = h.job.run(RunTrigger::Manual).await.unwrap();

    assert_eq!(summary.processed_deliveries, 3);
    assert_eq!(summary.reconciled_deliveries, 2);
    assert!(summary.errors.is_empty());
    assert_eq!(h.deliveries.status(1), Some(DeliveryStatus::Reconciled));
    assert_eq!(h.deliveries.status(2), Some(DeliveryStatus::Pending));
    assert_eq!(h.deliveries.status(3), Some(DeliveryStatus::Reconciled));

    // 回写后缓存失效, 未匹配的结论保留
    assert!(h.cache.get(&VerificationKey::new(1, 7)).is_none());
    assert!(h.cache.get(&VerificationKey::new(2, 7)).is_some());

    let run = h.job.ledger().last().await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.trigger, RunTrigger::Manual);
    assert!(run.ended_at.is_some());
    assert!(!h.job.is_running().await);
}

#[tokio::test]
async fn test_second_run_reconciles_nothing_new() {
    let h = seeded();

    let first = h.job.run(RunTrigger::Manual).await.unwrap();
    let second = h.job.run(RunTrigger::Manual).await.unwrap();

    assert_eq!(first.reconciled_deliveries, 2);
    assert_eq!(second.reconciled_deliveries, 0);
    assert_eq!(second.processed_deliveries, 1);
    assert_eq!(h.deliveries.mark_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_overlapping_trigger_is_rejected() {
    let h = seeded();
    h.records.delay("FAC1", Duration::from_millis(300));

    let job = Arc::clone(&h.job);
    let running = tokio::spawn(async move { job.run(RunTrigger::Scheduled).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.job.is_running().await);
    let rejected = h.job.run(RunTrigger::Manual).await;
    assert!(matches!(rejected, Err(JobError::AlreadyRunning)));

    let summary = running.await.unwrap().unwrap();
    assert_eq!(summary.reconciled_deliveries, 2);
    // 被拒绝的触发不产生运行记录
    assert_eq!(h.job.ledger().recent(10).await.len(), 1);
}

#[tokio::test]
async fn test_item_errors_are_summarised_not_thrown() {
    let h = seeded();
    h.records.script("FAC2", Script::Timeout);
    h.deliveries.insert(delivery(4, 99, "FAC4", "CMP"));
    h.deliveries.fail_marking(3);

    let summary = h.job.run(RunTrigger::Manual).await.unwrap();

    assert_eq!(summary.processed_deliveries, 4);
    assert_eq!(summary.reconciled_deliveries, 1);
    assert_eq!(summary.errors.len(), 3);
    assert!(summary.errors.iter().any(|e| e.starts_with("2:7: API_ERROR")));
    assert!(summary.errors.iter().any(|e| e.starts_with("4:99: CONFIG_ERROR")));
    assert!(summary.errors.iter().any(|e| e.starts_with("3:8: failed to mark reconciled")));

    let run = h.job.ledger().last().await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.error_count, 3);
}

#[tokio::test]
async fn test_delivery_store_outage_fails_run_but_not_the_next() {
    let h = seeded();
    h.deliveries.set_fail_listing(true);

    let err = h.job.run(RunTrigger::Scheduled).await.unwrap_err();
    assert!(matches!(err, JobError::DeliveryStore(_)));
    let failed = h.job.ledger().last().await.unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(failed.error_count, 1);

    h.deliveries.set_fail_listing(false);
    let summary = h.job.run(RunTrigger::Scheduled).await.unwrap();
    assert_eq!(summary.reconciled_deliveries, 2);
}

#[tokio::test]
async fn test_scheduler_lifecycle_is_idempotent() {
    let start = Utc.with_ymd_and_hms(2024, 5, 3, 8, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let h = harness_with_clock(settings(5, 0), clock.clone());
    let scheduler = ReconciliationScheduler::new(
        h.job.clone(),
        Duration::from_secs(20 * 60),
        clock.clone(),
    );

    let stopped = scheduler.status().await;
    assert!(!stopped.active);
    assert_eq!(stopped.next_run, None);
    assert_eq!(stopped.interval_minutes, 20);

    let started = scheduler.start().await;
    assert!(started.active);
    assert_eq!(started.next_run, Some(start + chrono::Duration::minutes(20)));

    // 再次启动不重置锚点
    clock.advance(chrono::Duration::minutes(25));
    let again = scheduler.start().await;
    assert!(again.active);
    assert_eq!(again.next_run, Some(start + chrono::Duration::minutes(40)));

    assert!(!scheduler.stop().await.active);
    assert!(!scheduler.stop().await.active);
}

#[tokio::test]
async fn test_scheduler_timer_drives_runs() {
    let h = seeded();
    let scheduler = ReconciliationScheduler::new(
        h.job.clone(),
        Duration::from_millis(50),
        Arc::new(bl_reconcile::clock::SystemClock),
    );

    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    scheduler.stop().await;
    // 停止前已开始的运行会跑完
    tokio::time::sleep(Duration::from_millis(30)).await;

    let runs = h.job.ledger().recent(10).await;
    assert!(!runs.is_empty());
    assert!(runs.iter().all(|r| r.trigger == RunTrigger::Scheduled));
    assert_eq!(h.deliveries.status(1), Some(DeliveryStatus::Reconciled));

    // 手动触发不依赖定时器
    let summary = scheduler.trigger().await.unwrap();
    assert_eq!(summary.reconciled_deliveries, 0);
}

#[tokio::test]
async fn test_dropped_run_is_recorded_as_failed() {
    let h = seeded();
    h.records.delay("FAC1", Duration::from_millis(300));

    let job = Arc::clone(&h.job);
    let running = tokio::spawn(async move { job.run(RunTrigger::Manual).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.job.is_running().await);
    running.abort();
    let _ = running.await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert!(!h.job.is_running().await);
    let run = h.job.ledger().last().await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.ended_at.is_some());
    assert!(run.errors.iter().any(|e| e.contains("interrupted")));

    // 运行锁已释放
    let summary = h.job.run(RunTrigger::Manual).await.unwrap();
    assert_eq!(summary.reconciled_deliveries, 2);
}

#[tokio::test]
async fn test_manual_trigger_outlives_cancelled_caller() {
    let h = seeded();
    h.records.delay("FAC1", Duration::from_millis(200));
    let scheduler = Arc::new(ReconciliationScheduler::new(
        h.job.clone(),
        Duration::from_secs(20 * 60),
        Arc::new(bl_reconcile::clock::SystemClock),
    ));

    let caller = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.trigger().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    caller.abort();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(!h.job.is_running().await);
    let run = h.job.ledger().last().await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.trigger, RunTrigger::Manual);
    assert_eq!(run.reconciled_count, 2);
    assert_eq!(h.deliveries.status(1), Some(DeliveryStatus::Reconciled));
}

#[tokio::test]
async fn test_sub_minute_interval_is_reported_rounded_up() {
    let h = seeded();
    let scheduler_with = |interval| {
        ReconciliationScheduler::new(
            h.job.clone(),
            interval,
            Arc::new(bl_reconcile::clock::SystemClock),
        )
    };

    assert_eq!(scheduler_with(Duration::from_millis(50)).status().await.interval_minutes, 1);
    assert_eq!(scheduler_with(Duration::from_secs(90)).status().await.interval_minutes, 2);
    assert_eq!(scheduler_with(Duration::from_secs(20 * 60)).status().await.interval_minutes, 20);
}
