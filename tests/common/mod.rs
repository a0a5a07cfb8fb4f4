#![allow(dead_code)]

pub mod fixtures;
pub mod memory;

use bl_reconcile::clock::{Clock, SystemClock};
use bl_reconcile::external::RecordSource;
use bl_reconcile::service::{AuditLogger, BulkSettings, RunLedger};
use bl_reconcile::{BulkVerifier, ReconciliationJob, VerificationCache};
use std::sync::Arc;
use std::time::Duration;

use memory::{MemoryConfigSource, MemoryDeliveryStore, ScriptedRecordSource};

/// 组装好的测试引擎
pub struct Harness {
    pub deliveries: Arc<MemoryDeliveryStore>,
    pub configs: Arc<MemoryConfigSource>,
    pub records: Arc<ScriptedRecordSource>,
    pub cache: Arc<VerificationCache>,
    pub audit: Arc<AuditLogger>,
    pub verifier: BulkVerifier,
    pub job: Arc<ReconciliationJob>,
}

pub fn settings(concurrency: usize, api_retries: u32) -> BulkSettings {
    BulkSettings {
        concurrency,
        api_retries,
        retry_backoff: Duration::from_millis(5),
    }
}

pub fn harness(settings: BulkSettings) -> Harness {
    harness_with_clock(settings, Arc::new(SystemClock))
}

pub fn harness_with_clock(settings: BulkSettings, clock: Arc<dyn Clock>) -> Harness {
    let deliveries = Arc::new(MemoryDeliveryStore::default());
    let configs = Arc::new(MemoryConfigSource::default());
    let records = Arc::new(ScriptedRecordSource::default());
    let cache = Arc::new(VerificationCache::with_clock(
        Duration::from_secs(1800),
        clock.clone(),
    ));
    let audit = Arc::new(AuditLogger::with_clock(1000, clock.clone()));
    let record_source: Arc<dyn RecordSource> = records.clone();

    let verifier = BulkVerifier::new(
        cache.clone(),
        record_source,
        configs.clone(),
        audit.clone(),
        clock.clone(),
        settings,
    );
    let job = Arc::new(ReconciliationJob::new(
        deliveries.clone(),
        verifier.clone(),
        Arc::new(RunLedger::new(20)),
        audit.clone(),
        clock,
    ));

    Harness {
        deliveries,
        configs,
        records,
        cache,
        audit,
        verifier,
        job,
    }
}
