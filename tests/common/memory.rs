use async_trait::async_trait;
use bl_reconcile::db::{DeliveryStore, StoreConfigLookup, StoreConfigSource};
use bl_reconcile::error::{ConfigError, StoreError};
use bl_reconcile::external::{ExternalError, RecordSource};
use bl_reconcile::models::{
    Delivery, DeliveryStatus, ExternalInvoiceRecord, StoreReconciliationConfig,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// 内存配送单存储
#[derive(Debug, Default)]
pub struct MemoryDeliveryStore {
    deliveries: Mutex<BTreeMap<i64, Delivery>>,
    fail_listing: AtomicBool,
    fail_marking: Mutex<HashSet<i64>>,
    pub mark_calls: AtomicUsize,
}

impl MemoryDeliveryStore {
    pub fn insert(&self, delivery: Delivery) {
        self.deliveries.lock().unwrap().insert(delivery.id, delivery);
    }

    pub fn status(&self, id: i64) -> Option<DeliveryStatus> {
        self.deliveries.lock().unwrap().get(&id).map(|d| d.status.clone())
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_marking(&self, id: i64) {
        self.fail_marking.lock().unwrap().insert(id);
    }
}

#[async_trait]
impl DeliveryStore for MemoryDeliveryStore {
    async fn list_pending(&self) -> Result<Vec<Delivery>, StoreError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("delivery database down".into()));
        }
        Ok(self
            .deliveries
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.is_pending())
            .cloned()
            .collect())
    }

    async fn get(&self, delivery_id: i64) -> Result<Option<Delivery>, StoreError> {
        Ok(self.deliveries.lock().unwrap().get(&delivery_id).cloned())
    }

    async fn mark_reconciled(&self, delivery_id: i64) -> Result<bool, StoreError> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_marking.lock().unwrap().contains(&delivery_id) {
            return Err(StoreError::Unavailable("write rejected".into()));
        }
        let mut deliveries = self.deliveries.lock().unwrap();
        match deliveries.get_mut(&delivery_id) {
            Some(d) if d.is_pending() => {
                d.status = DeliveryStatus::Reconciled;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// 内存门店配置
#[derive(Debug, Default)]
pub struct MemoryConfigSource {
    configs: Mutex<HashMap<i64, StoreReconciliationConfig>>,
    invalid: Mutex<HashMap<i64, String>>,
    pub lookups: AtomicUsize,
}

impl MemoryConfigSource {
    pub fn insert(&self, config: StoreReconciliationConfig) {
        self.configs.lock().unwrap().insert(config.store_id, config);
    }

    pub fn insert_invalid(&self, store_id: i64, reason: &str) {
        self.invalid.lock().unwrap().insert(store_id, reason.to_string());
    }
}

#[async_trait]
impl StoreConfigSource for MemoryConfigSource {
    async fn get_config(&self, store_id: i64) -> Result<StoreConfigLookup, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.invalid.lock().unwrap().get(&store_id) {
            return Ok(StoreConfigLookup::Invalid(ConfigError::StoreConfigInvalid {
                store_id,
                reason: reason.clone(),
            }));
        }
        Ok(match self.configs.lock().unwrap().get(&store_id) {
            Some(config) => StoreConfigLookup::Found(config.clone()),
            None => StoreConfigLookup::Missing,
        })
    }
}

/// 预设的外部表响应
#[derive(Debug, Clone)]
pub enum Script {
    Records(Vec<ExternalInvoiceRecord>),
    Timeout,
    Status(u16),
    Rejected,
    Panic,
}

/// 按过滤值返回预设响应的外部表
///
/// 同一个值可预设多次响应, 依次消费, 最后一个重复使用。
#[derive(Debug, Default)]
pub struct ScriptedRecordSource {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<(i64, String, String)>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedRecordSource {
    pub fn script(&self, value: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .entry(value.to_string())
            .or_default()
            .push_back(script);
    }

    pub fn records(&self, value: &str, records: Vec<ExternalInvoiceRecord>) {
        self.script(value, Script::Records(records));
    }

    pub fn delay(&self, value: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(value.to_string(), delay);
    }

    /// (门店, 列名, 值)
    pub fn calls(&self) -> Vec<(i64, String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn next_script(&self, value: &str) -> Script {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(value) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Script::Records(vec![])),
            None => Script::Records(vec![]),
        }
    }
}

#[async_trait]
impl RecordSource for ScriptedRecordSource {
    async fn fetch_by_column(
        &self,
        config: &StoreReconciliationConfig,
        column: &str,
        value: &str,
    ) -> Result<Vec<ExternalInvoiceRecord>, ExternalError> {
        self.calls
            .lock()
            .unwrap()
            .push((config.store_id, column.to_string(), value.to_string()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(value).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let script = self.next_script(value);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match script {
            Script::Records(records) => Ok(records),
            Script::Timeout => Err(ExternalError::Timeout(Duration::from_secs(10))),
            Script::Status(status) => Err(ExternalError::Status { status }),
            Script::Rejected => Err(ExternalError::InvalidFilter(value.to_string())),
            Script::Panic => panic!("malformed record for {value}"),
        }
    }
}
