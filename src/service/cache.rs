use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::models::{VerificationKey, VerificationResult};

/// 缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: VerificationKey,
    pub result: VerificationResult,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// expires_at <= now 即视为过期
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Default)]
struct HitCounter {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HitCounter {
    fn record(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// 缓存统计
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// 自上次重置以来 get() 的命中率, 无读取时为 0
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub cleaned_count: usize,
}

/// 校验结果缓存
///
/// 惰性过期: 读取时比较时间, 不做后台清扫; `cleanup` 用于显式压缩。
/// 批量校验的多个 worker 会并发读写。
#[derive(Debug)]
pub struct VerificationCache {
    entries: DashMap<VerificationKey, CacheEntry>,
    default_ttl: Duration,
    counters: HitCounter,
    store_counters: DashMap<i64, HitCounter>,
    clock: Arc<dyn Clock>,
}

impl VerificationCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            counters: HitCounter::default(),
            store_counters: DashMap::new(),
            clock,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// 读取: 缺失或过期均记为未命中
    pub fn get(&self, key: &VerificationKey) -> Option<VerificationResult> {
        let now = self.clock.now();
        let found = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.result.clone());

        let hit = found.is_some();
        self.counters.record(hit);
        self.store_counters
            .entry(key.store_id)
            .or_default()
            .record(hit);
        found
    }

    /// 以全局 TTL 写入, 无条件覆盖
    pub fn put(&self, key: VerificationKey, result: VerificationResult) {
        self.put_with_ttl(key, result, self.default_ttl);
    }

    pub fn put_with_ttl(&self, key: VerificationKey, result: VerificationResult, ttl: Duration) {
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.insert(
            key,
            CacheEntry {
                key,
                result,
                expires_at,
            },
        );
    }

    /// 删除条目 (不论是否过期), 返回是否存在
    pub fn invalidate(&self, key: &VerificationKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn stats(&self, store_id: Option<i64>) -> CacheStats {
        let now = self.clock.now();
        let mut total_entries = 0;
        let mut expired_entries = 0;
        for entry in self.entries.iter() {
            if store_id.is_some_and(|s| s != entry.key.store_id) {
                continue;
            }
            total_entries += 1;
            if entry.is_expired(now) {
                expired_entries += 1;
            }
        }

        let (hits, misses) = match store_id {
            None => self.counters.snapshot(),
            Some(s) => self
                .store_counters
                .get(&s)
                .map(|c| c.snapshot())
                .unwrap_or((0, 0)),
        };
        let reads = hits + misses;
        let hit_rate = if reads == 0 {
            0.0
        } else {
            hits as f64 / reads as f64
        };

        CacheStats {
            total_entries,
            valid_entries: total_entries - expired_entries,
            expired_entries,
            hits,
            misses,
            hit_rate,
        }
    }

    /// 物理删除过期条目 (可限定门店), 并重置对应的命中计数
    pub fn cleanup(&self, store_id: Option<i64>) -> CleanupReport {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            let in_scope = store_id.map_or(true, |s| s == key.store_id);
            !(in_scope && entry.is_expired(now))
        });
        let cleaned_count = before.saturating_sub(self.entries.len());

        match store_id {
            Some(s) => {
                if let Some(counter) = self.store_counters.get(&s) {
                    counter.reset();
                }
            }
            None => {
                self.counters.reset();
                self.store_counters.clear();
            }
        }

        CleanupReport { cleaned_count }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
