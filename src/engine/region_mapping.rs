// ==========================================
// 上门安装预约路由系统 - 区域映射缓存
// ==========================================
// 两级缓存:
//   1) 批量表: 由全部已知邮编批量重建，权威数据，只整体替换
//   2) 单查覆盖层: 批量表未命中的单次查询结果，容量有限 + TTL
// 覆盖层不回写批量表；需要合并视图时显式调用 merged()
// ==========================================

use crate::domain::postcode::{normalize_postcode, PostcodeRecord};
use crate::domain::region::{MappingEntry, RegionMapping};
use crate::engine::region_assignment::RegionAssignmentEngine;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// 覆盖层默认容量
pub const DEFAULT_OVERLAY_CAPACITY: usize = 512;

/// 覆盖层默认有效期（秒）
pub const DEFAULT_OVERLAY_TTL_SECS: i64 = 6 * 3600;

struct OverlayEntry {
    entry: MappingEntry,
    inserted_at: DateTime<Utc>,
}

#[derive(Default)]
struct Overlay {
    entries: HashMap<String, OverlayEntry>,
    order: VecDeque<String>,
}

impl Overlay {
    fn get(&self, key: &str, now: DateTime<Utc>, ttl: Duration) -> Option<MappingEntry> {
        self.entries
            .get(key)
            .filter(|e| now - e.inserted_at < ttl)
            .map(|e| e.entry.clone())
    }

    fn insert(&mut self, key: String, entry: MappingEntry, now: DateTime<Utc>, capacity: usize) {
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }
        self.entries.insert(
            key.clone(),
            OverlayEntry {
                entry,
                inserted_at: now,
            },
        );
        self.order.push_back(key);

        while self.order.len() > capacity.max(1) {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

// ==========================================
// RegionMappingCache - 区域映射缓存
// ==========================================
pub struct RegionMappingCache {
    bulk: Mutex<Option<Arc<RegionMapping>>>,
    overlay: Mutex<Overlay>,
    overlay_capacity: usize,
    overlay_ttl: Duration,
}

impl Default for RegionMappingCache {
    fn default() -> Self {
        Self::new(DEFAULT_OVERLAY_CAPACITY, Duration::seconds(DEFAULT_OVERLAY_TTL_SECS))
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl RegionMappingCache {
    pub fn new(overlay_capacity: usize, overlay_ttl: Duration) -> Self {
        Self {
            bulk: Mutex::new(None),
            overlay: Mutex::new(Overlay::default()),
            overlay_capacity,
            overlay_ttl,
        }
    }

    /// 批量重建（替换批量表并清空覆盖层）
    #[tracing::instrument(skip(self, engine, records), fields(records = records.len()))]
    pub fn rebuild(
        &self,
        engine: &RegionAssignmentEngine,
        records: &[PostcodeRecord],
        now: DateTime<Utc>,
    ) -> Arc<RegionMapping> {
        let entries: HashMap<String, MappingEntry> = records
            .iter()
            .map(|r| (r.postcode.clone(), MappingEntry::from(&engine.assign(r))))
            .collect();

        let mapping = Arc::new(RegionMapping::build(entries, now));
        tracing::info!(
            total = mapping.stats.total,
            unassigned = mapping.stats.unassigned,
            "区域映射批量重建完成"
        );

        *lock(&self.bulk) = Some(mapping.clone());
        lock(&self.overlay).clear();
        mapping
    }

    /// 查询邮编的区域
    ///
    /// # 参数
    /// - resolve: 批量表与覆盖层均未命中时，提供该邮编的车程行
    ///
    /// # 返回
    /// - None: 邮编在车程表中不存在
    pub fn lookup<F>(
        &self,
        postcode: &str,
        engine: &RegionAssignmentEngine,
        now: DateTime<Utc>,
        resolve: F,
    ) -> Option<MappingEntry>
    where
        F: FnOnce(&str) -> Option<PostcodeRecord>,
    {
        let key = normalize_postcode(postcode);
        if key.is_empty() {
            return None;
        }

        if let Some(bulk) = lock(&self.bulk).as_ref() {
            if let Some(entry) = bulk.entries.get(&key) {
                return Some(entry.clone());
            }
        }

        if let Some(entry) = lock(&self.overlay).get(&key, now, self.overlay_ttl) {
            return Some(entry);
        }

        let record = resolve(&key)?;
        let entry = MappingEntry::from(&engine.assign(&record));
        lock(&self.overlay).insert(key, entry.clone(), now, self.overlay_capacity);
        Some(entry)
    }

    pub fn bulk(&self) -> Option<Arc<RegionMapping>> {
        lock(&self.bulk).clone()
    }

    /// 覆盖层中存在批量表没有的条目时，批量表视为过期
    pub fn is_stale(&self) -> bool {
        let bulk = lock(&self.bulk).clone();
        let overlay = lock(&self.overlay);
        match bulk {
            Some(b) => overlay.entries.keys().any(|k| !b.entries.contains_key(k)),
            None => !overlay.entries.is_empty(),
        }
    }

    /// 合并视图: 批量表 + 未过期覆盖层（覆盖层不覆盖批量表）
    pub fn merged(&self, now: DateTime<Utc>) -> RegionMapping {
        let bulk = lock(&self.bulk).clone();
        let mut entries = bulk
            .as_ref()
            .map(|b| b.entries.clone())
            .unwrap_or_default();

        let overlay = lock(&self.overlay);
        for (key, item) in overlay.entries.iter() {
            if now - item.inserted_at < self.overlay_ttl {
                entries.entry(key.clone()).or_insert_with(|| item.entry.clone());
            }
        }

        RegionMapping::build(entries, now)
    }

    pub fn overlay_len(&self) -> usize {
        lock(&self.overlay).entries.len()
    }

    pub fn clear(&self) {
        *lock(&self.bulk) = None;
        lock(&self.overlay).clear();
    }
}
