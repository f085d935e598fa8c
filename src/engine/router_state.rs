// ==========================================
// 上门安装预约路由系统 - 路由状态接口
// ==========================================
// 日计数器: (日期, 日历ID, 服务类型) → 已分配单数
// 轮询指针: (区域, 服务类型) → 指针 + revision（乐观锁）
// ==========================================
// 实现者: SqliteRouterState（repository 层） / InMemoryRouterState
// ==========================================

use crate::domain::types::ServiceType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use std::sync::Mutex;

/// CAS 推进轮询指针的最大尝试次数
pub const MAX_CAS_ATTEMPTS: u32 = 8;

/// 默认计数器保留天数
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// 轮询指针快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RrPointer {
    pub pointer: usize,
    pub revision: i64,
}

// ==========================================
// Trait: RouterState
// ==========================================
pub trait RouterState: Send + Sync {
    /// 计数 +1，返回新值
    fn increment(
        &self,
        date: NaiveDate,
        calendar_id: &str,
        service: ServiceType,
    ) -> RepositoryResult<i64>;

    fn count(&self, date: NaiveDate, calendar_id: &str, service: ServiceType)
        -> RepositoryResult<i64>;

    /// 读取轮询指针（不存在时为 pointer=0, revision=0）
    fn rr_pointer(&self, region: &str, service: ServiceType) -> RepositoryResult<RrPointer>;

    /// revision 匹配时写入新指针并 revision+1
    ///
    /// # 返回
    /// - Ok(true): 写入成功
    /// - Ok(false): revision 已被其他请求推进
    fn compare_and_set_rr(
        &self,
        region: &str,
        service: ServiceType,
        expected_revision: i64,
        new_pointer: usize,
    ) -> RepositoryResult<bool>;

    /// 删除早于 today - days 的计数记录，返回删除条数
    fn purge_old_counters(&self, today: NaiveDate, days: i64) -> RepositoryResult<usize>;

    /// 某日某日历的总单数（安装 + 楼层）
    fn day_total(&self, date: NaiveDate, calendar_id: &str) -> RepositoryResult<i64> {
        Ok(self.count(date, calendar_id, ServiceType::Montage)?
            + self.count(date, calendar_id, ServiceType::Etage)?)
    }

    /// 轮询指针前进一位（环绕），CAS 冲突时重读重试
    fn advance_rr(
        &self,
        region: &str,
        service: ServiceType,
        list_len: usize,
    ) -> RepositoryResult<usize> {
        if list_len == 0 {
            return Ok(0);
        }
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.rr_pointer(region, service)?;
            let next = (current.pointer + 1) % list_len;
            if self.compare_and_set_rr(region, service, current.revision, next)? {
                return Ok(next);
            }
            tracing::debug!(region, %service, "轮询指针 CAS 冲突，重试");
        }
        Err(RepositoryError::RetryExhausted {
            key: format!("{}/{}", region, service),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }
}

/// 保留窗口的起始日期（该日期及之后的计数保留）
pub fn retention_cutoff(today: NaiveDate, days: i64) -> NaiveDate {
    today - Duration::days(days.max(0))
}

// ==========================================
// InMemoryRouterState - 进程内实现
// ==========================================
#[derive(Default)]
struct MemoryInner {
    counters: HashMap<(NaiveDate, String, ServiceType), i64>,
    rr: HashMap<(String, ServiceType), RrPointer>,
}

#[derive(Default)]
pub struct InMemoryRouterState {
    inner: Mutex<MemoryInner>,
}

impl InMemoryRouterState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> RepositoryResult<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

impl RouterState for InMemoryRouterState {
    fn increment(
        &self,
        date: NaiveDate,
        calendar_id: &str,
        service: ServiceType,
    ) -> RepositoryResult<i64> {
        let mut inner = self.lock()?;
        let slot = inner
            .counters
            .entry((date, calendar_id.to_string(), service))
            .or_insert(0);
        *slot += 1;
        Ok(*slot)
    }

    fn count(
        &self,
        date: NaiveDate,
        calendar_id: &str,
        service: ServiceType,
    ) -> RepositoryResult<i64> {
        let inner = self.lock()?;
        Ok(inner
            .counters
            .get(&(date, calendar_id.to_string(), service))
            .copied()
            .unwrap_or(0))
    }

    fn rr_pointer(&self, region: &str, service: ServiceType) -> RepositoryResult<RrPointer> {
        let inner = self.lock()?;
        Ok(inner
            .rr
            .get(&(region.to_string(), service))
            .copied()
            .unwrap_or_default())
    }

    fn compare_and_set_rr(
        &self,
        region: &str,
        service: ServiceType,
        expected_revision: i64,
        new_pointer: usize,
    ) -> RepositoryResult<bool> {
        let mut inner = self.lock()?;
        let entry = inner.rr.entry((region.to_string(), service)).or_default();
        if entry.revision != expected_revision {
            return Ok(false);
        }
        entry.pointer = new_pointer;
        entry.revision += 1;
        Ok(true)
    }

    fn purge_old_counters(&self, today: NaiveDate, days: i64) -> RepositoryResult<usize> {
        let cutoff = retention_cutoff(today, days);
        let mut inner = self.lock()?;
        let before = inner.counters.len();
        inner.counters.retain(|(date, _, _), _| *date >= cutoff);
        Ok(before - inner.counters.len())
    }
}
