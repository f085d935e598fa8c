// ==========================================
// 上门安装预约路由系统 - 运维 API
// ==========================================
// 职责: 车程表重载/查询/抽样、缓存清理、计数清理、区域解释、映射重建
// 调用方: 命令行工具
// ==========================================

use crate::api::booking_api::BookingService;
use crate::api::error::ApiResult;
use crate::domain::postcode::{normalize_postcode, PostcodeRecord};
use crate::domain::region::{RegionAssignment, RegionMapping};
use crate::engine::region_assignment::RuleTrace;
use crate::engine::region_mapping::RegionMappingCache;
use crate::engine::router_state::{retention_cutoff, RouterState};
use crate::importer::{DistanceMeta, DistanceProvider};
use crate::repository::{AdminNotice, AdminNoticeRepository, SlotBookingRepository};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

/// 清理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub cutoff: NaiveDate,
    pub counters: usize,
    pub slot_bookings: usize,
}

/// 区域解释结果
#[derive(Debug, Clone)]
pub struct RegionReport {
    pub postcode: String,
    pub record: Option<PostcodeRecord>,
    pub assignment: Option<RegionAssignment>,
    pub trace: Vec<RuleTrace>,
}

// ==========================================
// AdminApi - 运维 API
// ==========================================
pub struct AdminApi {
    distances: Arc<DistanceProvider>,
    mapping: Arc<RegionMappingCache>,
    booking: Arc<BookingService>,
    state: Arc<dyn RouterState>,
    slots: Arc<SlotBookingRepository>,
    notices: Arc<AdminNoticeRepository>,
}

impl AdminApi {
    pub fn new(
        distances: Arc<DistanceProvider>,
        mapping: Arc<RegionMappingCache>,
        booking: Arc<BookingService>,
        state: Arc<dyn RouterState>,
        slots: Arc<SlotBookingRepository>,
        notices: Arc<AdminNoticeRepository>,
    ) -> Self {
        Self {
            distances,
            mapping,
            booking,
            state,
            slots,
            notices,
        }
    }

    /// 强制重读车程表
    pub fn reload(&self, now: DateTime<Utc>) -> DistanceMeta {
        self.distances.invalidate_cache();
        let (_, meta) = self.distances.load_at(now);
        meta
    }

    pub fn get(&self, postcode: &str, now: DateTime<Utc>) -> Option<PostcodeRecord> {
        self.distances.record_at(postcode, now)
    }

    pub fn sample(&self, limit: usize) -> Vec<PostcodeRecord> {
        self.distances.sample(limit)
    }

    /// 清理过期计数与占用
    ///
    /// # 参数
    /// - days: 保留天数；None 时使用配置值
    pub fn purge(&self, today: NaiveDate, days: Option<i64>) -> ApiResult<PurgeReport> {
        let days = days
            .unwrap_or(self.booking.settings().counter_retention_days)
            .clamp(1, 365);
        let cutoff = retention_cutoff(today, days);
        let counters = self.state.purge_old_counters(today, days)?;
        let slot_bookings = self.slots.purge_before(cutoff)?;
        tracing::info!(%cutoff, counters, slot_bookings, "过期记录已清理");
        Ok(PurgeReport {
            cutoff,
            counters,
            slot_bookings,
        })
    }

    /// 清除车程表缓存与区域映射缓存
    pub fn flush_cache(&self) {
        self.distances.invalidate_cache();
        self.mapping.clear();
    }

    /// 解释邮编的区域分配
    pub fn region(&self, postcode: &str, now: DateTime<Utc>) -> RegionReport {
        let key = normalize_postcode(postcode);
        let record = self.distances.record_at(&key, now);
        let engine = self.booking.engine();
        let assignment = record.as_ref().map(|r| engine.assign(r));
        let trace = record.as_ref().map(|r| engine.explain(r)).unwrap_or_default();
        RegionReport {
            postcode: key,
            record,
            assignment,
            trace,
        }
    }

    /// 由全部已知邮编批量重建区域映射
    pub fn rebuild_mapping(&self, now: DateTime<Utc>) -> Arc<RegionMapping> {
        let records: Vec<PostcodeRecord> = self
            .distances
            .postcodes()
            .iter()
            .filter_map(|p| self.distances.record_at(p, now))
            .collect();
        self.mapping.rebuild(self.booking.engine(), &records, now)
    }

    pub fn notices(&self) -> ApiResult<Vec<AdminNotice>> {
        Ok(self.notices.list()?)
    }
}
