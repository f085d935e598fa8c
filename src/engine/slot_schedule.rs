// ==========================================
// 上门安装预约路由系统 - 时段排程模型
// ==========================================
// 占用规则:
// - 时段内已有安装（montage）→ 安装与楼层送货均不可再约
// - 楼层送货（etage）: 无安装且已有送货 < 2 时可约
// 连续时段查找: 自起始下标贪心向后扫描，遇到首个不可用时段即停止
// 单位分配: 安装每单独占一个时段；送货按时段剩余容量（2 - 已有送货）填入
// ==========================================

use crate::domain::schedule::{
    default_slot_windows, ScheduleContext, ServiceCounts, SlotOccupancy, SlotPlacement,
    SlotWindow,
};
use crate::domain::types::ServiceType;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::instrument;

pub const DEFAULT_MONTAGE_DURATION: i32 = 120;
pub const DEFAULT_ETAGE_DURATION: i32 = 60;
pub const MIN_SERVICE_DURATION: i32 = 10;
pub const MAX_SERVICE_DURATION: i32 = 600;

/// 单个时段最多共存的楼层送货单数
pub const MAX_ETAGE_PER_SLOT: u32 = 2;

// ==========================================
// SlotRun - 连续时段查找结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRun {
    pub slots: Vec<usize>,
    pub minutes: i32,
    /// 每个时段分到的服务单位（与 slots 一一对应）
    pub placements: Vec<SlotPlacement>,
}

// ==========================================
// SlotSchedule - 时段排程
// ==========================================
#[derive(Debug, Clone)]
pub struct SlotSchedule {
    windows: Vec<SlotWindow>,
    montage_duration: i32,
    etage_duration: i32,
}

impl Default for SlotSchedule {
    fn default() -> Self {
        Self::new(
            default_slot_windows(),
            DEFAULT_MONTAGE_DURATION,
            DEFAULT_ETAGE_DURATION,
        )
    }
}

fn clamp_duration(minutes: i32) -> i32 {
    minutes.clamp(MIN_SERVICE_DURATION, MAX_SERVICE_DURATION)
}

impl SlotSchedule {
    /// # 参数
    /// - windows: 时段列表（按开始时间排序后使用）
    /// - montage_duration / etage_duration: 单位服务时长，限定 [10, 600]
    pub fn new(mut windows: Vec<SlotWindow>, montage_duration: i32, etage_duration: i32) -> Self {
        windows.sort_by_key(|w| w.start);
        Self {
            windows,
            montage_duration: clamp_duration(montage_duration),
            etage_duration: clamp_duration(etage_duration),
        }
    }

    /// 构造时替换时段列表（外部过滤钩子）
    ///
    /// 钩子返回空列表时保留原时段
    pub fn with_window_filter<F>(mut self, filter: F) -> Self
    where
        F: FnOnce(Vec<SlotWindow>) -> Vec<SlotWindow>,
    {
        let mut filtered = filter(self.windows.clone());
        if filtered.is_empty() {
            tracing::warn!("时段过滤钩子返回空列表，保留原时段");
            return self;
        }
        filtered.sort_by_key(|w| w.start);
        self.windows = filtered;
        self
    }

    pub fn windows(&self) -> &[SlotWindow] {
        &self.windows
    }

    pub fn montage_duration(&self) -> i32 {
        self.montage_duration
    }

    pub fn etage_duration(&self) -> i32 {
        self.etage_duration
    }

    /// 所需总分钟数；无服务时按一单安装计
    pub fn minutes_required(&self, counts: ServiceCounts) -> i32 {
        if counts.is_empty() {
            return self.montage_duration;
        }
        counts.montage as i32 * self.montage_duration + counts.etage as i32 * self.etage_duration
    }

    /// 所需时段数 = max(1, 安装数 + ceil(送货数 / 2))
    pub fn slots_required(&self, counts: ServiceCounts) -> usize {
        let etage_slots = counts.etage.div_ceil(MAX_ETAGE_PER_SLOT);
        (counts.montage + etage_slots).max(1) as usize
    }

    /// 时段当前占用是否还能接受该类型服务
    pub fn slot_allows_requirements(occupancy: SlotOccupancy, mode: ServiceType) -> bool {
        if occupancy.montage > 0 {
            return false;
        }
        match mode {
            ServiceType::Montage => occupancy.etage == 0,
            ServiceType::Etage => occupancy.etage < MAX_ETAGE_PER_SLOT,
        }
    }

    /// 时段剩余可接受的楼层送货单数
    pub fn etage_capacity(occupancy: SlotOccupancy) -> u32 {
        if occupancy.montage > 0 {
            return 0;
        }
        MAX_ETAGE_PER_SLOT.saturating_sub(occupancy.etage)
    }

    /// 查找连续可用时段，并把订单的服务单位分配到各时段
    ///
    /// # 参数
    /// - start_index: 起始时段下标
    /// - required_minutes / required_slots: 两个门槛须同时满足
    /// - counts: 待分配的服务单位；全部分配完才算满足
    ///
    /// # 返回
    /// - Some(SlotRun): 满足门槛的最短连续时段
    /// - None: 起始下标越界，或遇到占用时段前未满足门槛
    #[allow(clippy::too_many_arguments)]
    pub fn find_consecutive_free_slots(
        &self,
        team_key: &str,
        date: NaiveDate,
        start_index: usize,
        required_minutes: i32,
        required_slots: usize,
        context: &ScheduleContext,
        counts: ServiceCounts,
    ) -> Option<SlotRun> {
        let mode = counts.primary_mode();
        let mut montage_left = counts.montage;
        let mut etage_left = counts.etage;
        let mut run = SlotRun {
            slots: Vec::new(),
            minutes: 0,
            placements: Vec::new(),
        };

        for (idx, window) in self.windows.iter().enumerate().skip(start_index) {
            let occupancy = context.slot(team_key, date, idx);
            if !Self::slot_allows_requirements(occupancy, mode) {
                break;
            }

            let placement = if montage_left > 0 {
                montage_left -= 1;
                SlotPlacement {
                    slot_index: idx,
                    service: ServiceType::Montage,
                    units: 1,
                }
            } else if etage_left > 0 {
                let units = etage_left.min(Self::etage_capacity(occupancy));
                etage_left -= units;
                SlotPlacement {
                    slot_index: idx,
                    service: ServiceType::Etage,
                    units,
                }
            } else {
                // 单位已分完但时长未够：按主服务类型占一单
                SlotPlacement {
                    slot_index: idx,
                    service: mode,
                    units: 1,
                }
            };

            run.slots.push(idx);
            run.placements.push(placement);
            run.minutes += window.duration_minutes;
            if run.minutes >= required_minutes
                && run.slots.len() >= required_slots
                && montage_left == 0
                && etage_left == 0
            {
                return Some(run);
            }
        }
        None
    }

    /// 某日可用的最早起始时段下标
    ///
    /// # 返回
    /// - 当天: 开始时间晚于当前时刻的首个时段
    /// - 未来日期: 0
    /// - 过去日期 / 当天已无时段: None
    pub fn earliest_start_index(&self, date: NaiveDate, now: NaiveDateTime) -> Option<usize> {
        let today = now.date();
        if date < today {
            return None;
        }
        if date > today {
            return (!self.windows.is_empty()).then_some(0);
        }
        let time = now.time();
        self.windows.iter().position(|w| w.start > time)
    }

    /// 在某日为团队查找时段：先试最早起始下标，再逐个后移
    #[instrument(skip(self, context), fields(team = %team_key, date = %date))]
    pub fn find_for_day(
        &self,
        team_key: &str,
        date: NaiveDate,
        counts: ServiceCounts,
        context: &ScheduleContext,
        now: NaiveDateTime,
    ) -> Option<SlotRun> {
        let start = self.earliest_start_index(date, now)?;
        let required_minutes = self.minutes_required(counts);
        let required_slots = self.slots_required(counts);

        (start..self.windows.len()).find_map(|idx| {
            self.find_consecutive_free_slots(
                team_key,
                date,
                idx,
                required_minutes,
                required_slots,
                context,
                counts,
            )
        })
    }
}
