// ==========================================
// 上门安装预约路由系统 - 时段领域模型
// ==========================================
// 每日固定时段 / 订单服务构成 / 时段占用
// ==========================================

use crate::domain::types::ServiceType;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// SlotWindow - 每日固定时段
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub duration_minutes: i32,
}

impl SlotWindow {
    pub fn new(start: (u32, u32), end: (u32, u32), duration_minutes: i32) -> Option<Self> {
        Some(Self {
            start: NaiveTime::from_hms_opt(start.0, start.1, 0)?,
            end: NaiveTime::from_hms_opt(end.0, end.1, 0)?,
            duration_minutes,
        })
    }
}

/// 默认 5 个时段
pub fn default_slot_windows() -> Vec<SlotWindow> {
    [
        ((8, 0), (10, 0), 120),
        ((10, 0), (12, 30), 150),
        ((13, 0), (15, 0), 120),
        ((15, 0), (16, 30), 90),
        ((16, 30), (18, 0), 90),
    ]
    .into_iter()
    .filter_map(|(start, end, duration)| SlotWindow::new(start, end, duration))
    .collect()
}

// ==========================================
// ServiceCounts - 订单服务构成
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCounts {
    pub montage: u32,
    pub etage: u32,
}

impl ServiceCounts {
    pub fn new(montage: u32, etage: u32) -> Self {
        Self { montage, etage }
    }

    pub fn is_empty(&self) -> bool {
        self.montage == 0 && self.etage == 0
    }

    /// 主服务类型：含安装即按安装排程
    pub fn primary_mode(&self) -> ServiceType {
        if self.montage > 0 || self.etage == 0 {
            ServiceType::Montage
        } else {
            ServiceType::Etage
        }
    }
}

// ==========================================
// SlotOccupancy - 单个时段的已占用情况
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOccupancy {
    pub montage: u32,
    pub etage: u32,
}

// ==========================================
// SlotPlacement - 订单在单个时段内占用的服务单位
// ==========================================
// 每个单位落库为一条 SlotBooking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPlacement {
    pub slot_index: usize,
    pub service: ServiceType,
    pub units: u32,
}

/// 某团队某日的时段占用（slot_index → 占用）
pub type DayOccupancy = HashMap<usize, SlotOccupancy>;

// ==========================================
// SlotBooking - 已落库的时段预约
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotBooking {
    pub team_key: String,
    pub date: NaiveDate,
    pub slot_index: usize,
    pub service: ServiceType,
    pub order_id: String,
}

// ==========================================
// ScheduleContext - 时段查找上下文
// ==========================================
// 承载 (团队, 日期) → 占用，由调用方按需装载
#[derive(Debug, Clone, Default)]
pub struct ScheduleContext {
    occupancy: HashMap<(String, NaiveDate), DayOccupancy>,
}

impl ScheduleContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_day(&mut self, team_key: &str, date: NaiveDate, day: DayOccupancy) {
        self.occupancy.insert((team_key.to_string(), date), day);
    }

    /// 记录一单占用（用于测试装载或同一请求内的连续分配）
    pub fn book(&mut self, team_key: &str, date: NaiveDate, slot_index: usize, service: ServiceType) {
        let slot = self
            .occupancy
            .entry((team_key.to_string(), date))
            .or_default()
            .entry(slot_index)
            .or_default();
        match service {
            ServiceType::Montage => slot.montage += 1,
            ServiceType::Etage => slot.etage += 1,
        }
    }

    pub fn slot(&self, team_key: &str, date: NaiveDate, slot_index: usize) -> SlotOccupancy {
        self.occupancy
            .get(&(team_key.to_string(), date))
            .and_then(|day| day.get(&slot_index))
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_slot_windows() {
        let windows = default_slot_windows();
        assert_eq!(windows.len(), 5);
        assert_eq!(windows[1].start, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert_eq!(windows[1].duration_minutes, 150);
        let total: i32 = windows.iter().map(|w| w.duration_minutes).sum();
        assert_eq!(total, 570);
    }

    #[test]
    fn test_primary_mode() {
        assert_eq!(ServiceCounts::new(1, 3).primary_mode(), ServiceType::Montage);
        assert_eq!(ServiceCounts::new(0, 2).primary_mode(), ServiceType::Etage);
        assert_eq!(ServiceCounts::new(0, 0).primary_mode(), ServiceType::Montage);
    }

    #[test]
    fn test_context_book_and_read() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let mut ctx = ScheduleContext::new();
        ctx.book("team_a", date, 2, ServiceType::Etage);
        ctx.book("team_a", date, 2, ServiceType::Etage);
        assert_eq!(ctx.slot("team_a", date, 2).etage, 2);
        assert_eq!(ctx.slot("team_a", date, 3), SlotOccupancy::default());
        assert_eq!(ctx.slot("team_b", date, 2), SlotOccupancy::default());
    }
}
