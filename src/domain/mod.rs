// ==========================================
// 上门安装预约路由系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、协作接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod order;
pub mod postcode;
pub mod region;
pub mod schedule;
pub mod types;

// 重导出核心类型
pub use order::{meta_keys, OrderLineItem, OrderRecord, SimpleOrder};
pub use postcode::{normalize_postcode, PostcodeRecord};
pub use region::{
    MappingEntry, MappingStats, NumericRange, RegionAnchor, RegionAssignment, RegionDayConfig,
    RegionMapping, RegionRule, RuleConfig,
};
pub use schedule::{
    default_slot_windows, DayOccupancy, ScheduleContext, ServiceCounts, SlotBooking,
    SlotOccupancy, SlotPlacement, SlotWindow,
};
pub use types::{AssignmentStrategy, RouteStrategy, RuleType, ServiceType};
