// ==========================================
// 上门安装预约路由系统 - 引擎层
// ==========================================
// 职责: 区域分配 / 日历规划 / 时段排程 / 团队路由 / 链接签名
// 红线: Engine 不拼 SQL，持久化经 RouterState 等接口注入
// ==========================================

pub mod booking_signature;
pub mod canonical;
pub mod day_planner;
pub mod hybrid_router;
pub mod region_assignment;
pub mod region_mapping;
pub mod region_rule;
pub mod router_state;
pub mod slot_schedule;

// 重导出核心引擎
pub use booking_signature::{
    build_url, BookingParams, BookingQuery, BookingSigner, SignatureError, SignatureResult,
};
pub use canonical::{slugify, RegionAliases};
pub use day_planner::RegionDayPlanner;
pub use hybrid_router::{HybridRouter, RegionPriorityList, RouterConfig, Selection, TeamOrder};
pub use region_assignment::{RegionAssignmentEngine, RuleTrace};
pub use region_mapping::RegionMappingCache;
pub use region_rule::{
    build_matcher, haversine_km, CantonRule, FallbackRule, MetricRule, PrefixRule,
    RegionRuleMatcher, RuleMatch,
};
pub use router_state::{InMemoryRouterState, RouterState, RrPointer};
pub use slot_schedule::{SlotRun, SlotSchedule};
