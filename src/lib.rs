// ==========================================
// 上门安装预约路由系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 邮编 → 区域 → 团队/时段 的预约路由
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 导入层 - 车程表
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 实例装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{AssignmentStrategy, RouteStrategy, RuleType, ServiceType};

// 领域实体
pub use domain::{
    OrderRecord, PostcodeRecord, RegionAnchor, RegionAssignment, RegionDayConfig, RegionRule,
    ServiceCounts, SimpleOrder, SlotWindow,
};

// 引擎
pub use engine::{
    BookingSigner, HybridRouter, RegionAssignmentEngine, RegionDayPlanner, RegionMappingCache,
    RouterState, SlotSchedule,
};

// 导入
pub use importer::DistanceProvider;

// API
pub use api::{AdminApi, BookingService, StatusDispatcher};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "上门安装预约路由系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert!(!APP_NAME.is_empty());
    }
}
