// ==========================================
// 上门安装预约路由系统 - 数据仓储层
// ==========================================
// 职责: 路由状态 / 时段占用 / 运维提示 的持久化
// 红线: Repository 不含业务逻辑
// ==========================================

pub mod admin_notice_repo;
pub mod error;
pub mod router_state_repo;
pub mod slot_booking_repo;

pub use admin_notice_repo::{AdminNotice, AdminNoticeRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use router_state_repo::SqliteRouterState;
pub use slot_booking_repo::SlotBookingRepository;
