// ==========================================
// 上门安装预约路由系统 - API 层
// ==========================================
// 职责: 编排引擎与仓储，提供预约/状态触发/运维接口
// ==========================================

pub mod admin_api;
pub mod booking_api;
pub mod dispatch_api;
pub mod error;

// 重导出核心类型
pub use admin_api::{AdminApi, PurgeReport, RegionReport};
pub use booking_api::{BookingOutcome, BookingService, LinkResponse};
pub use dispatch_api::{BookingMail, DispatchOutcome, Mailer, StatusDispatcher};
pub use error::{ApiError, ApiResult};
