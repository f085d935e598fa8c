// ==========================================
// 上门安装预约路由系统 - 导入层
// ==========================================
// 职责: 车程 CSV 解析、缓存与查询
// ==========================================

pub mod distance_provider;
pub mod distance_table;
pub mod error;

pub use distance_provider::{DistanceMeta, DistanceProvider, FileFingerprint};
pub use distance_table::{detect_delimiter, parse_distance_csv, DistanceTable};
pub use error::{DistanceError, DistanceResult};
