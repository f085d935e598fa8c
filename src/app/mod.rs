// ==========================================
// 上门安装预约路由系统 - 应用层
// ==========================================
// 职责: 装配数据库、配置与各层实例，供命令行与宿主系统调用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
