// ==========================================
// 上门安装预约路由系统 - 配置层
// ==========================================
// 职责: 系统配置读取与覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod error;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, RouterSettings};
pub use error::{ConfigError, ConfigResult};
