// ==========================================
// 上门安装预约路由系统 - 应用状态
// ==========================================
// 职责: 打开数据库、读取配置、装配仓储/引擎/API 实例
// ==========================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Duration;

use crate::api::{AdminApi, ApiResult, BookingService, Mailer, StatusDispatcher};
use crate::config::{ConfigManager, RouterSettings};
use crate::db::open_and_init;
use crate::engine::region_mapping::{RegionMappingCache, DEFAULT_OVERLAY_CAPACITY};
use crate::engine::router_state::RouterState;
use crate::importer::DistanceProvider;
use crate::repository::{AdminNoticeRepository, SlotBookingRepository, SqliteRouterState};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "BOOKING_ROUTER_DB_PATH";

const DATA_DIR_NAME: &str = "booking-router";

/// 应用状态
///
/// 命令行每次运行创建一份；所有仓储共享同一连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 配置快照
    pub settings: RouterSettings,

    /// 配置管理器
    pub config: Arc<ConfigManager>,

    /// 车程查询服务
    pub distances: Arc<DistanceProvider>,

    /// 预约服务
    pub booking: Arc<BookingService>,

    /// 运维 API
    pub admin_api: Arc<AdminApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: String) -> ApiResult<Self> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = Arc::new(Mutex::new(open_and_init(&db_path)?));

        let config = Arc::new(ConfigManager::from_connection(conn.clone()));
        let settings = config.load_settings()?;

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let notices = Arc::new(AdminNoticeRepository::from_connection(conn.clone()));
        let slots = Arc::new(SlotBookingRepository::from_connection(conn.clone()));
        let router_state: Arc<dyn RouterState> =
            Arc::new(SqliteRouterState::from_connection(conn.clone()));

        // ==========================================
        // 初始化引擎与缓存
        // ==========================================
        let csv_path = settings
            .distance_csv_path
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(default_distance_csv_path);
        let distances = Arc::new(
            DistanceProvider::new(csv_path)
                .with_ttl(Duration::hours(settings.distance_cache_ttl_hours))
                .with_aliases(settings.aliases())
                .with_notices(notices.clone()),
        );
        let mapping = Arc::new(RegionMappingCache::new(
            DEFAULT_OVERLAY_CAPACITY,
            Duration::seconds(settings.overlay_ttl_secs),
        ));

        // ==========================================
        // 创建API实例
        // ==========================================
        let booking = Arc::new(BookingService::new(
            settings.clone(),
            distances.clone(),
            mapping.clone(),
            router_state.clone(),
            slots.clone(),
        ));
        let admin_api = Arc::new(AdminApi::new(
            distances.clone(),
            mapping,
            booking.clone(),
            router_state,
            slots,
            notices,
        ));

        tracing::info!("AppState初始化完成");
        Ok(Self {
            db_path,
            settings,
            config,
            distances,
            booking,
            admin_api,
        })
    }

    /// 挂接邮件发送方，得到状态触发器
    pub fn status_dispatcher(&self, mailer: Arc<dyn Mailer>) -> StatusDispatcher {
        StatusDispatcher::new(self.booking.clone(), mailer)
    }
}

fn data_dir() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join(DATA_DIR_NAME),
        None => PathBuf::from("."),
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 BOOKING_ROUTER_DB_PATH → 用户数据目录 → 当前目录
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let dir = data_dir();
    // 目录创建失败时由打开数据库报错
    std::fs::create_dir_all(&dir).ok();
    dir.join("booking_router.db").to_string_lossy().to_string()
}

/// 未配置 distance_csv_path 时的车程表位置
pub fn default_distance_csv_path() -> PathBuf {
    data_dir().join("distances.csv")
}
