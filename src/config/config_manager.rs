// ==========================================
// 上门安装预约路由系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// 约定: 数值配置读取时限定区间；格式错误记 warn 并回落默认值
// ==========================================

use crate::config::error::{ConfigError, ConfigResult};
use crate::db::open_sqlite_connection;
use crate::domain::region::{RegionAnchor, RegionDayConfig, RegionRule};
use crate::engine::booking_signature::{
    DEFAULT_TOKEN_TTL_HOURS, MAX_TOKEN_TTL_HOURS, MIN_TOKEN_TTL_HOURS,
};
use crate::engine::canonical::RegionAliases;
use crate::engine::hybrid_router::{RegionPriorityList, RouterConfig, DEFAULT_RR_THRESHOLD_MINUTES};
use crate::engine::region_mapping::DEFAULT_OVERLAY_TTL_SECS;
use crate::engine::router_state::DEFAULT_RETENTION_DAYS;
use crate::engine::slot_schedule::{
    DEFAULT_ETAGE_DURATION, DEFAULT_MONTAGE_DURATION, MAX_SERVICE_DURATION, MIN_SERVICE_DURATION,
};
use crate::importer::distance_provider::DEFAULT_CACHE_TTL_HOURS;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const DEFAULT_HORIZON_DAYS: i64 = 60;

// ==========================================
// RouterSettings - 一次请求使用的配置快照
// ==========================================
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub horizon_days: i64,
    pub rr_threshold_minutes: i32,
    pub token_ttl_hours: i64,
    pub montage_duration: i32,
    pub etage_duration: i32,
    pub counter_retention_days: i64,
    pub overlay_ttl_secs: i64,
    pub distance_cache_ttl_hours: i64,
    pub distance_csv_path: Option<String>,
    pub legacy_param_compat: bool,
    pub prefer_csv_region: bool,
    pub booking_base_url: String,
    pub signing_secret: String,
    pub region_rules: Vec<RegionRule>,
    pub region_anchors: Vec<RegionAnchor>,
    pub region_days: HashMap<String, RegionDayConfig>,
    pub priority_lists: HashMap<String, RegionPriorityList>,
    pub calendar_ids: HashMap<String, String>,
    pub default_teams: Vec<String>,
    pub region_aliases: HashMap<String, String>,
    pub phone_only_categories: Vec<String>,
    pub montage_categories: Vec<String>,
    pub etage_categories: Vec<String>,
    pub trigger_statuses: Vec<String>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            horizon_days: DEFAULT_HORIZON_DAYS,
            rr_threshold_minutes: DEFAULT_RR_THRESHOLD_MINUTES,
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            montage_duration: DEFAULT_MONTAGE_DURATION,
            etage_duration: DEFAULT_ETAGE_DURATION,
            counter_retention_days: DEFAULT_RETENTION_DAYS,
            overlay_ttl_secs: DEFAULT_OVERLAY_TTL_SECS,
            distance_cache_ttl_hours: DEFAULT_CACHE_TTL_HOURS,
            distance_csv_path: None,
            legacy_param_compat: true,
            prefer_csv_region: true,
            booking_base_url: String::new(),
            signing_secret: String::new(),
            region_rules: Vec::new(),
            region_anchors: Vec::new(),
            region_days: HashMap::new(),
            priority_lists: HashMap::new(),
            calendar_ids: HashMap::new(),
            default_teams: Vec::new(),
            region_aliases: HashMap::new(),
            phone_only_categories: Vec::new(),
            montage_categories: vec!["montage".to_string()],
            etage_categories: vec!["etage".to_string()],
            trigger_statuses: vec!["processing".to_string()],
        }
    }
}

impl RouterSettings {
    pub fn aliases(&self) -> RegionAliases {
        RegionAliases::with_overrides(&self.region_aliases)
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            priority_lists: self.priority_lists.clone(),
            calendar_ids: self.calendar_ids.clone(),
            default_teams: self.default_teams.clone(),
            rr_threshold_minutes: self.rr_threshold_minutes,
        }
        .canonicalized(&self.aliases())
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> ConfigResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ConfigError::LockError(e.to_string()))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global 配置（存在则覆盖）
    pub fn set_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::debug!(key, "配置已写入");
        Ok(())
    }

    /// 序列化为 JSON 后写入
    pub fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) -> ConfigResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.set_config_value(key, &raw)
    }

    /// 读取整数配置并限定区间
    pub fn get_clamped(&self, key: &str, default: i64, min: i64, max: i64) -> ConfigResult<i64> {
        let value = match self.get_global_config_value(key)? {
            None => default,
            Some(raw) => raw.trim().parse::<i64>().unwrap_or_else(|_| {
                tracing::warn!(config_key = key, raw_value = %raw, "数值配置格式错误，使用默认值");
                default
            }),
        };
        Ok(value.clamp(min, max))
    }

    pub fn get_bool(&self, key: &str, default: bool) -> ConfigResult<bool> {
        Ok(match self.get_global_config_value(key)? {
            None => default,
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    tracing::warn!(config_key = key, raw_value = %raw, "布尔配置格式错误，使用默认值");
                    default
                }
            },
        })
    }

    pub fn get_string(&self, key: &str) -> ConfigResult<String> {
        Ok(self
            .get_global_config_value(key)?
            .map(|v| v.trim().to_string())
            .unwrap_or_default())
    }

    /// 逗号分隔列表（去空白、去空项）
    pub fn get_csv_list(&self, key: &str, default: &[&str]) -> ConfigResult<Vec<String>> {
        Ok(match self.get_global_config_value(key)? {
            None => default.iter().map(|s| s.to_string()).collect(),
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    /// JSON 配置；不存在或格式错误时返回默认值
    pub fn get_json<T: DeserializeOwned + Default>(&self, key: &str) -> ConfigResult<T> {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(T::default());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(config_key = key, error = %e, "JSON 配置格式错误，使用空配置");
            T::default()
        }))
    }

    /// 读取全部路由配置
    pub fn load_settings(&self) -> ConfigResult<RouterSettings> {
        let duration = |key: &str, default: i32| -> ConfigResult<i32> {
            Ok(self.get_clamped(
                key,
                default as i64,
                MIN_SERVICE_DURATION as i64,
                MAX_SERVICE_DURATION as i64,
            )? as i32)
        };

        let csv_path = self.get_string(config_keys::DISTANCE_CSV_PATH)?;

        Ok(RouterSettings {
            horizon_days: self.get_clamped(config_keys::HORIZON_DAYS, DEFAULT_HORIZON_DAYS, 1, 365)?,
            rr_threshold_minutes: self.get_clamped(
                config_keys::RR_THRESHOLD_MINUTES,
                DEFAULT_RR_THRESHOLD_MINUTES as i64,
                0,
                600,
            )? as i32,
            token_ttl_hours: self.get_clamped(
                config_keys::TOKEN_TTL_HOURS,
                DEFAULT_TOKEN_TTL_HOURS,
                MIN_TOKEN_TTL_HOURS,
                MAX_TOKEN_TTL_HOURS,
            )?,
            montage_duration: duration(config_keys::MONTAGE_DURATION, DEFAULT_MONTAGE_DURATION)?,
            etage_duration: duration(config_keys::ETAGE_DURATION, DEFAULT_ETAGE_DURATION)?,
            counter_retention_days: self.get_clamped(
                config_keys::COUNTER_RETENTION_DAYS,
                DEFAULT_RETENTION_DAYS,
                1,
                365,
            )?,
            overlay_ttl_secs: self.get_clamped(
                config_keys::REGION_MAPPING_OVERLAY_TTL_SECS,
                DEFAULT_OVERLAY_TTL_SECS,
                60,
                7 * 24 * 3600,
            )?,
            distance_cache_ttl_hours: self.get_clamped(
                config_keys::DISTANCE_CACHE_TTL_HOURS,
                DEFAULT_CACHE_TTL_HOURS,
                1,
                168,
            )?,
            distance_csv_path: (!csv_path.is_empty()).then_some(csv_path),
            legacy_param_compat: self.get_bool(config_keys::LEGACY_PARAM_COMPAT, true)?,
            prefer_csv_region: self.get_bool(config_keys::PREFER_CSV_REGION, true)?,
            booking_base_url: self.get_string(config_keys::BOOKING_BASE_URL)?,
            signing_secret: self.get_string(config_keys::SIGNING_SECRET)?,
            region_rules: self.get_json(config_keys::REGION_RULES)?,
            region_anchors: self.get_json(config_keys::REGION_ANCHORS)?,
            region_days: self.get_json(config_keys::REGION_DAYS)?,
            priority_lists: self.get_json(config_keys::PRIORITY_LISTS)?,
            calendar_ids: self.get_json(config_keys::CALENDAR_IDS)?,
            default_teams: self.get_json(config_keys::DEFAULT_TEAMS)?,
            region_aliases: self.get_json(config_keys::REGION_ALIASES)?,
            phone_only_categories: self.get_csv_list(config_keys::PHONE_ONLY_CATEGORIES, &[])?,
            montage_categories: self.get_csv_list(config_keys::MONTAGE_CATEGORIES, &["montage"])?,
            etage_categories: self.get_csv_list(config_keys::ETAGE_CATEGORIES, &["etage"])?,
            trigger_statuses: self.get_csv_list(config_keys::TRIGGER_STATUSES, &["processing"])?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 路由
    pub const HORIZON_DAYS: &str = "horizon_days";
    pub const RR_THRESHOLD_MINUTES: &str = "rr_threshold_minutes";
    pub const COUNTER_RETENTION_DAYS: &str = "counter_retention_days";

    // 时段
    pub const MONTAGE_DURATION: &str = "montage_duration";
    pub const ETAGE_DURATION: &str = "etage_duration";

    // 预约链接
    pub const TOKEN_TTL_HOURS: &str = "token_ttl_hours";
    pub const LEGACY_PARAM_COMPAT: &str = "legacy_param_compat";
    pub const BOOKING_BASE_URL: &str = "booking_base_url";
    pub const SIGNING_SECRET: &str = "signing_secret";

    // 车程表
    pub const DISTANCE_CSV_PATH: &str = "distance_csv_path";
    pub const DISTANCE_CACHE_TTL_HOURS: &str = "distance_cache_ttl_hours";

    // 区域 (JSON)
    pub const REGION_RULES: &str = "region_rules";
    pub const REGION_ANCHORS: &str = "region_anchors";
    pub const REGION_DAYS: &str = "region_days";
    pub const REGION_ALIASES: &str = "region_aliases";
    pub const REGION_MAPPING_OVERLAY_TTL_SECS: &str = "region_mapping_overlay_ttl_secs";
    pub const PREFER_CSV_REGION: &str = "prefer_csv_region";

    // 团队 (JSON)
    pub const PRIORITY_LISTS: &str = "priority_lists";
    pub const CALENDAR_IDS: &str = "calendar_ids";
    pub const DEFAULT_TEAMS: &str = "default_teams";

    // 订单 (逗号分隔)
    pub const PHONE_ONLY_CATEGORIES: &str = "phone_only_categories";
    pub const MONTAGE_CATEGORIES: &str = "montage_categories";
    pub const ETAGE_CATEGORIES: &str = "etage_categories";
    pub const TRIGGER_STATUSES: &str = "trigger_statuses";
}
