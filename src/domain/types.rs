// ==========================================
// 上门安装预约路由系统 - 领域类型定义
// ==========================================
// 服务类型 / 规则类型 / 分配策略 / 路由策略
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 服务类型 (Service Type)
// ==========================================
// Montage: 完整安装，独占时段
// Etage: 楼层送货，同一时段最多 2 单共存
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Montage,
    Etage,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Montage => "montage",
            ServiceType::Etage => "etage",
        }
    }

    /// 从字符串解析（大小写不敏感，兼容旧参数 m/e）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "montage" | "m" | "sgm" => Some(ServiceType::Montage),
            "etage" | "e" | "sge" => Some(ServiceType::Etage),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 区域规则类型 (Region Rule Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Canton,    // 州代码匹配
    PlzPrefix, // 邮编前缀匹配
    Metric,    // 车程/距离区间匹配
    Fallback,  // 最近锚点兜底
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::Canton => write!(f, "canton"),
            RuleType::PlzPrefix => write!(f, "plz_prefix"),
            RuleType::Metric => write!(f, "metric"),
            RuleType::Fallback => write!(f, "fallback"),
        }
    }
}

// ==========================================
// 区域分配策略 (Assignment Strategy)
// ==========================================
// 记录区域是通过哪条路径得出的，用于解释与统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    Csv,      // CSV 行自带 region 列
    Rule,     // 规则命中 (canton / plz_prefix / metric)
    Fallback, // 最近锚点
    None,     // 未命中
}

impl fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentStrategy::Csv => write!(f, "csv"),
            AssignmentStrategy::Rule => write!(f, "rule"),
            AssignmentStrategy::Fallback => write!(f, "fallback"),
            AssignmentStrategy::None => write!(f, "none"),
        }
    }
}

// ==========================================
// 路由策略标签 (Route Strategy)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteStrategy {
    Rr,       // 轮询（车程低于阈值）
    Priority, // 静态优先级
    Fallback, // 区域未配置优先级，使用全局默认团队
}

impl fmt::Display for RouteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteStrategy::Rr => write!(f, "rr"),
            RouteStrategy::Priority => write!(f, "priority"),
            RouteStrategy::Fallback => write!(f, "fallback"),
        }
    }
}

// ==========================================
// 星期键 (Weekday Key)
// ==========================================
// 配置里使用 mon..sun，引擎内部使用 ISO 序号 1..7

pub const WEEKDAY_KEYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// 星期键 → ISO 序号（1=周一 .. 7=周日）
pub fn weekday_key_to_iso(key: &str) -> Option<u32> {
    let key = key.trim().to_lowercase();
    // 兼容完整英文/德文写法的前缀
    let short = match key.as_str() {
        "mo" | "montag" => "mon",
        "di" | "dienstag" => "tue",
        "mi" | "mittwoch" => "wed",
        "do" | "donnerstag" => "thu",
        "fr" | "freitag" => "fri",
        "sa" | "samstag" => "sat",
        "so" | "sonntag" => "sun",
        other => other.get(..3).unwrap_or(other),
    };
    WEEKDAY_KEYS
        .iter()
        .position(|k| *k == short)
        .map(|idx| idx as u32 + 1)
}
