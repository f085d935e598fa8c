// ==========================================
// 上门安装预约路由系统 - 区域领域模型
// ==========================================
// 区域规则 / 锚点 / 分配结果 / 区域日历配置 / 映射表
// ==========================================

use crate::domain::types::{AssignmentStrategy, RuleType, WEEKDAY_KEYS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ==========================================
// RegionRule - 区域规则
// ==========================================
// 按 priority 升序评估，首个命中即返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRule {
    pub id: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub region: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: RuleConfig,
}

fn default_enabled() -> bool {
    true
}

/// 规则配置（按规则类型取用不同字段，未用字段保持为空）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub cantons: Vec<String>,
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default)]
    pub minutes: Option<NumericRange>,
    #[serde(default)]
    pub distance_km: Option<NumericRange>,
}

/// 闭区间数值范围（任一端可缺省）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl NumericRange {
    pub fn contains(&self, value: f64) -> bool {
        if let Some(min) = self.min {
            if value < min {
                return false;
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return false;
            }
        }
        true
    }
}

// ==========================================
// RegionAnchor - 区域锚点
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionAnchor {
    pub slug: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub radius_km: Option<f64>,
}

// ==========================================
// RegionAssignment - 区域分配结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionAssignment {
    pub region: String,
    pub rule: Option<String>,
    pub strategy: AssignmentStrategy,
    pub matched: bool,
    /// 命中说明（例如 "canton ZH ∈ [ZH, AG]"）
    pub detail: String,
}

impl RegionAssignment {
    pub fn none() -> Self {
        Self {
            region: String::new(),
            rule: None,
            strategy: AssignmentStrategy::None,
            matched: false,
            detail: String::new(),
        }
    }
}

// ==========================================
// RegionDayConfig - 区域日历/团队数配置
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionDayConfig {
    #[serde(default)]
    pub days: BTreeMap<String, bool>,
    #[serde(default)]
    pub max_teams: Option<i32>,
}

impl RegionDayConfig {
    /// 工作日模板（周一至周五）
    pub fn weekdays(max_teams: i32) -> Self {
        let days = WEEKDAY_KEYS
            .iter()
            .enumerate()
            .map(|(idx, key)| (key.to_string(), idx < 5))
            .collect();
        Self {
            days,
            max_teams: Some(max_teams),
        }
    }
}

// ==========================================
// RegionMapping - 邮编→区域 批量映射表
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub region: String,
    pub strategy: AssignmentStrategy,
    pub rule: Option<String>,
}

impl From<&RegionAssignment> for MappingEntry {
    fn from(a: &RegionAssignment) -> Self {
        Self {
            region: a.region.clone(),
            strategy: a.strategy,
            rule: a.rule.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingStats {
    pub total: usize,
    pub unassigned: usize,
    pub by_strategy: BTreeMap<String, usize>,
    pub by_region: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMapping {
    pub updated_at: DateTime<Utc>,
    pub entries: HashMap<String, MappingEntry>,
    pub stats: MappingStats,
}

impl RegionMapping {
    pub fn build(entries: HashMap<String, MappingEntry>, updated_at: DateTime<Utc>) -> Self {
        let mut stats = MappingStats {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries.values() {
            *stats
                .by_strategy
                .entry(entry.strategy.to_string())
                .or_insert(0) += 1;
            if entry.region.is_empty() {
                stats.unassigned += 1;
            } else {
                *stats.by_region.entry(entry.region.clone()).or_insert(0) += 1;
            }
        }
        Self {
            updated_at,
            entries,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_range_inclusive() {
        let range = NumericRange {
            min: Some(10.0),
            max: Some(30.0),
        };
        assert!(range.contains(10.0));
        assert!(range.contains(30.0));
        assert!(!range.contains(30.5));
        assert!(NumericRange::default().contains(-5.0));
    }

    #[test]
    fn test_rule_deserialize_defaults() {
        let raw = r#"{"id":"r1","type":"canton","region":"zuerich_limmattal","config":{"cantons":["ZH"]}}"#;
        let rule: RegionRule = serde_json::from_str(raw).unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.priority, 0);
        assert_eq!(rule.rule_type, RuleType::Canton);
        assert_eq!(rule.config.cantons, vec!["ZH".to_string()]);
    }

    #[test]
    fn test_mapping_stats() {
        let mut entries = HashMap::new();
        entries.insert(
            "8000".to_string(),
            MappingEntry {
                region: "zuerich_limmattal".to_string(),
                strategy: AssignmentStrategy::Rule,
                rule: Some("r1".to_string()),
            },
        );
        entries.insert(
            "9999".to_string(),
            MappingEntry {
                region: String::new(),
                strategy: AssignmentStrategy::None,
                rule: None,
            },
        );
        let mapping = RegionMapping::build(entries, Utc::now());
        assert_eq!(mapping.stats.total, 2);
        assert_eq!(mapping.stats.unassigned, 1);
        assert_eq!(mapping.stats.by_region.get("zuerich_limmattal"), Some(&1));
    }
}
