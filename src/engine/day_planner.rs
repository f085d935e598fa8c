// ==========================================
// 上门安装预约路由系统 - 区域日历规划
// ==========================================
// 规则:
// - 区域未配置或所有星期均未勾选 → 7 天全部允许（放行，避免缺配置导致无法预约）
// - 下一可约日期逐日扫描，最多 max_iterations 天；找不到说明配置有问题
// - 并发团队数限定在 [1, 4]；区域无日历配置时不限制团队列表
// ==========================================

use crate::domain::region::RegionDayConfig;
use crate::domain::types::weekday_key_to_iso;
use crate::engine::canonical::RegionAliases;
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::{BTreeSet, HashMap};

/// 默认最大扫描天数
pub const DEFAULT_MAX_ITERATIONS: u32 = 120;

pub const MIN_TEAMS: i32 = 1;
pub const MAX_TEAMS: i32 = 4;

const ALL_DAYS: [u32; 7] = [1, 2, 3, 4, 5, 6, 7];

// ==========================================
// RegionDayPlanner - 区域日历规划
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct RegionDayPlanner {
    configs: HashMap<String, RegionDayConfig>,
}

impl RegionDayPlanner {
    /// # 参数
    /// - configs: 区域代码 → 配置（区域代码在此规范化）
    pub fn new(configs: HashMap<String, RegionDayConfig>, aliases: &RegionAliases) -> Self {
        let configs = configs
            .into_iter()
            .map(|(region, cfg)| (aliases.canonical(&region), cfg))
            .collect();
        Self { configs }
    }

    /// 允许的 ISO 星期（1=周一..7=周日），升序去重
    pub fn allowed_days(&self, region: &str) -> Vec<u32> {
        let Some(cfg) = self.configs.get(region) else {
            return ALL_DAYS.to_vec();
        };

        let days: BTreeSet<u32> = cfg
            .days
            .iter()
            .filter(|(_, enabled)| **enabled)
            .filter_map(|(key, _)| weekday_key_to_iso(key))
            .collect();

        if days.is_empty() {
            return ALL_DAYS.to_vec();
        }
        days.into_iter().collect()
    }

    /// 从 from（含）起查找下一可约日期
    ///
    /// # 返回
    /// - Some(date): 找到
    /// - None: max_iterations 天内无可约日期（配置问题，调用方不应重试）
    pub fn next_allowed_date(
        &self,
        region: &str,
        from: NaiveDate,
        max_iterations: u32,
    ) -> Option<NaiveDate> {
        let allowed = self.allowed_days(region);
        let mut date = from;
        for _ in 0..max_iterations {
            if allowed.contains(&date.weekday().number_from_monday()) {
                return Some(date);
            }
            date = date.checked_add_signed(Duration::days(1))?;
        }
        None
    }

    /// 区域并发团队数，限定 [1, 4]，未配置为 1
    pub fn max_teams(&self, region: &str) -> usize {
        self.configs
            .get(region)
            .and_then(|c| c.max_teams)
            .unwrap_or(MIN_TEAMS)
            .clamp(MIN_TEAMS, MAX_TEAMS) as usize
    }

    /// 团队列表截断上限
    ///
    /// # 返回
    /// - Some(n): 区域有日历配置，取 max_teams
    /// - None: 区域未配置，不截断
    pub fn team_limit(&self, region: &str) -> Option<usize> {
        self.configs
            .contains_key(region)
            .then(|| self.max_teams(region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(region: &str, cfg: RegionDayConfig) -> RegionDayPlanner {
        let mut configs = HashMap::new();
        configs.insert(region.to_string(), cfg);
        RegionDayPlanner::new(configs, &RegionAliases::default())
    }

    #[test]
    fn test_all_flags_false_allows_every_day() {
        let mut cfg = RegionDayConfig::default();
        for key in crate::domain::types::WEEKDAY_KEYS {
            cfg.days.insert(key.to_string(), false);
        }
        let p = planner("basel_fricktal", cfg);
        assert_eq!(p.allowed_days("basel_fricktal"), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_unknown_region_allows_every_day() {
        let p = RegionDayPlanner::default();
        assert_eq!(p.allowed_days("nowhere"), vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(p.max_teams("nowhere"), 1);
        assert_eq!(p.team_limit("nowhere"), None);
    }

    #[test]
    fn test_weekday_template() {
        let p = planner("zuerich_limmattal", RegionDayConfig::weekdays(2));
        assert_eq!(p.allowed_days("zuerich_limmattal"), vec![1, 2, 3, 4, 5]);

        // 2026-03-07 是周六 → 下一个可约日为周一 3/9
        let sat = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(
            p.next_allowed_date("zuerich_limmattal", sat, DEFAULT_MAX_ITERATIONS),
            NaiveDate::from_ymd_opt(2026, 3, 9)
        );
        // 起始日本身可约时返回起始日
        let mon = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(p.next_allowed_date("zuerich_limmattal", mon, 1), Some(mon));
    }

    #[test]
    fn test_iteration_bound() {
        let mut cfg = RegionDayConfig::default();
        cfg.days.insert("sun".to_string(), true);
        let p = planner("r", cfg);
        let mon = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert_eq!(p.next_allowed_date("r", mon, 6), None);
        assert_eq!(p.next_allowed_date("r", mon, 7), NaiveDate::from_ymd_opt(2026, 3, 15));
    }

    #[test]
    fn test_max_teams_clamped() {
        let p = planner("a", RegionDayConfig::weekdays(9));
        assert_eq!(p.max_teams("a"), 4);
        let p = planner("b", RegionDayConfig::weekdays(0));
        assert_eq!(p.max_teams("b"), 1);
        assert_eq!(p.team_limit("b"), Some(1));
    }

    #[test]
    fn test_region_keys_are_canonicalized() {
        let p = planner("Basel", RegionDayConfig::weekdays(3));
        assert_eq!(p.max_teams("basel_fricktal"), 3);
    }
}
