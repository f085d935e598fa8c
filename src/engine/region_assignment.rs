// ==========================================
// 上门安装预约路由系统 - 区域分配引擎
// ==========================================
// 规则: 仅启用规则参与；priority 升序（同值保持声明顺序）；首个命中即返回
// CSV 行自带 region 时优先采用（可关闭）
// 全部未命中: region = "", strategy = none
// ==========================================

use crate::domain::postcode::PostcodeRecord;
use crate::domain::region::{RegionAnchor, RegionAssignment, RegionRule};
use crate::domain::types::{AssignmentStrategy, RuleType};
use crate::engine::canonical::RegionAliases;
use crate::engine::region_rule::{build_matcher, RegionRuleMatcher};
use tracing::instrument;

/// 规则解释行（CLI region 命令输出）
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTrace {
    pub rule_id: String,
    pub priority: i32,
    pub description: String,
    pub matched: bool,
}

// ==========================================
// RegionAssignmentEngine - 区域分配引擎
// ==========================================
pub struct RegionAssignmentEngine {
    matchers: Vec<Box<dyn RegionRuleMatcher>>,
    prefer_csv_region: bool,
}

impl RegionAssignmentEngine {
    /// 构造引擎
    ///
    /// # 参数
    /// - rules: 规则列表（任意顺序，禁用规则会被丢弃）
    /// - anchors: 兜底锚点
    /// - aliases: 区域别名（规则与锚点的区域代码在此规范化）
    pub fn new(rules: Vec<RegionRule>, anchors: Vec<RegionAnchor>, aliases: &RegionAliases) -> Self {
        let anchors: Vec<RegionAnchor> = anchors
            .into_iter()
            .map(|mut a| {
                a.slug = aliases.canonical(&a.slug);
                a
            })
            .filter(|a| !a.slug.is_empty())
            .collect();

        let mut enabled: Vec<RegionRule> = rules
            .into_iter()
            .filter(|r| r.enabled)
            .map(|mut r| {
                r.region = aliases.canonical(&r.region);
                r
            })
            .collect();
        // sort_by_key 为稳定排序，同优先级保持声明顺序
        enabled.sort_by_key(|r| r.priority);

        let matchers = enabled
            .into_iter()
            .map(|rule| build_matcher(rule, &anchors))
            .collect();

        Self {
            matchers,
            prefer_csv_region: true,
        }
    }

    /// 是否优先采用 CSV 行自带的 region 列
    pub fn with_csv_region(mut self, prefer: bool) -> Self {
        self.prefer_csv_region = prefer;
        self
    }

    pub fn rule_count(&self) -> usize {
        self.matchers.len()
    }

    /// 分配区域
    #[instrument(skip(self, row), fields(postcode = %row.postcode))]
    pub fn assign(&self, row: &PostcodeRecord) -> RegionAssignment {
        if self.prefer_csv_region && !row.region.is_empty() {
            return RegionAssignment {
                region: row.region.clone(),
                rule: Some("csv".to_string()),
                strategy: AssignmentStrategy::Csv,
                matched: true,
                detail: "region column".to_string(),
            };
        }

        for matcher in &self.matchers {
            if let Some(hit) = matcher.evaluate(row) {
                let strategy = if matcher.rule().rule_type == RuleType::Fallback {
                    AssignmentStrategy::Fallback
                } else {
                    AssignmentStrategy::Rule
                };
                tracing::debug!(rule = %matcher.rule().id, region = %hit.region, "区域规则命中");
                return RegionAssignment {
                    region: hit.region,
                    rule: Some(matcher.rule().id.clone()),
                    strategy,
                    matched: true,
                    detail: hit.detail,
                };
            }
        }

        tracing::debug!("无区域规则命中");
        RegionAssignment::none()
    }

    /// 逐条解释规则（不短路，用于排查）
    pub fn explain(&self, row: &PostcodeRecord) -> Vec<RuleTrace> {
        self.matchers
            .iter()
            .map(|m| RuleTrace {
                rule_id: m.rule().id.clone(),
                priority: m.rule().priority,
                description: m.describe(),
                matched: m.matches(row),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::region::RuleConfig;

    fn canton_rule(id: &str, region: &str, priority: i32, cantons: &[&str]) -> RegionRule {
        RegionRule {
            id: id.to_string(),
            rule_type: RuleType::Canton,
            region: region.to_string(),
            priority,
            enabled: true,
            config: RuleConfig {
                cantons: cantons.iter().map(|c| c.to_string()).collect(),
                ..Default::default()
            },
        }
    }

    fn zh_row() -> PostcodeRecord {
        let mut r = PostcodeRecord::new("8000", 25);
        r.canton = Some("ZH".to_string());
        r
    }

    #[test]
    fn test_lower_priority_wins_regardless_of_order() {
        let rules = vec![
            canton_rule("late", "mittelland_west", 50, &["ZH"]),
            canton_rule("early", "zuerich_limmattal", 5, &["ZH"]),
        ];
        let engine = RegionAssignmentEngine::new(rules, vec![], &RegionAliases::default());
        let a = engine.assign(&zh_row());
        assert_eq!(a.region, "zuerich_limmattal");
        assert_eq!(a.rule.as_deref(), Some("early"));
        assert_eq!(a.strategy, AssignmentStrategy::Rule);
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let mut disabled = canton_rule("off", "mittelland_west", 1, &["ZH"]);
        disabled.enabled = false;
        let rules = vec![disabled, canton_rule("on", "zuerich", 2, &["ZH"])];
        let engine = RegionAssignmentEngine::new(rules, vec![], &RegionAliases::default());
        assert_eq!(engine.rule_count(), 1);
        // 规则区域经别名规范化
        assert_eq!(engine.assign(&zh_row()).region, "zuerich_limmattal");
    }

    #[test]
    fn test_no_match_returns_empty_region() {
        let engine = RegionAssignmentEngine::new(
            vec![canton_rule("bs", "basel_fricktal", 1, &["BS"])],
            vec![],
            &RegionAliases::default(),
        );
        let a = engine.assign(&zh_row());
        assert_eq!(a, RegionAssignment::none());
        assert_eq!(a.strategy.to_string(), "none");
    }

    #[test]
    fn test_csv_region_preferred_and_switchable() {
        let mut row = zh_row();
        row.region = "basel_fricktal".to_string();
        let rules = vec![canton_rule("zh", "zuerich_limmattal", 1, &["ZH"])];

        let engine = RegionAssignmentEngine::new(rules.clone(), vec![], &RegionAliases::default());
        assert_eq!(engine.assign(&row).strategy, AssignmentStrategy::Csv);

        let engine = RegionAssignmentEngine::new(rules, vec![], &RegionAliases::default())
            .with_csv_region(false);
        assert_eq!(engine.assign(&row).region, "zuerich_limmattal");
    }

    #[test]
    fn test_explain_lists_every_rule() {
        let engine = RegionAssignmentEngine::new(
            vec![
                canton_rule("bs", "basel_fricktal", 1, &["BS"]),
                canton_rule("zh", "zuerich_limmattal", 2, &["ZH"]),
            ],
            vec![],
            &RegionAliases::default(),
        );
        let trace = engine.explain(&zh_row());
        assert_eq!(trace.len(), 2);
        assert!(!trace[0].matched);
        assert!(trace[1].matched);
    }
}
