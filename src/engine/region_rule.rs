// ==========================================
// 上门安装预约路由系统 - 区域规则匹配器
// ==========================================
// 每种规则类型一个实现:
//   CantonRule   - 州代码白名单
//   PrefixRule   - 邮编前缀
//   MetricRule   - 州白名单 + 车程/距离闭区间（所有已配置约束同时满足）
//   FallbackRule - 最近锚点（无锚点时不命中）
// ==========================================

use crate::domain::postcode::{normalize_postcode, PostcodeRecord};
use crate::domain::region::{NumericRange, RegionAnchor, RegionRule};
use crate::domain::types::RuleType;

/// 地球平均半径（公里）
const EARTH_RADIUS_KM: f64 = 6371.0;

/// 单条规则的命中结果
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub region: String,
    pub detail: String,
}

// ==========================================
// Trait: RegionRuleMatcher
// ==========================================
pub trait RegionRuleMatcher: Send + Sync {
    fn rule(&self) -> &RegionRule;

    /// 评估一行数据，命中时返回区域与说明
    fn evaluate(&self, row: &PostcodeRecord) -> Option<RuleMatch>;

    /// 规则配置的可读描述
    fn describe(&self) -> String;

    fn matches(&self, row: &PostcodeRecord) -> bool {
        self.evaluate(row).is_some()
    }
}

/// 按规则类型构造匹配器
pub fn build_matcher(rule: RegionRule, anchors: &[RegionAnchor]) -> Box<dyn RegionRuleMatcher> {
    match rule.rule_type {
        RuleType::Canton => Box::new(CantonRule::new(rule)),
        RuleType::PlzPrefix => Box::new(PrefixRule::new(rule)),
        RuleType::Metric => Box::new(MetricRule::new(rule)),
        RuleType::Fallback => Box::new(FallbackRule::new(rule, anchors.to_vec())),
    }
}

fn normalize_cantons(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

fn row_canton(row: &PostcodeRecord) -> Option<String> {
    row.canton
        .as_deref()
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
}

// ==========================================
// CantonRule
// ==========================================
pub struct CantonRule {
    rule: RegionRule,
    cantons: Vec<String>,
}

impl CantonRule {
    pub fn new(rule: RegionRule) -> Self {
        let cantons = normalize_cantons(&rule.config.cantons);
        Self { rule, cantons }
    }
}

impl RegionRuleMatcher for CantonRule {
    fn rule(&self) -> &RegionRule {
        &self.rule
    }

    fn evaluate(&self, row: &PostcodeRecord) -> Option<RuleMatch> {
        let canton = row_canton(row)?;
        if !self.cantons.contains(&canton) {
            return None;
        }
        Some(RuleMatch {
            region: self.rule.region.clone(),
            detail: format!("canton {} ∈ [{}]", canton, self.cantons.join(", ")),
        })
    }

    fn describe(&self) -> String {
        format!("canton ∈ [{}] → {}", self.cantons.join(", "), self.rule.region)
    }
}

// ==========================================
// PrefixRule
// ==========================================
pub struct PrefixRule {
    rule: RegionRule,
    prefixes: Vec<String>,
}

impl PrefixRule {
    pub fn new(rule: RegionRule) -> Self {
        let prefixes = rule
            .config
            .prefixes
            .iter()
            .map(|p| normalize_postcode(p))
            .filter(|p| !p.is_empty())
            .collect();
        Self { rule, prefixes }
    }
}

impl RegionRuleMatcher for PrefixRule {
    fn rule(&self) -> &RegionRule {
        &self.rule
    }

    fn evaluate(&self, row: &PostcodeRecord) -> Option<RuleMatch> {
        let prefix = self
            .prefixes
            .iter()
            .find(|p| row.postcode.starts_with(p.as_str()))?;
        Some(RuleMatch {
            region: self.rule.region.clone(),
            detail: format!("plz {} starts with {}", row.postcode, prefix),
        })
    }

    fn describe(&self) -> String {
        format!("plz prefix ∈ [{}] → {}", self.prefixes.join(", "), self.rule.region)
    }
}

// ==========================================
// MetricRule
// ==========================================
pub struct MetricRule {
    rule: RegionRule,
    cantons: Vec<String>,
    minutes: Option<NumericRange>,
    distance_km: Option<NumericRange>,
}

impl MetricRule {
    pub fn new(rule: RegionRule) -> Self {
        let cantons = normalize_cantons(&rule.config.cantons);
        let minutes = rule.config.minutes;
        let distance_km = rule.config.distance_km;
        Self {
            rule,
            cantons,
            minutes,
            distance_km,
        }
    }
}

fn describe_range(name: &str, range: &NumericRange) -> String {
    let min = range.min.map(|v| v.to_string()).unwrap_or_else(|| "-∞".to_string());
    let max = range.max.map(|v| v.to_string()).unwrap_or_else(|| "∞".to_string());
    format!("{} ∈ [{}, {}]", name, min, max)
}

impl RegionRuleMatcher for MetricRule {
    fn rule(&self) -> &RegionRule {
        &self.rule
    }

    fn evaluate(&self, row: &PostcodeRecord) -> Option<RuleMatch> {
        let mut parts = Vec::new();

        if !self.cantons.is_empty() {
            let canton = row_canton(row)?;
            if !self.cantons.contains(&canton) {
                return None;
            }
            parts.push(format!("canton {}", canton));
        }

        if let Some(range) = &self.minutes {
            let minutes = row.minutes? as f64;
            if !range.contains(minutes) {
                return None;
            }
            parts.push(format!("minutes {}", minutes));
        }

        if let Some(range) = &self.distance_km {
            let km = row.distance_km?;
            if !range.contains(km) {
                return None;
            }
            parts.push(format!("km {}", km));
        }

        Some(RuleMatch {
            region: self.rule.region.clone(),
            detail: if parts.is_empty() {
                "metric (no constraints)".to_string()
            } else {
                parts.join(", ")
            },
        })
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.cantons.is_empty() {
            parts.push(format!("canton ∈ [{}]", self.cantons.join(", ")));
        }
        if let Some(range) = &self.minutes {
            parts.push(describe_range("minutes", range));
        }
        if let Some(range) = &self.distance_km {
            parts.push(describe_range("km", range));
        }
        format!("metric {} → {}", parts.join(" ∧ "), self.rule.region)
    }
}

// ==========================================
// FallbackRule
// ==========================================
pub struct FallbackRule {
    rule: RegionRule,
    anchors: Vec<RegionAnchor>,
}

impl FallbackRule {
    pub fn new(rule: RegionRule, anchors: Vec<RegionAnchor>) -> Self {
        Self { rule, anchors }
    }
}

impl RegionRuleMatcher for FallbackRule {
    fn rule(&self) -> &RegionRule {
        &self.rule
    }

    fn evaluate(&self, row: &PostcodeRecord) -> Option<RuleMatch> {
        let (anchor, score, method) = nearest_anchor(row, &self.anchors)?;
        Some(RuleMatch {
            region: anchor.slug.clone(),
            detail: format!("nearest anchor {} ({} {:.1})", anchor.slug, method, score),
        })
    }

    fn describe(&self) -> String {
        let slugs: Vec<&str> = self.anchors.iter().map(|a| a.slug.as_str()).collect();
        format!("fallback nearest of [{}]", slugs.join(", "))
    }
}

/// 两点间大圆距离（公里）
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lng1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lng2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlng = lng2 - lng1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// 最近锚点
///
/// 评分: 两端都有经纬度 → 大圆距离；否则 |radius_km - 行距离|；都没有 → 0
/// 同分时取先出现的锚点
pub fn nearest_anchor<'a>(
    row: &PostcodeRecord,
    anchors: &'a [RegionAnchor],
) -> Option<(&'a RegionAnchor, f64, &'static str)> {
    let row_coords = row.coordinates();
    let mut best: Option<(&RegionAnchor, f64, &'static str)> = None;

    for anchor in anchors {
        let anchor_coords = match (anchor.lat, anchor.lng) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        };

        let (score, method) = match (row_coords, anchor_coords, anchor.radius_km, row.distance_km) {
            (Some(r), Some(a), _, _) => (haversine_km(r, a), "haversine_km"),
            (_, _, Some(radius), Some(distance)) => ((radius - distance).abs(), "radius_delta_km"),
            _ => (0.0, "tie"),
        };

        let better = match best {
            Some((_, best_score, _)) => score < best_score,
            None => true,
        };
        if better {
            best = Some((anchor, score, method));
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::region::RuleConfig;

    fn rule(rule_type: RuleType, region: &str, config: RuleConfig) -> RegionRule {
        RegionRule {
            id: format!("{}-{}", rule_type, region),
            rule_type,
            region: region.to_string(),
            priority: 10,
            enabled: true,
            config,
        }
    }

    fn row(postcode: &str, minutes: i32, canton: Option<&str>) -> PostcodeRecord {
        let mut r = PostcodeRecord::new(postcode, minutes);
        r.canton = canton.map(|c| c.to_string());
        r
    }

    fn anchor(slug: &str, radius_km: Option<f64>, coords: Option<(f64, f64)>) -> RegionAnchor {
        RegionAnchor {
            slug: slug.to_string(),
            lat: coords.map(|c| c.0),
            lng: coords.map(|c| c.1),
            radius_km,
        }
    }

    #[test]
    fn test_canton_rule_is_case_insensitive() {
        let m = CantonRule::new(rule(
            RuleType::Canton,
            "zuerich_limmattal",
            RuleConfig {
                cantons: vec!["zh".to_string()],
                ..Default::default()
            },
        ));
        assert!(m.matches(&row("8000", 25, Some("Zh"))));
        assert!(!m.matches(&row("4051", 18, Some("BS"))));
        assert!(!m.matches(&row("4051", 18, None)));
    }

    #[test]
    fn test_prefix_rule() {
        let m = PrefixRule::new(rule(
            RuleType::PlzPrefix,
            "basel_fricktal",
            RuleConfig {
                prefixes: vec!["40".to_string(), "43".to_string()],
                ..Default::default()
            },
        ));
        let hit = m.evaluate(&row("4310", 22, None)).unwrap();
        assert_eq!(hit.region, "basel_fricktal");
        assert!(!m.matches(&row("5000", 30, None)));
    }

    #[test]
    fn test_metric_rule_all_constraints() {
        let m = MetricRule::new(rule(
            RuleType::Metric,
            "mittelland_west",
            RuleConfig {
                cantons: vec!["BE".to_string(), "SO".to_string()],
                minutes: Some(NumericRange {
                    min: Some(0.0),
                    max: Some(45.0),
                }),
                ..Default::default()
            },
        ));
        assert!(m.matches(&row("3000", 45, Some("BE"))));
        assert!(!m.matches(&row("3000", 46, Some("BE"))));
        assert!(!m.matches(&row("8000", 20, Some("ZH"))));

        // 需询价的行没有车程，车程区间不成立
        let mut on_request = row("3920", 0, Some("BE"));
        on_request.minutes = None;
        assert!(!m.matches(&on_request));
    }

    #[test]
    fn test_metric_distance_range_requires_value() {
        let m = MetricRule::new(rule(
            RuleType::Metric,
            "mittelland_west",
            RuleConfig {
                distance_km: Some(NumericRange {
                    min: None,
                    max: Some(50.0),
                }),
                ..Default::default()
            },
        ));
        let mut r = row("3000", 30, None);
        assert!(!m.matches(&r));
        r.distance_km = Some(49.9);
        assert!(m.matches(&r));
    }

    #[test]
    fn test_fallback_radius_delta() {
        let anchors = vec![
            anchor("mittelland_west", Some(60.0), None),
            anchor("basel_fricktal", Some(30.0), None),
        ];
        let mut r = row("4600", 35, None);
        r.distance_km = Some(20.0);
        let (best, score, _) = nearest_anchor(&r, &anchors).unwrap();
        assert_eq!(best.slug, "basel_fricktal");
        assert!((score - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_haversine_preferred_when_coordinates_present() {
        let anchors = vec![
            anchor("zuerich_limmattal", Some(0.0), Some((47.3769, 8.5417))),
            anchor("basel_fricktal", Some(500.0), Some((47.5596, 7.5886))),
        ];
        let mut r = row("4051", 18, None);
        r.lat = Some(47.55);
        r.lng = Some(7.59);
        r.distance_km = Some(0.0);
        let (best, _, method) = nearest_anchor(&r, &anchors).unwrap();
        assert_eq!(best.slug, "basel_fricktal");
        assert_eq!(method, "haversine_km");
    }

    #[test]
    fn test_fallback_tie_takes_first_and_empty_never_matches() {
        let anchors = vec![anchor("a_region", None, None), anchor("b_region", None, None)];
        let r = row("1000", 10, None);
        assert_eq!(nearest_anchor(&r, &anchors).unwrap().0.slug, "a_region");

        let m = FallbackRule::new(rule(RuleType::Fallback, "", RuleConfig::default()), vec![]);
        assert!(!m.matches(&r));
    }

    #[test]
    fn test_haversine_basel_zurich() {
        let km = haversine_km((47.5596, 7.5886), (47.3769, 8.5417));
        assert!((km - 74.5).abs() < 2.0, "got {km}");
    }
}
