// ==========================================
// 区域分配集成测试
// ==========================================
// 输入来自真实 CSV 解析结果，规则由 JSON 配置反序列化
// ==========================================

use booking_router::domain::{RegionAnchor, RegionRule};
use booking_router::engine::{RegionAliases, RegionAssignmentEngine};
use booking_router::importer::parse_distance_csv;
use booking_router::AssignmentStrategy;

const TABLE: &str = "plz;fahrzeit_min;kanton;distanz_km\n\
8000;25;ZH;18\n\
4312;40;AG;12\n\
3000;55;BE;38\n\
1200;180;GE;250\n";

fn rules() -> Vec<RegionRule> {
    serde_json::from_str(
        r#"[
            {"id":"fallback","type":"fallback","region":"","priority":1000},
            {"id":"zh","type":"canton","region":"Zürich","priority":10,"config":{"cantons":["zh"]}},
            {"id":"near","type":"metric","region":"mittelland","priority":500,
             "config":{"minutes":{"max":60}}},
            {"id":"zh_dup","type":"canton","region":"basel","priority":20,"config":{"cantons":["ZH"]}}
        ]"#,
    )
    .unwrap()
}

fn anchors() -> Vec<RegionAnchor> {
    serde_json::from_str(
        r#"[
            {"slug":"basel_fricktal","radius_km":10},
            {"slug":"Mittelland-West","radius_km":40}
        ]"#,
    )
    .unwrap()
}

fn engine() -> RegionAssignmentEngine {
    RegionAssignmentEngine::new(rules(), anchors(), &RegionAliases::default())
}

#[test]
fn test_canton_rule_with_lowest_priority_wins() {
    let aliases = RegionAliases::default();
    let table = parse_distance_csv(TABLE, "plz.csv", &aliases).unwrap();
    let a = engine().assign(table.get("8000").unwrap());

    assert_eq!(a.region, "zuerich_limmattal");
    assert_eq!(a.rule.as_deref(), Some("zh"));
    assert_eq!(a.strategy, AssignmentStrategy::Rule);
}

#[test]
fn test_metric_rule_before_fallback() {
    let aliases = RegionAliases::default();
    let table = parse_distance_csv(TABLE, "plz.csv", &aliases).unwrap();
    let a = engine().assign(table.get("3000").unwrap());
    assert_eq!(a.region, "mittelland_west");
    assert_eq!(a.rule.as_deref(), Some("near"));
}

#[test]
fn test_radius_fallback_picks_closest_anchor_ring() {
    let aliases = RegionAliases::default();
    let table = parse_distance_csv(TABLE, "plz.csv", &aliases).unwrap();
    let row = table.get("1200").unwrap();
    assert_eq!(row.distance_km, Some(250.0));

    // 180 分钟超出 metric 区间，只剩兜底；|40-250| < |10-250|
    let a = engine().assign(row);
    assert_eq!(a.region, "mittelland_west");
    assert_eq!(a.strategy, AssignmentStrategy::Fallback);

    // 12 km 距 basel_fricktal 的 10 km 环最近
    let near = RegionAssignmentEngine::new(
        rules().into_iter().filter(|r| r.id == "fallback").collect(),
        anchors(),
        &aliases,
    );
    let a = near.assign(table.get("4312").unwrap());
    assert_eq!(a.region, "basel_fricktal");
    assert_eq!(a.strategy, AssignmentStrategy::Fallback);
}

#[test]
fn test_assignment_is_deterministic() {
    let aliases = RegionAliases::default();
    let table = parse_distance_csv(TABLE, "plz.csv", &aliases).unwrap();
    let first = engine();
    let second = engine();
    for plz in ["8000", "4312", "3000", "1200"] {
        let row = table.get(plz).unwrap();
        assert_eq!(first.assign(row), second.assign(row));
        assert_eq!(first.assign(row), first.assign(row));
    }
}

#[test]
fn test_explain_lists_every_rule_in_priority_order() {
    let aliases = RegionAliases::default();
    let table = parse_distance_csv(TABLE, "plz.csv", &aliases).unwrap();
    let trace = engine().explain(table.get("8000").unwrap());

    let ids: Vec<&str> = trace.iter().map(|t| t.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["zh", "zh_dup", "near", "fallback"]);
    assert!(trace.iter().all(|t| t.matched));
}
