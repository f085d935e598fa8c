// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、临时车程表、配置写入
// ==========================================
#![allow(dead_code)]

use booking_router::config::ConfigManager;
use booking_router::db::open_and_init;
use std::error::Error;
use std::io::Write;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时路径不是 UTF-8")?
        .to_string();

    open_and_init(&db_path)?;

    Ok((temp_file, db_path))
}

/// 写入临时车程 CSV
pub fn write_distance_csv(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".csv")
        .tempfile()
        .unwrap();
    write!(file, "{}", content).unwrap();
    file.flush().unwrap();
    file
}

/// 批量写入 global 配置
pub fn seed_config(db_path: &str, entries: &[(&str, &str)]) {
    let config = ConfigManager::new(db_path).unwrap();
    for (key, value) in entries {
        config.set_config_value(key, value).unwrap();
    }
}

/// 标准车程表: 苏黎世两个邮编 + 巴塞尔一个 + 询价一个
pub const STANDARD_CSV: &str = "plz;fahrzeit_min;kanton\n\
8000;25;ZH\n\
8400;70;ZH\n\
4051;30;BS\n\
3000;auf Anfrage;BE\n";

/// 标准路由配置（不含车程表路径）
pub fn standard_config() -> Vec<(&'static str, &'static str)> {
    vec![
        ("signing_secret", "integration-secret"),
        ("booking_base_url", "https://shop.example.test/termin"),
        (
            "region_rules",
            r#"[
                {"id":"zh","type":"canton","region":"Zürich","priority":10,"config":{"cantons":["ZH"]}},
                {"id":"bs","type":"canton","region":"basel","priority":20,"config":{"cantons":["BS","BL"]}}
            ]"#,
        ),
        (
            "region_days",
            r#"{"zuerich_limmattal":{"days":{"mon":true,"tue":true,"wed":true,"thu":true,"fri":true},"max_teams":2}}"#,
        ),
        (
            "priority_lists",
            r#"{"zuerich_limmattal":{"montage":["zh_a","zh_b"]},"basel_fricktal":{"default":["bs_a"]}}"#,
        ),
        (
            "calendar_ids",
            r#"{"zh_a":"cal-zh-a","zh_b":"cal-zh-b","bs_a":"cal-bs-a","fallback_team":"cal-fallback"}"#,
        ),
        ("default_teams", r#"["fallback_team"]"#),
        ("phone_only_categories", "sonderanfertigung"),
    ]
}
