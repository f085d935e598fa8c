// ==========================================
// 车程查询服务集成测试
// ==========================================
// 覆盖: 分隔符识别 / 询价行 / 指纹失效 / 错误去重与运维提示
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use booking_router::db::open_and_init;
use booking_router::importer::DistanceProvider;
use booking_router::repository::AdminNoticeRepository;
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};
use test_helpers::{create_test_db, write_distance_csv, STANDARD_CSV};

#[test]
fn test_standard_table_lookup() {
    let csv = write_distance_csv(STANDARD_CSV);
    let provider = DistanceProvider::new(csv.path());

    assert_eq!(provider.get_minutes("8000"), Some(25));
    assert_eq!(provider.get_minutes(" 8400 "), Some(70));
    // 需询价: 行存在但没有分钟数
    assert_eq!(provider.get_minutes("3000"), None);
    let record = provider.record("3000").unwrap();
    assert!(record.on_request);
    assert_eq!(record.canton.as_deref(), Some("BE"));
}

#[test]
fn test_comma_and_tab_delimiters() {
    let comma = write_distance_csv("PLZ,Fahrzeit_min,Region\n8000,25,Zürich\n");
    let provider = DistanceProvider::new(comma.path());
    assert_eq!(provider.get_minutes("8000"), Some(25));
    assert_eq!(
        provider.record("8000").unwrap().region,
        "zuerich_limmattal"
    );

    let tab = write_distance_csv("plz\tfahrzeit_min\n4051\t30\n");
    let provider = DistanceProvider::new(tab.path());
    assert_eq!(provider.get_minutes("4051"), Some(30));
}

#[test]
fn test_fingerprint_change_triggers_reload() {
    let csv = write_distance_csv("plz;fahrzeit_min\n8000;25\n");
    let provider = DistanceProvider::new(csv.path());
    let t0 = Utc::now();
    assert_eq!(provider.get_minutes_at("8000", t0), Some(25));

    // 大小变化即指纹变化，无需等待有效期
    std::fs::write(csv.path(), "plz;fahrzeit_min\n8000;40\n8001;12\n").unwrap();
    assert_eq!(provider.get_minutes_at("8000", t0 + Duration::minutes(1)), Some(40));
    assert_eq!(provider.get_minutes_at("8001", t0 + Duration::minutes(1)), Some(12));
}

#[test]
fn test_missing_header_reported_once_and_persisted() {
    let (_db, db_path) = create_test_db().unwrap();
    let conn = open_and_init(&db_path).unwrap();
    let notices = Arc::new(AdminNoticeRepository::from_connection(Arc::new(Mutex::new(conn))));

    let csv = write_distance_csv("postleitzahl_falsch;dauer\n8000;25\n");
    let provider = DistanceProvider::new(csv.path()).with_notices(notices.clone());

    let t0 = Utc::now();
    let (table, meta) = provider.load_at(t0);
    assert!(table.is_empty());
    assert!(meta.error.is_some());

    provider.invalidate_cache();
    let (_, meta) = provider.load_at(t0 + Duration::minutes(5));
    assert!(meta.error.is_some());

    assert_eq!(provider.reported_errors().len(), 1);
    let stored = notices.list().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].code, "distance_header_missing");
    assert_eq!(stored[0].hits, 1);

    // 修复文件后加载成功，提示被清除
    std::fs::write(csv.path(), "plz;fahrzeit_min\n8000;25\n").unwrap();
    assert_eq!(provider.get_minutes_at("8000", t0 + Duration::minutes(10)), Some(25));
    assert!(notices.list().unwrap().is_empty());
    assert!(provider.reported_errors().is_empty());
}

#[test]
fn test_missing_file_yields_empty_table() {
    let provider = DistanceProvider::new("/nonexistent/booking-router/plz.csv");
    assert_eq!(provider.get_minutes("8000"), None);
    let (_, meta) = provider.load();
    assert!(meta.error.unwrap().contains("不存在"));
}
