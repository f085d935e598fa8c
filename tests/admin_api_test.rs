// ==========================================
// 运维 API 集成测试
// ==========================================
// 覆盖: reload / get / sample / region / rebuild-mapping / purge / notices
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use booking_router::app::AppState;
use booking_router::domain::{OrderLineItem, SimpleOrder};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use test_helpers::{create_test_db, seed_config, standard_config, write_distance_csv, STANDARD_CSV};

#[test]
fn test_reload_get_and_sample() {
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_distance_csv(STANDARD_CSV);
    let csv_path = csv.path().to_string_lossy().to_string();
    seed_config(&db_path, &[("distance_csv_path", csv_path.as_str())]);
    let state = AppState::new(db_path).unwrap();
    let admin = &state.admin_api;

    let meta = admin.reload(Utc::now());
    assert_eq!(meta.rows, 4);
    assert!(meta.error.is_none());

    assert_eq!(admin.get("8000", Utc::now()).unwrap().minutes, Some(25));
    assert!(admin.get("9999", Utc::now()).is_none());

    let sample: Vec<String> = admin.sample(2).into_iter().map(|r| r.postcode).collect();
    assert_eq!(sample, vec!["3000", "4051"]);
}

#[test]
fn test_region_report_and_mapping_rebuild() {
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_distance_csv(STANDARD_CSV);
    let csv_path = csv.path().to_string_lossy().to_string();
    let mut entries = standard_config();
    entries.push(("distance_csv_path", csv_path.as_str()));
    seed_config(&db_path, &entries);
    let state = AppState::new(db_path).unwrap();
    let admin = &state.admin_api;
    let now = Utc::now();

    let report = admin.region("CH-8000", now);
    assert_eq!(report.postcode, "8000");
    assert_eq!(report.assignment.unwrap().region, "zuerich_limmattal");
    assert_eq!(report.trace.len(), 2);
    assert!(report.trace[0].matched);
    assert!(!report.trace[1].matched);

    let missing = admin.region("9999", now);
    assert!(missing.record.is_none());
    assert!(missing.assignment.is_none());

    let mapping = admin.rebuild_mapping(now);
    assert_eq!(mapping.stats.total, 4);
    assert_eq!(mapping.stats.unassigned, 1);
    assert_eq!(mapping.stats.by_region.get("zuerich_limmattal"), Some(&2));
    assert_eq!(mapping.stats.by_region.get("basel_fricktal"), Some(&1));
}

#[test]
fn test_purge_uses_retention_window() {
    let (_db, db_path) = create_test_db().unwrap();
    let csv = write_distance_csv(STANDARD_CSV);
    let csv_path = csv.path().to_string_lossy().to_string();
    let mut entries = standard_config();
    entries.push(("distance_csv_path", csv_path.as_str()));
    seed_config(&db_path, &entries);
    let state = AppState::new(db_path).unwrap();

    let day = NaiveDate::from_ymd_opt(2030, 3, 4).unwrap();
    let now = Utc.with_ymd_and_hms(2030, 3, 3, 12, 0, 0).unwrap();
    let mut order = SimpleOrder {
        id: "1001".to_string(),
        postcode: "8000".to_string(),
        items: vec![OrderLineItem {
            product_id: "P-1".to_string(),
            quantity: 1,
            categories: vec!["montage".to_string()],
        }],
        ..Default::default()
    };
    state.booking.plan_for_order(&mut order, day, now).unwrap();

    // 仍在保留窗口内
    let report = state.admin_api.purge(day + Duration::days(3), Some(7)).unwrap();
    assert_eq!((report.counters, report.slot_bookings), (0, 0));

    let report = state.admin_api.purge(day + Duration::days(30), None).unwrap();
    assert_eq!(report.cutoff, day + Duration::days(23));
    assert_eq!(report.counters, 1);
    assert_eq!(report.slot_bookings, 1);
}

#[test]
fn test_missing_csv_surfaces_notice() {
    let (_db, db_path) = create_test_db().unwrap();
    seed_config(&db_path, &[("distance_csv_path", "/nonexistent/booking-router/plz.csv")]);
    let state = AppState::new(db_path).unwrap();

    let meta = state.admin_api.reload(Utc::now());
    assert!(meta.error.is_some());

    let notices = state.admin_api.notices().unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].code, "distance_file_missing");
}
