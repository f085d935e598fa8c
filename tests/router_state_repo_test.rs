// ==========================================
// 路由状态仓储集成测试 (SQLite)
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use booking_router::db::open_sqlite_connection;
use booking_router::domain::SlotBooking;
use booking_router::engine::{RouterState, RrPointer};
use booking_router::repository::{RepositoryError, SlotBookingRepository, SqliteRouterState};
use booking_router::ServiceType;
use chrono::NaiveDate;
use std::sync::{Arc, Mutex};
use test_helpers::create_test_db;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 3, day).unwrap()
}

fn shared_conn(db_path: &str) -> Arc<Mutex<rusqlite::Connection>> {
    Arc::new(Mutex::new(open_sqlite_connection(db_path).unwrap()))
}

#[test]
fn test_increment_persists_across_connections() {
    let (_db, db_path) = create_test_db().unwrap();
    let state = SqliteRouterState::from_connection(shared_conn(&db_path));

    assert_eq!(state.increment(d(4), "cal-zh-a", ServiceType::Montage).unwrap(), 1);
    assert_eq!(state.increment(d(4), "cal-zh-a", ServiceType::Montage).unwrap(), 2);
    assert_eq!(state.increment(d(4), "cal-zh-a", ServiceType::Etage).unwrap(), 1);
    assert_eq!(state.increment(d(5), "cal-zh-a", ServiceType::Montage).unwrap(), 1);

    let other = SqliteRouterState::from_connection(shared_conn(&db_path));
    assert_eq!(other.count(d(4), "cal-zh-a", ServiceType::Montage).unwrap(), 2);
    assert_eq!(other.day_total(d(4), "cal-zh-a").unwrap(), 3);
    assert_eq!(other.count(d(4), "cal-zh-b", ServiceType::Montage).unwrap(), 0);
}

#[test]
fn test_cas_rejects_stale_revision() {
    let (_db, db_path) = create_test_db().unwrap();
    let state = SqliteRouterState::from_connection(shared_conn(&db_path));

    assert_eq!(
        state.rr_pointer("basel_fricktal", ServiceType::Montage).unwrap(),
        RrPointer::default()
    );
    assert!(state
        .compare_and_set_rr("basel_fricktal", ServiceType::Montage, 0, 1)
        .unwrap());
    assert!(!state
        .compare_and_set_rr("basel_fricktal", ServiceType::Montage, 0, 2)
        .unwrap());
    assert_eq!(
        state.rr_pointer("basel_fricktal", ServiceType::Montage).unwrap(),
        RrPointer {
            pointer: 1,
            revision: 1
        }
    );

    match state.update_rr_pointer("basel_fricktal", ServiceType::Montage, 0, 2) {
        Err(RepositoryError::OptimisticLockFailure {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("expected optimistic lock failure, got {:?}", other),
    }
}

#[test]
fn test_advance_rr_wraps_per_region_and_service() {
    let (_db, db_path) = create_test_db().unwrap();
    let state = SqliteRouterState::from_connection(shared_conn(&db_path));

    assert_eq!(state.advance_rr("zuerich_limmattal", ServiceType::Montage, 2).unwrap(), 1);
    assert_eq!(state.advance_rr("zuerich_limmattal", ServiceType::Montage, 2).unwrap(), 0);
    assert_eq!(state.advance_rr("zuerich_limmattal", ServiceType::Etage, 2).unwrap(), 1);

    let montage = state.rr_pointer("zuerich_limmattal", ServiceType::Montage).unwrap();
    assert_eq!(montage.revision, 2);
    assert_eq!(state.rr_pointer("basel_fricktal", ServiceType::Montage).unwrap().revision, 0);
}

#[test]
fn test_purge_keeps_retention_window() {
    let (_db, db_path) = create_test_db().unwrap();
    let conn = shared_conn(&db_path);
    let state = SqliteRouterState::from_connection(conn.clone());
    let slots = SlotBookingRepository::from_connection(conn);

    for day in [1, 3, 8, 10] {
        state.increment(d(day), "cal-zh-a", ServiceType::Montage).unwrap();
    }
    slots
        .record_all(&[SlotBooking {
            team_key: "zh_a".to_string(),
            date: d(1),
            slot_index: 0,
            service: ServiceType::Montage,
            order_id: "1001".to_string(),
        }])
        .unwrap();

    // today=10, days=7 → 保留 3 日及之后
    assert_eq!(state.purge_old_counters(d(10), 7).unwrap(), 1);
    assert_eq!(state.count(d(1), "cal-zh-a", ServiceType::Montage).unwrap(), 0);
    assert_eq!(state.count(d(3), "cal-zh-a", ServiceType::Montage).unwrap(), 1);
    assert_eq!(state.count(d(8), "cal-zh-a", ServiceType::Montage).unwrap(), 1);
    assert_eq!(state.count(d(10), "cal-zh-a", ServiceType::Montage).unwrap(), 1);

    assert_eq!(slots.purge_before(d(3)).unwrap(), 1);
    assert!(slots.occupancy("zh_a", d(1)).unwrap().is_empty());
}
