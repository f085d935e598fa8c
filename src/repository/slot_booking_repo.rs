// ==========================================
// 上门安装预约路由系统 - 时段占用仓储
// ==========================================
// 表: slot_booking
// 说明: 占用读取与写入之间不加锁，并发下允许偶发重复占用
// ==========================================

use crate::domain::schedule::{DayOccupancy, SlotBooking};
use crate::domain::types::ServiceType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct SlotBookingRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SlotBookingRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取团队某日的时段占用
    pub fn occupancy(&self, team_key: &str, date: NaiveDate) -> RepositoryResult<DayOccupancy> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT slot_index, service_type, COUNT(*)
               FROM slot_booking
               WHERE team_key = ?1 AND booking_date = ?2
               GROUP BY slot_index, service_type"#,
        )?;

        let rows = stmt.query_map(
            params![team_key, date.format("%Y-%m-%d").to_string()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;

        let mut day = DayOccupancy::new();
        for row in rows {
            let (slot_index, service, count) = row?;
            let slot = day.entry(slot_index.max(0) as usize).or_default();
            match ServiceType::parse(&service) {
                Some(ServiceType::Montage) => slot.montage += count.max(0) as u32,
                Some(ServiceType::Etage) => slot.etage += count.max(0) as u32,
                None => {
                    tracing::warn!(team_key, service = %service, "未知服务类型的占用记录，已忽略");
                }
            }
        }
        Ok(day)
    }

    /// 写入一组占用（同一事务）
    pub fn record_all(&self, bookings: &[SlotBooking]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        for booking in bookings {
            tx.execute(
                r#"INSERT INTO slot_booking
                   (booking_id, team_key, booking_date, slot_index, service_type, order_id)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                params![
                    uuid::Uuid::new_v4().to_string(),
                    booking.team_key,
                    booking.date.format("%Y-%m-%d").to_string(),
                    booking.slot_index as i64,
                    booking.service.as_str(),
                    booking.order_id,
                ],
            )?;
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(bookings.len())
    }

    /// 删除早于指定日期的占用
    pub fn purge_before(&self, date: NaiveDate) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM slot_booking WHERE booking_date < ?1",
            params![date.format("%Y-%m-%d").to_string()],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn repo() -> SlotBookingRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        SlotBookingRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn booking(slot_index: usize, service: ServiceType, order_id: &str) -> SlotBooking {
        SlotBooking {
            team_key: "team_basel_1".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            slot_index,
            service,
            order_id: order_id.to_string(),
        }
    }

    #[test]
    fn test_occupancy_aggregates_by_slot_and_service() {
        let r = repo();
        r.record_all(&[
            booking(0, ServiceType::Montage, "1001"),
            booking(1, ServiceType::Etage, "1002"),
            booking(1, ServiceType::Etage, "1003"),
        ])
        .unwrap();

        let day = r
            .occupancy("team_basel_1", NaiveDate::from_ymd_opt(2026, 3, 2).unwrap())
            .unwrap();
        assert_eq!(day.get(&0).map(|s| s.montage), Some(1));
        assert_eq!(day.get(&1).map(|s| s.etage), Some(2));
        assert!(day.get(&2).is_none());
    }

    #[test]
    fn test_purge_before() {
        let r = repo();
        r.record_all(&[booking(0, ServiceType::Montage, "1001")]).unwrap();
        let deleted = r
            .purge_before(NaiveDate::from_ymd_opt(2026, 3, 3).unwrap())
            .unwrap();
        assert_eq!(deleted, 1);
    }
}
