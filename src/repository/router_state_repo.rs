// ==========================================
// 上门安装预约路由系统 - 路由状态仓储 (SQLite)
// ==========================================
// 表: router_counter / router_rr_state
// 并发: 计数使用单条 UPSERT；轮询指针使用 revision 乐观锁
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::types::ServiceType;
use crate::engine::router_state::{retention_cutoff, RouterState, RrPointer};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

// ==========================================
// SqliteRouterState - 路由状态仓储
// ==========================================
pub struct SqliteRouterState {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRouterState {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 带 revision 检查更新轮询指针
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: revision 不匹配（其他请求已推进）
    pub fn update_rr_pointer(
        &self,
        region: &str,
        service: ServiceType,
        expected_revision: i64,
        new_pointer: usize,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        // 首次使用时补一行 revision=0 的初始状态
        conn.execute(
            "INSERT OR IGNORE INTO router_rr_state (region, service_type, pointer, revision)
             VALUES (?1, ?2, 0, 0)",
            params![region, service.as_str()],
        )?;

        let affected = conn.execute(
            r#"UPDATE router_rr_state
               SET pointer = ?1, revision = revision + 1, updated_at = datetime('now')
               WHERE region = ?2 AND service_type = ?3 AND revision = ?4"#,
            params![new_pointer as i64, region, service.as_str(), expected_revision],
        )?;

        if affected == 0 {
            let actual: i64 = conn.query_row(
                "SELECT revision FROM router_rr_state WHERE region = ?1 AND service_type = ?2",
                params![region, service.as_str()],
                |row| row.get(0),
            )?;
            return Err(RepositoryError::OptimisticLockFailure {
                key: format!("{}/{}", region, service),
                expected: expected_revision,
                actual,
            });
        }

        Ok(())
    }
}

impl RouterState for SqliteRouterState {
    fn increment(
        &self,
        date: NaiveDate,
        calendar_id: &str,
        service: ServiceType,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let date_str = date.format("%Y-%m-%d").to_string();

        let count: i64 = conn.query_row(
            r#"INSERT INTO router_counter (counter_date, calendar_id, service_type, count)
               VALUES (?1, ?2, ?3, 1)
               ON CONFLICT(counter_date, calendar_id, service_type)
               DO UPDATE SET count = count + 1, updated_at = datetime('now')
               RETURNING count"#,
            params![date_str, calendar_id, service.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count(
        &self,
        date: NaiveDate,
        calendar_id: &str,
        service: ServiceType,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let date_str = date.format("%Y-%m-%d").to_string();

        let count: Option<i64> = conn
            .query_row(
                r#"SELECT count FROM router_counter
                   WHERE counter_date = ?1 AND calendar_id = ?2 AND service_type = ?3"#,
                params![date_str, calendar_id, service.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }

    fn rr_pointer(&self, region: &str, service: ServiceType) -> RepositoryResult<RrPointer> {
        let conn = self.get_conn()?;
        let row: Option<(i64, i64)> = conn
            .query_row(
                "SELECT pointer, revision FROM router_rr_state WHERE region = ?1 AND service_type = ?2",
                params![region, service.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row
            .map(|(pointer, revision)| RrPointer {
                pointer: pointer.max(0) as usize,
                revision,
            })
            .unwrap_or_default())
    }

    fn compare_and_set_rr(
        &self,
        region: &str,
        service: ServiceType,
        expected_revision: i64,
        new_pointer: usize,
    ) -> RepositoryResult<bool> {
        match self.update_rr_pointer(region, service, expected_revision, new_pointer) {
            Ok(()) => Ok(true),
            Err(RepositoryError::OptimisticLockFailure { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn purge_old_counters(&self, today: NaiveDate, days: i64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let cutoff = retention_cutoff(today, days).format("%Y-%m-%d").to_string();
        let deleted = conn.execute(
            "DELETE FROM router_counter WHERE counter_date < ?1",
            params![cutoff],
        )?;
        tracing::info!(deleted, cutoff = %cutoff, "路由计数清理完成");
        Ok(deleted)
    }
}
