// ==========================================
// 上门安装预约路由系统 - 运维提示仓储
// ==========================================
// 表: admin_notice（message 唯一，重复上报只累计 hits）
// 用途: 车程表加载失败等配置问题，供后台展示
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminNotice {
    pub code: String,
    pub message: String,
    pub hits: i64,
    pub first_seen: String,
    pub last_seen: String,
}

pub struct AdminNoticeRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AdminNoticeRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 上报提示
    ///
    /// # 返回
    /// - Ok(true): 首次出现
    /// - Ok(false): 已存在，仅更新 last_seen / hits
    pub fn report(&self, code: &str, message: &str, now: DateTime<Utc>) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let ts = now.to_rfc3339();
        let inserted = conn.execute(
            r#"INSERT OR IGNORE INTO admin_notice (message, code, hits, first_seen, last_seen)
               VALUES (?1, ?2, 1, ?3, ?3)"#,
            params![message, code, ts],
        )?;
        if inserted == 0 {
            conn.execute(
                "UPDATE admin_notice SET hits = hits + 1, last_seen = ?1 WHERE message = ?2",
                params![ts, message],
            )?;
        }
        Ok(inserted > 0)
    }

    pub fn list(&self) -> RepositoryResult<Vec<AdminNotice>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT code, message, hits, first_seen, last_seen FROM admin_notice ORDER BY first_seen",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AdminNotice {
                code: row.get(0)?,
                message: row.get(1)?,
                hits: row.get(2)?,
                first_seen: row.get(3)?,
                last_seen: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// 按代码清除（例如车程表重新加载成功后）
    pub fn clear_code(&self, code: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM admin_notice WHERE code = ?1", params![code])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    #[test]
    fn test_report_is_deduplicated() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let repo = AdminNoticeRepository::from_connection(Arc::new(Mutex::new(conn)));

        let now = Utc::now();
        assert!(repo.report("distance_file_missing", "车程文件不存在: a.csv", now).unwrap());
        assert!(!repo.report("distance_file_missing", "车程文件不存在: a.csv", now).unwrap());

        let notices = repo.list().unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].hits, 2);

        assert_eq!(repo.clear_code("distance_file_missing").unwrap(), 1);
        assert!(repo.list().unwrap().is_empty());
    }
}
