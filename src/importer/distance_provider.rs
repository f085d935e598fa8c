// ==========================================
// 上门安装预约路由系统 - 车程查询服务
// ==========================================
// 缓存: 有效期 12 小时，且文件指纹 (mtime, size) 变化时立即重建
// 失败: 文件级错误只上报一次（去重），返回空表，不中断请求
// ==========================================

use crate::domain::postcode::{normalize_postcode, PostcodeRecord};
use crate::engine::canonical::RegionAliases;
use crate::importer::distance_table::{read_distance_file, DistanceTable};
use crate::importer::error::{DistanceError, DISTANCE_ERROR_CODES};
use crate::repository::AdminNoticeRepository;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

/// 默认缓存有效期（小时）
pub const DEFAULT_CACHE_TTL_HOURS: i64 = 12;

// ==========================================
// FileFingerprint - 文件指纹
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileFingerprint {
    pub mtime_nanos: i128,
    pub size: u64,
}

impl FileFingerprint {
    /// 读取文件指纹；文件不存在或无法 stat 时返回 None
    pub fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        let mtime_nanos = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i128)
            .unwrap_or(0);
        Some(Self {
            mtime_nanos,
            size: meta.len(),
        })
    }

    pub fn mtime(&self) -> Option<DateTime<Utc>> {
        let secs = (self.mtime_nanos / 1_000_000_000) as i64;
        let nanos = (self.mtime_nanos % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nanos)
    }
}

// ==========================================
// DistanceMeta - 加载元信息
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceMeta {
    pub path: String,
    pub fingerprint: Option<FileFingerprint>,
    pub rows: usize,
    pub skipped_rows: usize,
    pub loaded_at: DateTime<Utc>,
    pub error: Option<String>,
}

struct CachedTable {
    table: Arc<DistanceTable>,
    meta: DistanceMeta,
}

// ==========================================
// DistanceProvider - 车程查询服务
// ==========================================
pub struct DistanceProvider {
    path: PathBuf,
    ttl: Duration,
    aliases: RegionAliases,
    cache: Mutex<Option<CachedTable>>,
    reported: Mutex<HashSet<String>>,
    notices: Option<Arc<AdminNoticeRepository>>,
}

impl DistanceProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ttl: Duration::hours(DEFAULT_CACHE_TTL_HOURS),
            aliases: RegionAliases::default(),
            cache: Mutex::new(None),
            reported: Mutex::new(HashSet::new()),
            notices: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_aliases(mut self, aliases: RegionAliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// 挂接运维提示仓储（错误持久化供后台展示）
    pub fn with_notices(mut self, notices: Arc<AdminNoticeRepository>) -> Self {
        self.notices = Some(notices);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 查询车程（分钟）
    ///
    /// # 返回
    /// - Some(minutes): 表中存在且为数值
    /// - None: 不存在 / 需询价 / 表加载失败
    pub fn get_minutes(&self, postcode: &str) -> Option<i32> {
        self.get_minutes_at(postcode, Utc::now())
    }

    pub fn get_minutes_at(&self, postcode: &str, now: DateTime<Utc>) -> Option<i32> {
        let key = normalize_postcode(postcode);
        if key.is_empty() {
            return None;
        }
        let (table, _) = self.load_at(now);
        table.records.get(&key).and_then(|r| r.minutes)
    }

    /// 查询完整行
    pub fn record(&self, postcode: &str) -> Option<PostcodeRecord> {
        self.record_at(postcode, Utc::now())
    }

    pub fn record_at(&self, postcode: &str, now: DateTime<Utc>) -> Option<PostcodeRecord> {
        let (table, _) = self.load_at(now);
        table.get(postcode).cloned()
    }

    /// 按邮编顺序取前 N 行
    pub fn sample(&self, limit: usize) -> Vec<PostcodeRecord> {
        let (table, _) = self.load();
        table.records.values().take(limit).cloned().collect()
    }

    /// 全部已知邮编（区域映射批量重建的输入）
    pub fn postcodes(&self) -> Vec<String> {
        let (table, _) = self.load();
        table.records.keys().cloned().collect()
    }

    // ==========================================
    // 加载与缓存
    // ==========================================

    pub fn load(&self) -> (Arc<DistanceTable>, DistanceMeta) {
        self.load_at(Utc::now())
    }

    /// 加载车程表（命中缓存时不读文件）
    ///
    /// 缓存命中条件: 未过期 且 文件指纹未变化
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load_at(&self, now: DateTime<Utc>) -> (Arc<DistanceTable>, DistanceMeta) {
        let fingerprint = FileFingerprint::of(&self.path);

        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(cached) = cache.as_ref() {
            let fresh = now - cached.meta.loaded_at < self.ttl;
            if fresh && cached.meta.fingerprint == fingerprint {
                return (cached.table.clone(), cached.meta.clone());
            }
            tracing::debug!(fresh, "车程表缓存失效，重新加载");
        }

        let loaded = match read_distance_file(&self.path, &self.aliases) {
            Ok(table) => {
                self.on_load_success();
                tracing::info!(
                    rows = table.len(),
                    skipped = table.skipped_rows,
                    "车程表加载完成"
                );
                let meta = DistanceMeta {
                    path: self.path.display().to_string(),
                    fingerprint,
                    rows: table.len(),
                    skipped_rows: table.skipped_rows,
                    loaded_at: now,
                    error: None,
                };
                CachedTable {
                    table: Arc::new(table),
                    meta,
                }
            }
            Err(err) => {
                self.report_once(&err, now);
                CachedTable {
                    table: Arc::new(DistanceTable::default()),
                    meta: DistanceMeta {
                        path: self.path.display().to_string(),
                        fingerprint,
                        rows: 0,
                        skipped_rows: 0,
                        loaded_at: now,
                        error: Some(err.to_string()),
                    },
                }
            }
        };

        let result = (loaded.table.clone(), loaded.meta.clone());
        *cache = Some(loaded);
        result
    }

    /// 显式清除缓存（CLI / 后台使用）
    pub fn invalidate_cache(&self) {
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *cache = None;
        tracing::info!(path = %self.path.display(), "车程表缓存已清除");
    }

    /// 已上报过的错误信息（去重后）
    pub fn reported_errors(&self) -> Vec<String> {
        let reported = match self.reported.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut out: Vec<String> = reported.iter().cloned().collect();
        out.sort();
        out
    }

    fn report_once(&self, err: &DistanceError, now: DateTime<Utc>) {
        let message = err.to_string();
        let first_time = match self.reported.lock() {
            Ok(mut guard) => guard.insert(message.clone()),
            Err(poisoned) => poisoned.into_inner().insert(message.clone()),
        };
        if !first_time {
            return;
        }

        tracing::error!(code = err.code(), "{}", message);
        if let Some(notices) = &self.notices {
            if let Err(e) = notices.report(err.code(), &message, now) {
                tracing::warn!(error = %e, "运维提示写入失败");
            }
        }
    }

    /// 加载成功后清除历史错误，使再次出错时能重新上报
    fn on_load_success(&self) {
        let had_errors = match self.reported.lock() {
            Ok(mut guard) => {
                let had = !guard.is_empty();
                guard.clear();
                had
            }
            Err(poisoned) => {
                let mut guard = poisoned.into_inner();
                let had = !guard.is_empty();
                guard.clear();
                had
            }
        };
        if !had_errors {
            return;
        }
        if let Some(notices) = &self.notices {
            for code in DISTANCE_ERROR_CODES {
                if let Err(e) = notices.clear_code(code) {
                    tracing::warn!(error = %e, code, "运维提示清除失败");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_get_minutes_present_and_absent() {
        let file = write_csv("plz;fahrzeit_min;kanton\n8000;25;ZH\n4051;18;BS\n");
        let provider = DistanceProvider::new(file.path());
        assert_eq!(provider.get_minutes("8000"), Some(25));
        assert_eq!(provider.get_minutes("CH-4051"), Some(18));
        assert_eq!(provider.get_minutes("9999"), None);
        assert_eq!(provider.get_minutes(""), None);
    }

    #[test]
    fn test_cache_served_until_ttl() {
        let file = write_csv("plz;fahrzeit_min\n8000;25\n");
        let provider = DistanceProvider::new(file.path());
        let t0 = Utc::now();
        let (_, meta0) = provider.load_at(t0);
        let (_, meta1) = provider.load_at(t0 + Duration::hours(1));
        assert_eq!(meta0.loaded_at, meta1.loaded_at);

        let (_, meta2) = provider.load_at(t0 + Duration::hours(13));
        assert_eq!(meta2.loaded_at, t0 + Duration::hours(13));
    }

    #[test]
    fn test_fingerprint_change_triggers_reload() {
        let mut file = write_csv("plz;fahrzeit_min\n8000;25\n");
        let provider = DistanceProvider::new(file.path());
        let now = Utc::now();
        assert_eq!(provider.get_minutes_at("8001", now), None);

        // 追加一行：文件大小变化
        writeln!(file, "8001;31").unwrap();
        file.flush().unwrap();
        assert_eq!(provider.get_minutes_at("8001", now), Some(31));
    }

    #[test]
    fn test_missing_file_reported_once() {
        let provider = DistanceProvider::new("/nonexistent/dir/fahrzeiten.csv");
        let now = Utc::now();
        assert_eq!(provider.get_minutes_at("8000", now), None);
        provider.invalidate_cache();
        assert_eq!(provider.get_minutes_at("8000", now), None);

        let errors = provider.reported_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("fahrzeiten.csv"));

        let (table, meta) = provider.load_at(now);
        assert!(table.is_empty());
        assert!(meta.error.is_some());
    }

    #[test]
    fn test_distinct_errors_are_kept_apart() {
        let file = write_csv("plz,ort\n8000,Zürich\n");
        let provider = DistanceProvider::new(file.path());
        provider.load();

        let empty = write_csv("");
        let provider_empty = DistanceProvider::new(empty.path());
        provider_empty.load();

        assert!(provider.reported_errors()[0].contains("fahrzeit_min"));
        assert!(provider_empty.reported_errors()[0].contains("为空"));
    }
}
