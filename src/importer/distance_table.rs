// ==========================================
// 上门安装预约路由系统 - 车程 CSV 解析
// ==========================================
// 格式: plz,…,fahrzeit_min[,region][,kanton][,lat][,lng]
// 分隔符: 表头行中 逗号 / 分号 / 制表符 计数最多者
// 表头: 大小写不敏感、子串匹配
// 行级错误: 跳过并计数，不中断加载
// ==========================================

use crate::domain::postcode::{normalize_postcode, PostcodeRecord};
use crate::engine::canonical::RegionAliases;
use crate::importer::error::{DistanceError, DistanceResult};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::BTreeMap;
use std::path::Path;

// ==========================================
// DistanceTable - 解析结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistanceTable {
    pub records: BTreeMap<String, PostcodeRecord>,
    pub skipped_rows: usize,
    pub delimiter: u8,
}

impl DistanceTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, postcode: &str) -> Option<&PostcodeRecord> {
        self.records.get(&normalize_postcode(postcode))
    }
}

/// 表头列位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnLayout {
    pub postcode: usize,
    pub minutes: usize,
    pub region: Option<usize>,
    pub canton: Option<usize>,
    pub lat: Option<usize>,
    pub lng: Option<usize>,
    pub distance_km: Option<usize>,
}

/// 根据表头行检测分隔符
///
/// 计数相同时按 分号 > 逗号 > 制表符 取用；全部为 0 时回退逗号
pub fn detect_delimiter(header_line: &str) -> u8 {
    let candidates = [b';', b',', b'\t'];
    let mut best = b',';
    let mut best_count = 0usize;
    for candidate in candidates {
        let count = header_line.bytes().filter(|b| *b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// 匹配表头列
pub fn detect_columns(headers: &StringRecord, path: &str) -> DistanceResult<ColumnLayout> {
    let names: Vec<String> = headers
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_lowercase())
        .collect();

    let find = |pred: &dyn Fn(&str) -> bool, taken: &[usize]| -> Option<usize> {
        names
            .iter()
            .enumerate()
            .find(|(idx, name)| !taken.contains(idx) && pred(name.as_str()))
            .map(|(idx, _)| idx)
    };

    let postcode = find(
        &|n| n.contains("plz") || n.contains("postcode") || n.contains("zip"),
        &[],
    )
    .ok_or_else(|| DistanceError::MissingHeader {
        path: path.to_string(),
        column: "plz".to_string(),
    })?;

    // 优先精确的 fahrzeit_min，再退到近义列
    let minutes = find(&|n| n.contains("fahrzeit_min"), &[postcode])
        .or_else(|| {
            find(
                &|n| n.contains("fahrzeit") || n.contains("minut") || n == "min",
                &[postcode],
            )
        })
        .ok_or_else(|| DistanceError::MissingHeader {
            path: path.to_string(),
            column: "fahrzeit_min".to_string(),
        })?;

    let mut taken = vec![postcode, minutes];
    let mut optional = |pred: &dyn Fn(&str) -> bool| -> Option<usize> {
        let idx = find(pred, &taken);
        if let Some(i) = idx {
            taken.push(i);
        }
        idx
    };

    let region = optional(&|n| n.contains("region"));
    let canton = optional(&|n| n.contains("kanton") || n.contains("canton"));
    let lat = optional(&|n| n.starts_with("lat") || n == "breite");
    let lng = optional(&|n| n.starts_with("lng") || n.starts_with("lon") || n == "laenge");
    let distance_km = optional(&|n| n.contains("distanz") || n.contains("distance") || n.contains("km"));

    Ok(ColumnLayout {
        postcode,
        minutes,
        region,
        canton,
        lat,
        lng,
        distance_km,
    })
}

/// 解析数字单元格（接受 "25" / "25.5" / "25,5"）
fn parse_number(cell: &str) -> Option<f64> {
    let cleaned = cell.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn cell<'a>(record: &'a StringRecord, idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// 解析单行
///
/// # 返回
/// - Some(record): 有效行
/// - None: 邮编为空、车程为空或为负数
fn parse_row(
    record: &StringRecord,
    layout: &ColumnLayout,
    aliases: &RegionAliases,
) -> Option<PostcodeRecord> {
    let postcode = normalize_postcode(record.get(layout.postcode)?);
    if postcode.is_empty() {
        return None;
    }

    let raw_minutes = cell(record, Some(layout.minutes))?;
    let (minutes, on_request) = match parse_number(raw_minutes) {
        Some(v) if v < 0.0 => return None,
        Some(v) => (Some(v.round() as i32), false),
        // 非数字文本（如 "auf Anfrage"）视为需询价
        None => (None, true),
    };

    Some(PostcodeRecord {
        postcode,
        minutes,
        region: cell(record, layout.region)
            .map(|r| aliases.canonical(r))
            .unwrap_or_default(),
        on_request,
        canton: cell(record, layout.canton).map(|c| c.to_uppercase()),
        lat: cell(record, layout.lat).and_then(parse_number),
        lng: cell(record, layout.lng).and_then(parse_number),
        distance_km: cell(record, layout.distance_km).and_then(parse_number),
    })
}

/// 解析 CSV 文本内容
///
/// # 参数
/// - content: 文件内容
/// - path: 仅用于错误信息
/// - aliases: 区域别名（CSV region 列规范化）
pub fn parse_distance_csv(
    content: &str,
    path: &str,
    aliases: &RegionAliases,
) -> DistanceResult<DistanceTable> {
    let content = content.trim_start_matches('\u{feff}');
    let header_line = content
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| DistanceError::EmptyFile(path.to_string()))?;

    let delimiter = detect_delimiter(header_line);
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true) // 允许行长度不一致
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let layout = detect_columns(&headers, path)?;

    let mut table = DistanceTable {
        delimiter,
        ..Default::default()
    };

    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(error = %e, "车程表行解析失败，跳过");
                table.skipped_rows += 1;
                continue;
            }
        };

        // 跳过完全空白的行
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }

        match parse_row(&record, &layout, aliases) {
            Some(row) => {
                table.records.insert(row.postcode.clone(), row);
            }
            None => table.skipped_rows += 1,
        }
    }

    Ok(table)
}

/// 读取并解析 CSV 文件
pub fn read_distance_file(path: &Path, aliases: &RegionAliases) -> DistanceResult<DistanceTable> {
    let display = path.display().to_string();
    if !path.exists() {
        return Err(DistanceError::FileNotFound(display));
    }

    let bytes = std::fs::read(path).map_err(|e| DistanceError::FileReadError {
        path: display.clone(),
        message: e.to_string(),
    })?;
    // 兼容 Excel 导出的 Latin-1 文件：无效 UTF-8 字节按替换字符处理
    let content = String::from_utf8_lossy(&bytes);
    if content.trim().is_empty() {
        return Err(DistanceError::EmptyFile(display));
    }

    parse_distance_csv(&content, &display, aliases)
}
