// ==========================================
// 上门安装预约路由系统 - 邮编车程记录
// ==========================================
// 来源: 车程 CSV (plz;fahrzeit_min[;region][;kanton][;lat][;lng])
// 红线: postcode 只保留数字，作为唯一键
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// PostcodeRecord - 邮编车程记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostcodeRecord {
    pub postcode: String,          // 规范化后的纯数字邮编
    pub minutes: Option<i32>,      // 车程（分钟），"auf Anfrage" 等文本时为 None
    pub region: String,            // CSV 自带区域（已规范化），可为空
    pub on_request: bool,          // 车程需人工询价
    pub canton: Option<String>,    // 州代码（大写）
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub distance_km: Option<f64>,  // 到基地的道路距离
}

impl PostcodeRecord {
    /// 创建仅含邮编与车程的记录
    pub fn new(postcode: &str, minutes: i32) -> Self {
        Self {
            postcode: normalize_postcode(postcode),
            minutes: Some(minutes),
            region: String::new(),
            on_request: false,
            canton: None,
            lat: None,
            lng: None,
            distance_km: None,
        }
    }

    /// 经纬度是否完整
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some((lat, lng)),
            _ => None,
        }
    }
}

/// 邮编规范化：只保留 ASCII 数字
///
/// "CH-8000" → "8000"，" 4051 " → "4051"
pub fn normalize_postcode(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}
