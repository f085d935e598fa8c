// ==========================================
// 上门安装预约路由系统 - 预约链接签名
// ==========================================
// 签名格式: "<unix秒>.<hex(HMAC-SHA256)>"
// 签名原文: order=..&region=..&sgm=..&sge=..&ts=..
// region 须为规范化区域代码，由调用方按配置的别名表规范化
// 校验顺序: 格式 → 时间戳超前 → MAC（常量时间比较）→ 有效期
// ==========================================

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 96;
pub const MIN_TOKEN_TTL_HOURS: i64 = 1;
pub const MAX_TOKEN_TTL_HOURS: i64 = 720;

/// 允许的时钟偏差（秒），超出视为来自未来
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

// ==========================================
// SignatureError - 签名错误
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("预约链接格式错误: {0}")]
    Malformed(String),

    #[error("预约链接签名无效")]
    Invalid,

    #[error("预约链接已过期 (签发于 {issued_at}, 有效期 {ttl_hours} 小时)")]
    Expired { issued_at: i64, ttl_hours: i64 },

    #[error("预约链接时间戳超前 (签发于 {issued_at}, 当前 {now})")]
    FromFuture { issued_at: i64, now: i64 },

    #[error("签名密钥不可用: {0}")]
    Secret(String),
}

impl SignatureError {
    /// 日志/统计用原因代码
    pub fn reason_code(&self) -> &'static str {
        match self {
            SignatureError::Malformed(_) => "malformed",
            SignatureError::Invalid => "invalid",
            SignatureError::Expired { .. } => "expired",
            SignatureError::FromFuture { .. } => "future",
            SignatureError::Secret(_) => "secret",
        }
    }

    /// 面向访问者的 HTTP 状态码
    pub fn http_status(&self) -> u16 {
        match self {
            SignatureError::Malformed(_) => 400,
            SignatureError::Invalid | SignatureError::FromFuture { .. } => 403,
            SignatureError::Expired { .. } => 410,
            SignatureError::Secret(_) => 500,
        }
    }
}

pub type SignatureResult<T> = Result<T, SignatureError>;

// ==========================================
// BookingParams - 签名参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingParams {
    pub order: String,
    pub region: String,
    pub sgm: u32,
    pub sge: u32,
}

impl BookingParams {
    /// # 参数
    /// - region: 规范化区域代码（原样签入）
    pub fn new(order: impl Into<String>, region: &str, sgm: u32, sge: u32) -> Self {
        Self {
            order: order.into(),
            region: region.trim().to_string(),
            sgm,
            sge,
        }
    }

    /// 签名原文
    pub fn canonical_message(&self, ts: i64) -> String {
        format!(
            "order={}&region={}&sgm={}&sge={}&ts={}",
            self.order, self.region, self.sgm, self.sge, ts
        )
    }
}

// ==========================================
// BookingSigner - 签名器
// ==========================================
#[derive(Clone)]
pub struct BookingSigner {
    secret: Vec<u8>,
    ttl_hours: i64,
}

impl std::fmt::Debug for BookingSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingSigner")
            .field("ttl_hours", &self.ttl_hours)
            .finish_non_exhaustive()
    }
}

impl BookingSigner {
    /// # 参数
    /// - secret: 签名密钥（不可为空）
    /// - ttl_hours: 有效期，限定 [1, 720]
    pub fn new(secret: &str, ttl_hours: i64) -> SignatureResult<Self> {
        if secret.trim().is_empty() {
            return Err(SignatureError::Secret("密钥为空".to_string()));
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
            ttl_hours: ttl_hours.clamp(MIN_TOKEN_TTL_HOURS, MAX_TOKEN_TTL_HOURS),
        })
    }

    pub fn ttl_hours(&self) -> i64 {
        self.ttl_hours
    }

    fn mac(&self, params: &BookingParams, ts: i64) -> SignatureResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| SignatureError::Secret(e.to_string()))?;
        mac.update(params.canonical_message(ts).as_bytes());
        Ok(mac)
    }

    /// 生成签名 "ts.hex"
    pub fn sign(&self, params: &BookingParams, ts: i64) -> SignatureResult<String> {
        let digest = self.mac(params, ts)?.finalize().into_bytes();
        Ok(format!("{}.{}", ts, hex::encode(digest)))
    }

    /// 校验签名
    ///
    /// # 返回
    /// - Ok(ts): 签发时间戳
    pub fn verify(
        &self,
        params: &BookingParams,
        sig: &str,
        now: DateTime<Utc>,
    ) -> SignatureResult<i64> {
        let (ts_raw, hex_raw) = sig
            .trim()
            .split_once('.')
            .ok_or_else(|| SignatureError::Malformed("签名缺少时间戳分隔符".to_string()))?;
        let ts: i64 = ts_raw
            .parse()
            .map_err(|_| SignatureError::Malformed(format!("时间戳非法: {}", ts_raw)))?;
        let provided = hex::decode(hex_raw)
            .map_err(|e| SignatureError::Malformed(format!("签名编码非法: {}", e)))?;
        if provided.is_empty() {
            return Err(SignatureError::Malformed("签名为空".to_string()));
        }

        let now_ts = now.timestamp();
        if ts - now_ts > MAX_CLOCK_SKEW_SECS {
            return Err(SignatureError::FromFuture {
                issued_at: ts,
                now: now_ts,
            });
        }

        self.mac(params, ts)?
            .verify_slice(&provided)
            .map_err(|_| SignatureError::Invalid)?;

        if now_ts - ts > self.ttl_hours * 3600 {
            return Err(SignatureError::Expired {
                issued_at: ts,
                ttl_hours: self.ttl_hours,
            });
        }
        Ok(ts)
    }
}

// ==========================================
// BookingQuery - 预约链接参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingQuery {
    pub params: BookingParams,
    pub sig: String,
}

fn parse_count(key: &str, value: Option<&str>) -> SignatureResult<u32> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(0),
        Some(v) => v
            .parse()
            .map_err(|_| SignatureError::Malformed(format!("参数 {} 非法: {}", key, v))),
    }
}

impl BookingQuery {
    /// 解析查询串（可带前导 '?'）
    ///
    /// # 参数
    /// - legacy_compat: 为 true 时接受旧参数名 m / e
    pub fn parse(query: &str, legacy_compat: bool) -> SignatureResult<Self> {
        let query = query.trim().trim_start_matches('?');
        let mut order = None;
        let mut region = None;
        let mut sgm = None;
        let mut sge = None;
        let mut legacy_m = None;
        let mut legacy_e = None;
        let mut sig = None;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.into_owned();
            match &*key {
                "order" => order = Some(value),
                "region" => region = Some(value),
                "sgm" => sgm = Some(value),
                "sge" => sge = Some(value),
                "m" if legacy_compat => legacy_m = Some(value),
                "e" if legacy_compat => legacy_e = Some(value),
                "sig" => sig = Some(value),
                _ => {}
            }
        }

        let order = order
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SignatureError::Malformed("缺少 order".to_string()))?;
        let region = region
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SignatureError::Malformed("缺少 region".to_string()))?;
        let sig = sig
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SignatureError::Malformed("缺少 sig".to_string()))?;

        let sgm = parse_count("sgm", sgm.or(legacy_m).as_deref())?;
        let sge = parse_count("sge", sge.or(legacy_e).as_deref())?;

        Ok(Self {
            params: BookingParams::new(order.trim(), &region, sgm, sge),
            sig,
        })
    }
}

/// 拼接预约链接
pub fn build_url(base: &str, params: &BookingParams, sig: &str) -> SignatureResult<String> {
    let sgm = params.sgm.to_string();
    let sge = params.sge.to_string();
    let url = Url::parse_with_params(
        base,
        [
            ("order", params.order.as_str()),
            ("region", params.region.as_str()),
            ("sgm", sgm.as_str()),
            ("sge", sge.as_str()),
            ("sig", sig),
        ],
    )
    .map_err(|e| SignatureError::Malformed(format!("预约页地址非法 {}: {}", base, e)))?;
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn signer() -> BookingSigner {
        BookingSigner::new("test-secret", DEFAULT_TOKEN_TTL_HOURS).unwrap()
    }

    #[test]
    fn test_canonical_message_uses_region_as_given() {
        let b = BookingParams::new("123", " basel_fricktal ", 2, 1);
        assert_eq!(
            b.canonical_message(10),
            "order=123&region=basel_fricktal&sgm=2&sge=1&ts=10"
        );
        // 别名在此不做转换
        let a = BookingParams::new("123", "Basel", 2, 1);
        assert_ne!(a.canonical_message(10), b.canonical_message(10));
    }

    #[test]
    fn test_tampered_params_invalid() {
        let s = signer();
        let now = Utc::now();
        let sig = s
            .sign(&BookingParams::new("123", "basel_fricktal", 2, 1), now.timestamp())
            .unwrap();
        let err = s
            .verify(&BookingParams::new("123", "basel_fricktal", 3, 1), &sig, now)
            .unwrap_err();
        assert_eq!(err, SignatureError::Invalid);
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn test_malformed_and_future() {
        let s = signer();
        let p = BookingParams::new("1", "x", 1, 0);
        let now = Utc::now();
        for bad in ["", "abc", "12.zz", "12."] {
            assert_eq!(s.verify(&p, bad, now).unwrap_err().reason_code(), "malformed");
        }

        let future = (now + Duration::minutes(10)).timestamp();
        let sig = s.sign(&p, future).unwrap();
        assert_eq!(s.verify(&p, &sig, now).unwrap_err().reason_code(), "future");

        let near = (now + Duration::minutes(2)).timestamp();
        let sig = s.sign(&p, near).unwrap();
        assert!(s.verify(&p, &sig, now).is_ok());
    }

    #[test]
    fn test_ttl_clamped() {
        assert_eq!(BookingSigner::new("k", 0).unwrap().ttl_hours(), 1);
        assert_eq!(BookingSigner::new("k", 10_000).unwrap().ttl_hours(), 720);
        assert!(BookingSigner::new("  ", 96).is_err());
    }

    #[test]
    fn test_query_parse_and_legacy_aliases() {
        let q = BookingQuery::parse("?order=77&region=Basel&sgm=2&sge=1&sig=1.ab", false).unwrap();
        assert_eq!(q.params, BookingParams::new("77", "Basel", 2, 1));
        assert_eq!(q.sig, "1.ab");

        let legacy = "order=77&region=basel_fricktal&m=2&e=1&sig=1.ab";
        let q = BookingQuery::parse(legacy, true).unwrap();
        assert_eq!((q.params.sgm, q.params.sge), (2, 1));
        let q = BookingQuery::parse(legacy, false).unwrap();
        assert_eq!((q.params.sgm, q.params.sge), (0, 0));

        assert!(BookingQuery::parse("region=a&sig=1.ab", false).is_err());
        assert!(BookingQuery::parse("order=1&region=a&sgm=x&sig=1.ab", false).is_err());
    }

    #[test]
    fn test_build_url_round_trip() {
        let s = signer();
        let now = Utc::now();
        let params = BookingParams::new("123", "basel_fricktal", 2, 1);
        let sig = s.sign(&params, now.timestamp()).unwrap();
        let url = build_url("https://example.test/termin", &params, &sig).unwrap();

        let query = url.split_once('?').unwrap().1;
        let parsed = BookingQuery::parse(query, false).unwrap();
        assert_eq!(parsed.params, params);
        assert!(s.verify(&parsed.params, &parsed.sig, now).is_ok());
    }
}
