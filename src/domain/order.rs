// ==========================================
// 上门安装预约路由系统 - 订单协作接口
// ==========================================
// 订单对象由宿主电商系统提供，这里只定义读写契约
// 红线: 引擎层不依赖具体订单实现
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 订单元数据键
pub mod meta_keys {
    pub const REGION: &str = "_region";
    pub const REGION_STRATEGY: &str = "_region_strategy";
    pub const SERVICE_MONTAGE: &str = "_sgm";
    pub const SERVICE_ETAGE: &str = "_sge";
    pub const BOOKING_URL: &str = "_booking_url";
    pub const BOOKING_CALENDAR: &str = "_booking_calendar";
    pub const BOOKING_TEAM: &str = "_booking_team";
    pub const BOOKING_DATE: &str = "_booking_date";
    pub const BOOKING_SLOTS: &str = "_booking_slots";
    pub const BOOKING_MAIL_SENT: &str = "_booking_mail_sent";
}

// ==========================================
// OrderLineItem - 订单行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl OrderLineItem {
    pub fn in_any_category(&self, slugs: &[String]) -> bool {
        self.categories
            .iter()
            .any(|c| slugs.iter().any(|s| s.eq_ignore_ascii_case(c)))
    }
}

// ==========================================
// Trait: OrderRecord
// ==========================================
pub trait OrderRecord {
    fn id(&self) -> String;

    /// 收货邮编（原始值，未规范化）
    fn postcode(&self) -> String;

    fn country(&self) -> String;

    fn email(&self) -> String;

    fn status(&self) -> String;

    fn get_meta(&self, key: &str) -> Option<String>;

    fn set_meta(&mut self, key: &str, value: &str);

    fn line_items(&self) -> Vec<OrderLineItem>;
}

// ==========================================
// SimpleOrder - 内存订单快照
// ==========================================
// 宿主以 JSON 形式交付订单时使用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimpleOrder {
    pub id: String,
    pub postcode: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub meta: HashMap<String, String>,
    #[serde(default)]
    pub items: Vec<OrderLineItem>,
}

impl OrderRecord for SimpleOrder {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn postcode(&self) -> String {
        self.postcode.clone()
    }

    fn country(&self) -> String {
        self.country.clone()
    }

    fn email(&self) -> String {
        self.email.clone()
    }

    fn status(&self) -> String {
        self.status.clone()
    }

    fn get_meta(&self, key: &str) -> Option<String> {
        self.meta.get(key).cloned()
    }

    fn set_meta(&mut self, key: &str, value: &str) {
        self.meta.insert(key.to_string(), value.to_string());
    }

    fn line_items(&self) -> Vec<OrderLineItem> {
        self.items.clone()
    }
}
