// ==========================================
// 上门安装预约路由系统 - 订单状态触发
// ==========================================
// 订单状态切换到触发状态（默认 processing）时:
//   规划预约 → 交给 Mailer 发送预约链接 → 标记 _booking_mail_sent
// 每单最多发送一次；已有预约链接时直接复用，不重复占用时段
// ==========================================

use crate::api::booking_api::{BookingOutcome, BookingService};
use crate::api::error::ApiResult;
use crate::domain::order::{meta_keys, OrderRecord};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::sync::Arc;

// ==========================================
// BookingMail - 预约邮件数据
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingMail {
    pub order_id: String,
    pub email: String,
    pub region: String,
    pub booking_url: String,
    pub calendar_id: String,
    pub date: String,
}

// ==========================================
// Trait: Mailer
// ==========================================
// 邮件正文由宿主系统生成，这里只交付数据
pub trait Mailer: Send + Sync {
    fn send_booking_mail(&self, mail: &BookingMail) -> anyhow::Result<()>;
}

// ==========================================
// DispatchOutcome - 触发结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "dispatch", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// 非触发状态
    Ignored,
    /// 已发送过
    AlreadySent,
    /// 未能规划（携带规划结果类型）
    NotScheduled { outcome: String },
    Sent { mail: BookingMail },
}

// ==========================================
// StatusDispatcher - 状态触发器
// ==========================================
pub struct StatusDispatcher {
    booking: Arc<BookingService>,
    mailer: Arc<dyn Mailer>,
}

impl StatusDispatcher {
    pub fn new(booking: Arc<BookingService>, mailer: Arc<dyn Mailer>) -> Self {
        Self { booking, mailer }
    }

    fn is_trigger(&self, status: &str) -> bool {
        let status = status.trim().trim_start_matches("wc-").to_lowercase();
        self.booking
            .settings()
            .trigger_statuses
            .iter()
            .any(|s| *s == status)
    }

    /// 订单状态变更回调
    ///
    /// # 参数
    /// - from / to: 变更前后状态
    /// - now: 当前时刻
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    pub fn on_status_changed(
        &self,
        order: &mut dyn OrderRecord,
        from: &str,
        to: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<DispatchOutcome> {
        if !self.is_trigger(to) || self.is_trigger(from) {
            return Ok(DispatchOutcome::Ignored);
        }
        if order.get_meta(meta_keys::BOOKING_MAIL_SENT).is_some() {
            tracing::debug!("预约邮件已发送过，跳过");
            return Ok(DispatchOutcome::AlreadySent);
        }
        if self.booking.is_phone_only(order) {
            return Ok(DispatchOutcome::NotScheduled {
                outcome: BookingOutcome::PhoneOnly.kind().to_string(),
            });
        }

        if order.get_meta(meta_keys::BOOKING_URL).is_none() {
            let today = now.with_timezone(&Local).date_naive();
            let outcome = self.booking.plan_for_order(order, today, now)?;
            if !matches!(outcome, BookingOutcome::Scheduled { .. }) {
                tracing::info!(outcome = outcome.kind(), "订单未规划出预约，不发送邮件");
                return Ok(DispatchOutcome::NotScheduled {
                    outcome: outcome.kind().to_string(),
                });
            }
        }

        let meta = |key: &str| order.get_meta(key).unwrap_or_default();
        let mail = BookingMail {
            order_id: order.id(),
            email: order.email(),
            region: meta(meta_keys::REGION),
            booking_url: meta(meta_keys::BOOKING_URL),
            calendar_id: meta(meta_keys::BOOKING_CALENDAR),
            date: meta(meta_keys::BOOKING_DATE),
        };

        self.mailer.send_booking_mail(&mail)?;
        order.set_meta(meta_keys::BOOKING_MAIL_SENT, &now.to_rfc3339());
        tracing::info!(email = %mail.email, "预约邮件已交付");
        Ok(DispatchOutcome::Sent { mail })
    }
}
