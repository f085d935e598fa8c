// ==========================================
// 上门安装预约路由系统 - 预约 API
// ==========================================
// 职责: 为订单规划预约（区域 → 日期 → 团队/时段 → 签名链接），
//       确认后依次写入占用、计数、轮询指针，并回写订单元数据
// 结果: 无可用时段是正常结果（info 日志），不是错误
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::RouterSettings;
use crate::domain::order::{meta_keys, OrderRecord};
use crate::domain::postcode::normalize_postcode;
use crate::domain::schedule::{ScheduleContext, ServiceCounts, SlotBooking};
use crate::engine::booking_signature::{
    build_url, BookingParams, BookingQuery, BookingSigner,
};
use crate::engine::canonical::RegionAliases;
use crate::engine::day_planner::{RegionDayPlanner, DEFAULT_MAX_ITERATIONS};
use crate::engine::hybrid_router::{HybridRouter, Selection};
use crate::engine::region_assignment::RegionAssignmentEngine;
use crate::engine::region_mapping::RegionMappingCache;
use crate::engine::router_state::RouterState;
use crate::engine::slot_schedule::SlotSchedule;
use crate::importer::DistanceProvider;
use crate::repository::SlotBookingRepository;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

// ==========================================
// BookingOutcome - 规划结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BookingOutcome {
    /// 含仅电话预约的商品
    PhoneOnly,
    /// 邮编无法分配区域
    NoRegion { postcode: String },
    /// 已分配团队与时段
    Scheduled { selection: Selection, link: String },
    /// 规划窗口内无可用时段
    NoSlot { region: String },
    /// 配置问题（无可约星期 / 缺签名密钥等）
    ConfigError { reason: String },
}

impl BookingOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            BookingOutcome::PhoneOnly => "phone_only",
            BookingOutcome::NoRegion { .. } => "no_region",
            BookingOutcome::Scheduled { .. } => "scheduled",
            BookingOutcome::NoSlot { .. } => "no_slot",
            BookingOutcome::ConfigError { .. } => "config_error",
        }
    }
}

// ==========================================
// LinkResponse - 预约链接校验结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum LinkResponse {
    Accepted {
        params: BookingParams,
        issued_at: i64,
    },
    Rejected {
        status: u16,
        reason: String,
        message: String,
    },
}

// ==========================================
// BookingService - 预约服务
// ==========================================
pub struct BookingService {
    settings: RouterSettings,
    aliases: RegionAliases,
    distances: Arc<DistanceProvider>,
    engine: RegionAssignmentEngine,
    mapping: Arc<RegionMappingCache>,
    router: HybridRouter,
    slots: Arc<SlotBookingRepository>,
    signer: Option<BookingSigner>,
}

impl BookingService {
    /// 创建预约服务
    ///
    /// # 参数
    /// - settings: 配置快照
    /// - distances: 车程查询
    /// - mapping: 区域映射缓存（与后台共享）
    /// - state: 计数/轮询状态
    /// - slots: 时段占用仓储
    pub fn new(
        settings: RouterSettings,
        distances: Arc<DistanceProvider>,
        mapping: Arc<RegionMappingCache>,
        state: Arc<dyn RouterState>,
        slots: Arc<SlotBookingRepository>,
    ) -> Self {
        let aliases = settings.aliases();
        let engine = RegionAssignmentEngine::new(
            settings.region_rules.clone(),
            settings.region_anchors.clone(),
            &aliases,
        )
        .with_csv_region(settings.prefer_csv_region);
        let planner = RegionDayPlanner::new(settings.region_days.clone(), &aliases);
        let schedule = SlotSchedule::new(
            crate::domain::schedule::default_slot_windows(),
            settings.montage_duration,
            settings.etage_duration,
        );
        let router = HybridRouter::new(settings.router_config(), planner, schedule, state);

        let signer = match BookingSigner::new(&settings.signing_secret, settings.token_ttl_hours) {
            Ok(signer) => Some(signer),
            Err(e) => {
                tracing::warn!(error = %e, "签名密钥未配置，预约链接不可用");
                None
            }
        };

        Self {
            settings,
            aliases,
            distances,
            engine,
            mapping,
            router,
            slots,
            signer,
        }
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    pub fn engine(&self) -> &RegionAssignmentEngine {
        &self.engine
    }

    pub fn router(&self) -> &HybridRouter {
        &self.router
    }

    // ==========================================
    // 订单解析
    // ==========================================

    pub fn is_phone_only(&self, order: &dyn OrderRecord) -> bool {
        !self.settings.phone_only_categories.is_empty()
            && order
                .line_items()
                .iter()
                .any(|item| item.in_any_category(&self.settings.phone_only_categories))
    }

    /// 订单服务构成: 元数据 _sgm/_sge 优先，否则按商品分类累计数量
    pub fn service_counts(&self, order: &dyn OrderRecord) -> ServiceCounts {
        let meta_count = |key: &str| {
            order
                .get_meta(key)
                .and_then(|v| v.trim().parse::<u32>().ok())
        };
        let montage_meta = meta_count(meta_keys::SERVICE_MONTAGE);
        let etage_meta = meta_count(meta_keys::SERVICE_ETAGE);
        if montage_meta.is_some() || etage_meta.is_some() {
            return ServiceCounts::new(montage_meta.unwrap_or(0), etage_meta.unwrap_or(0));
        }

        let items = order.line_items();
        let sum = |categories: &[String]| -> u32 {
            items
                .iter()
                .filter(|item| item.in_any_category(categories))
                .map(|item| item.quantity)
                .sum()
        };
        ServiceCounts::new(
            sum(&self.settings.montage_categories),
            sum(&self.settings.etage_categories),
        )
    }

    /// 邮编 → 区域（经映射缓存）
    pub fn resolve_region(&self, postcode: &str, now: DateTime<Utc>) -> Option<(String, String)> {
        let entry = self
            .mapping
            .lookup(postcode, &self.engine, now, |p| self.distances.record_at(p, now))?;
        if entry.region.is_empty() {
            return None;
        }
        Some((entry.region, entry.strategy.to_string()))
    }

    // ==========================================
    // 规划
    // ==========================================

    /// 为订单规划预约并确认
    ///
    /// # 参数
    /// - order: 订单（成功时回写元数据）
    /// - today: 扫描起始日期
    /// - now: 当前时刻（签名时间戳 / 当天最早时段）
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    pub fn plan_for_order(
        &self,
        order: &mut dyn OrderRecord,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> ApiResult<BookingOutcome> {
        if self.is_phone_only(order) {
            tracing::info!("订单含仅电话预约商品，跳过");
            return Ok(BookingOutcome::PhoneOnly);
        }

        let postcode = normalize_postcode(&order.postcode());
        let Some((region, region_strategy)) = self.resolve_region(&postcode, now) else {
            tracing::info!(postcode = %postcode, "邮编无法分配区域");
            return Ok(BookingOutcome::NoRegion { postcode });
        };

        let counts = self.service_counts(order);
        let drive_minutes = self.distances.get_minutes_at(&postcode, now);
        let local_now = now.with_timezone(&Local).naive_local();

        let selection = match self.find_selection(&region, counts, drive_minutes, today, local_now)? {
            SearchResult::Found(selection) => selection,
            SearchResult::NoAllowedDate => {
                tracing::error!(region = %region, "区域没有可约星期");
                return Ok(BookingOutcome::ConfigError {
                    reason: format!("区域 {} 没有可约日期", region),
                });
            }
            SearchResult::Exhausted => {
                tracing::info!(region = %region, horizon = self.settings.horizon_days, "规划窗口内无可用时段");
                return Ok(BookingOutcome::NoSlot { region });
            }
        };

        // 先生成链接，避免配置错误时已写入计数
        let params = BookingParams::new(order.id(), &region, counts.montage, counts.etage);
        let link = match self.booking_link(&params, now) {
            Ok(link) => link,
            Err(reason) => return Ok(BookingOutcome::ConfigError { reason }),
        };

        self.commit(&selection, &order.id(), today)?;

        order.set_meta(meta_keys::REGION, &region);
        order.set_meta(meta_keys::REGION_STRATEGY, &region_strategy);
        order.set_meta(meta_keys::SERVICE_MONTAGE, &counts.montage.to_string());
        order.set_meta(meta_keys::SERVICE_ETAGE, &counts.etage.to_string());
        order.set_meta(meta_keys::BOOKING_URL, &link);
        order.set_meta(meta_keys::BOOKING_CALENDAR, &selection.calendar_id);
        order.set_meta(meta_keys::BOOKING_TEAM, &selection.team_key);
        order.set_meta(
            meta_keys::BOOKING_DATE,
            &selection.date.format("%Y-%m-%d").to_string(),
        );
        let slots = selection
            .slots
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");
        order.set_meta(meta_keys::BOOKING_SLOTS, &slots);

        tracing::info!(
            region = %region,
            team = %selection.team_key,
            date = %selection.date,
            strategy = %selection.strategy,
            "预约规划完成"
        );
        Ok(BookingOutcome::Scheduled { selection, link })
    }

    /// 逐日扫描 next_allowed_date，直到规划窗口结束
    fn find_selection(
        &self,
        region: &str,
        counts: ServiceCounts,
        drive_minutes: Option<i32>,
        today: NaiveDate,
        now: NaiveDateTime,
    ) -> ApiResult<SearchResult> {
        let horizon_end = today + Duration::days(self.settings.horizon_days);
        let planner = self.router.planner();
        let (teams, _) = self.router.base_team_list(region, counts.primary_mode());

        let mut from = today;
        while from <= horizon_end {
            let Some(date) = planner.next_allowed_date(region, from, DEFAULT_MAX_ITERATIONS) else {
                return Ok(SearchResult::NoAllowedDate);
            };
            if date > horizon_end {
                break;
            }

            let mut context = ScheduleContext::new();
            for team in &teams {
                context.insert_day(team, date, self.slots.occupancy(team, date)?);
            }

            if let Some(selection) =
                self.router
                    .select(region, counts, drive_minutes, date, &context, now)?
            {
                return Ok(SearchResult::Found(selection));
            }

            match date.succ_opt() {
                Some(next) => from = next,
                None => break,
            }
        }
        Ok(SearchResult::Exhausted)
    }

    fn booking_link(&self, params: &BookingParams, now: DateTime<Utc>) -> Result<String, String> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| "签名密钥未配置".to_string())?;
        if self.settings.booking_base_url.is_empty() {
            return Err("预约页地址未配置".to_string());
        }
        let sig = signer
            .sign(params, now.timestamp())
            .map_err(|e| e.to_string())?;
        build_url(&self.settings.booking_base_url, params, &sig).map_err(|e| e.to_string())
    }

    /// 确认分配: 先写时段占用（每个服务单位一条），再写计数 / 轮询指针
    fn commit(&self, selection: &Selection, order_id: &str, today: NaiveDate) -> ApiResult<()> {
        let bookings = slot_bookings(selection, order_id);
        self.slots.record_all(&bookings)?;
        self.router.commit(selection, today)?;
        Ok(())
    }

    // ==========================================
    // 预约链接校验
    // ==========================================

    /// 校验访问者打开的预约链接
    pub fn render_booking_link(&self, query: &str, now: DateTime<Utc>) -> LinkResponse {
        match self.verify_query(query, now) {
            Ok((params, issued_at)) => LinkResponse::Accepted { params, issued_at },
            Err(ApiError::Signature(e)) => {
                tracing::warn!(reason = e.reason_code(), "预约链接被拒绝");
                LinkResponse::Rejected {
                    status: e.http_status(),
                    reason: e.reason_code().to_string(),
                    message: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "预约链接校验异常");
                LinkResponse::Rejected {
                    status: 500,
                    reason: "internal".to_string(),
                    message: e.to_string(),
                }
            }
        }
    }

    fn verify_query(&self, query: &str, now: DateTime<Utc>) -> ApiResult<(BookingParams, i64)> {
        let parsed = BookingQuery::parse(query, self.settings.legacy_param_compat)?;
        let mut params = parsed.params;
        params.region = self.aliases.canonical(&params.region);
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| ApiError::ConfigurationError("签名密钥未配置".to_string()))?;
        let issued_at = signer.verify(&params, &parsed.sig, now)?;
        Ok((params, issued_at))
    }
}

/// 按分配结果展开为逐单位的占用记录
fn slot_bookings(selection: &Selection, order_id: &str) -> Vec<SlotBooking> {
    selection
        .placements
        .iter()
        .flat_map(|placement| {
            (0..placement.units).map(move |_| SlotBooking {
                team_key: selection.team_key.clone(),
                date: selection.date,
                slot_index: placement.slot_index,
                service: placement.service,
                order_id: order_id.to_string(),
            })
        })
        .collect()
}

enum SearchResult {
    Found(Selection),
    NoAllowedDate,
    Exhausted,
}
