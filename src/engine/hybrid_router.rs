// ==========================================
// 上门安装预约路由系统 - 混合路由器
// ==========================================
// 团队顺序:
// 1) 取 (区域, 主服务类型) 的优先级列表；无则取区域通用列表；
//    再无则取全局默认列表（strategy = fallback）；区域有日历配置时截断到并发团队数
// 2) 车程已知且 <= 轮询阈值: 按轮询指针旋转，再按当日已分配单数稳定升序（rr）
//    否则保持静态优先级（priority）
// 3) 逐团队: 先试最早起始时段，再逐个后移
// ==========================================

use crate::domain::schedule::{ScheduleContext, ServiceCounts, SlotPlacement};
use crate::domain::types::{RouteStrategy, ServiceType};
use crate::engine::canonical::RegionAliases;
use crate::engine::day_planner::RegionDayPlanner;
use crate::engine::router_state::RouterState;
use crate::engine::slot_schedule::SlotSchedule;
use crate::repository::error::RepositoryResult;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// 默认轮询车程阈值（分钟）
pub const DEFAULT_RR_THRESHOLD_MINUTES: i32 = 45;

// ==========================================
// RegionPriorityList - 区域团队优先级
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionPriorityList {
    #[serde(default)]
    pub montage: Vec<String>,
    #[serde(default)]
    pub etage: Vec<String>,
    /// 不区分服务类型的通用列表
    #[serde(default)]
    pub default: Vec<String>,
}

impl RegionPriorityList {
    fn for_mode(&self, mode: ServiceType) -> &[String] {
        let specific = match mode {
            ServiceType::Montage => &self.montage,
            ServiceType::Etage => &self.etage,
        };
        if specific.is_empty() {
            &self.default
        } else {
            specific
        }
    }
}

// ==========================================
// RouterConfig - 路由配置
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// 区域代码 → 优先级列表
    pub priority_lists: HashMap<String, RegionPriorityList>,
    /// 团队 → 日历 ID
    pub calendar_ids: HashMap<String, String>,
    /// 全局默认团队
    pub default_teams: Vec<String>,
    pub rr_threshold_minutes: i32,
}

impl RouterConfig {
    /// 区域键按别名规范化
    pub fn canonicalized(mut self, aliases: &RegionAliases) -> Self {
        self.priority_lists = self
            .priority_lists
            .into_iter()
            .map(|(region, list)| (aliases.canonical(&region), list))
            .collect();
        self
    }
}

// ==========================================
// Selection - 路由结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub team_key: String,
    pub calendar_id: String,
    pub strategy: RouteStrategy,
    pub date: NaiveDate,
    pub slots: Vec<usize>,
    /// 各时段分到的服务单位
    pub placements: Vec<SlotPlacement>,
    pub region: String,
    pub mode: ServiceType,
    /// 参与排序的团队数（推进轮询指针用）
    pub candidate_count: usize,
}

/// 排序后的候选团队
#[derive(Debug, Clone, PartialEq)]
pub struct TeamOrder {
    pub teams: Vec<String>,
    pub strategy: RouteStrategy,
}

// ==========================================
// HybridRouter - 混合路由器
// ==========================================
pub struct HybridRouter {
    config: RouterConfig,
    planner: RegionDayPlanner,
    schedule: SlotSchedule,
    state: Arc<dyn RouterState>,
}

impl HybridRouter {
    pub fn new(
        config: RouterConfig,
        planner: RegionDayPlanner,
        schedule: SlotSchedule,
        state: Arc<dyn RouterState>,
    ) -> Self {
        Self {
            config,
            planner,
            schedule,
            state,
        }
    }

    pub fn planner(&self) -> &RegionDayPlanner {
        &self.planner
    }

    pub fn schedule(&self) -> &SlotSchedule {
        &self.schedule
    }

    pub fn state(&self) -> &Arc<dyn RouterState> {
        &self.state
    }

    pub fn calendar_id(&self, team_key: &str) -> Option<&str> {
        self.config.calendar_ids.get(team_key).map(String::as_str)
    }

    /// 区域配置的静态团队列表（有日历配置的区域截断到并发团队数）
    pub fn base_team_list(&self, region: &str, mode: ServiceType) -> (Vec<String>, RouteStrategy) {
        let configured = self
            .config
            .priority_lists
            .get(region)
            .map(|list| list.for_mode(mode))
            .filter(|list| !list.is_empty());

        let (list, strategy) = match configured {
            Some(list) => (list, RouteStrategy::Priority),
            None => (self.config.default_teams.as_slice(), RouteStrategy::Fallback),
        };

        let mut teams: Vec<String> = Vec::with_capacity(list.len());
        for team in list {
            if !teams.contains(team) {
                teams.push(team.clone());
            }
        }
        if let Some(limit) = self.planner.team_limit(region) {
            teams.truncate(limit);
        }
        (teams, strategy)
    }

    /// 候选团队排序
    pub fn ordered_teams(
        &self,
        region: &str,
        mode: ServiceType,
        drive_minutes: Option<i32>,
        today: NaiveDate,
    ) -> RepositoryResult<TeamOrder> {
        let (mut teams, base_strategy) = self.base_team_list(region, mode);

        let use_rr = base_strategy == RouteStrategy::Priority
            && teams.len() > 1
            && drive_minutes.is_some_and(|m| m <= self.config.rr_threshold_minutes);

        if !use_rr {
            return Ok(TeamOrder {
                teams,
                strategy: base_strategy,
            });
        }

        let pointer = self.state.rr_pointer(region, mode)?.pointer % teams.len();
        teams.rotate_left(pointer);

        let mut loads: Vec<(String, i64)> = Vec::with_capacity(teams.len());
        for team in teams {
            let load = match self.calendar_id(&team) {
                Some(cal) => self.state.day_total(today, cal)?,
                None => 0,
            };
            loads.push((team, load));
        }
        // sort_by_key 为稳定排序，同负载保持旋转后的顺序
        loads.sort_by_key(|(_, load)| *load);

        Ok(TeamOrder {
            teams: loads.into_iter().map(|(team, _)| team).collect(),
            strategy: RouteStrategy::Rr,
        })
    }

    /// 在指定日期为订单选择团队与时段
    ///
    /// # 参数
    /// - region: 规范化区域代码
    /// - counts: 订单服务构成
    /// - drive_minutes: 车程（未知时不走轮询）
    /// - date: 候选日期
    /// - context: 时段占用
    /// - now: 当地当前时刻
    ///
    /// # 返回
    /// - Ok(None): 当日无可用团队/时段（正常结果）
    #[instrument(skip(self, context), fields(region = %region, date = %date))]
    pub fn select(
        &self,
        region: &str,
        counts: ServiceCounts,
        drive_minutes: Option<i32>,
        date: NaiveDate,
        context: &ScheduleContext,
        now: NaiveDateTime,
    ) -> RepositoryResult<Option<Selection>> {
        let mode = counts.primary_mode();
        let order = self.ordered_teams(region, mode, drive_minutes, now.date())?;
        let candidate_count = order.teams.len();

        for team in &order.teams {
            let Some(calendar_id) = self.calendar_id(team) else {
                tracing::warn!(team = %team, "团队未配置日历 ID，跳过");
                continue;
            };
            if let Some(run) = self.schedule.find_for_day(team, date, counts, context, now) {
                tracing::debug!(team = %team, slots = ?run.slots, strategy = %order.strategy, "路由命中");
                return Ok(Some(Selection {
                    team_key: team.clone(),
                    calendar_id: calendar_id.to_string(),
                    strategy: order.strategy,
                    date,
                    slots: run.slots,
                    placements: run.placements,
                    region: region.to_string(),
                    mode,
                    candidate_count,
                }));
            }
        }
        Ok(None)
    }

    /// 确认分配: 计数 +1；轮询选择时推进指针
    pub fn commit(&self, selection: &Selection, today: NaiveDate) -> RepositoryResult<i64> {
        let count = self
            .state
            .increment(today, &selection.calendar_id, selection.mode)?;
        if selection.strategy == RouteStrategy::Rr {
            self.state
                .advance_rr(&selection.region, selection.mode, selection.candidate_count)?;
        }
        Ok(count)
    }
}
