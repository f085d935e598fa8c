// ==========================================
// 上门安装预约路由系统 - 命令行入口
// ==========================================
// 用法:
//   booking-router reload
//   booking-router get 8000
//   booking-router sample --limit 20
//   booking-router purge --days 7
//   booking-router flush-cache
//   booking-router region 8000
//   booking-router rebuild-mapping
// ==========================================

use anyhow::Context;
use booking_router::api::{BookingOutcome, LinkResponse};
use booking_router::app::{get_default_db_path, AppState};
use booking_router::domain::SimpleOrder;
use booking_router::logging;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// 上门安装预约路由系统
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 数据库路径（默认: BOOKING_ROUTER_DB_PATH 或用户数据目录）
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 强制重读车程表
    Reload,

    /// 查询邮编车程
    Get {
        postcode: String,
    },

    /// 按邮编顺序输出前 N 行
    Sample {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// 清理过期路由计数与时段占用
    Purge {
        /// 保留天数（默认取配置 counter_retention_days）
        #[arg(long)]
        days: Option<i64>,
    },

    /// 清除车程表与区域映射缓存
    FlushCache,

    /// 解释邮编的区域分配
    Region {
        postcode: String,
    },

    /// 由车程表全部邮编重建区域映射
    RebuildMapping,

    /// 列出运维提示
    Notices,

    /// 为 JSON 订单文件规划预约（成功时写回元数据）
    Plan {
        order_file: PathBuf,
    },

    /// 校验预约链接查询串
    VerifyLink {
        query: String,
    },
}

fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(get_default_db_path);
    let state = AppState::new(db_path.clone())
        .with_context(|| format!("无法初始化应用状态: {}", db_path))?;
    let admin = &state.admin_api;
    let now = Utc::now();

    match cli.command {
        Command::Reload => {
            let meta = admin.reload(now);
            println!("{}", serde_json::to_string_pretty(&meta)?);
            if let Some(error) = meta.error {
                anyhow::bail!(error);
            }
        }
        Command::Get { postcode } => match admin.get(&postcode, now) {
            Some(record) => match record.minutes {
                Some(minutes) => println!("{}: {} min", record.postcode, minutes),
                None => println!("{}: auf Anfrage", record.postcode),
            },
            None => println!("{}: 未找到", postcode),
        },
        Command::Sample { limit } => {
            for record in admin.sample(limit) {
                let minutes = record
                    .minutes
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{}\t{}", record.postcode, minutes, record.region);
            }
        }
        Command::Purge { days } => {
            let report = admin.purge(Local::now().date_naive(), days)?;
            println!(
                "cutoff={} counters={} slot_bookings={}",
                report.cutoff, report.counters, report.slot_bookings
            );
        }
        Command::FlushCache => {
            admin.flush_cache();
            println!("缓存已清除");
        }
        Command::Region { postcode } => {
            let report = admin.region(&postcode, now);
            let Some(record) = report.record else {
                println!("{}: 车程表中不存在", report.postcode);
                return Ok(());
            };
            println!(
                "{} canton={} minutes={:?} distance_km={:?}",
                record.postcode,
                record.canton.as_deref().unwrap_or("-"),
                record.minutes,
                record.distance_km
            );
            for trace in &report.trace {
                let mark = if trace.matched { "✔" } else { " " };
                println!(
                    "  [{}] {:>4} {} {}",
                    mark, trace.priority, trace.rule_id, trace.description
                );
            }
            if let Some(a) = report.assignment {
                println!(
                    "=> region={} strategy={} rule={}",
                    a.region,
                    a.strategy,
                    a.rule.as_deref().unwrap_or("-")
                );
            }
        }
        Command::RebuildMapping => {
            let mapping = admin.rebuild_mapping(now);
            println!("{}", serde_json::to_string_pretty(&mapping.stats)?);
        }
        Command::Notices => {
            for notice in admin.notices()? {
                println!(
                    "[{}] x{} {} ({} .. {})",
                    notice.code, notice.hits, notice.message, notice.first_seen, notice.last_seen
                );
            }
        }
        Command::Plan { order_file } => {
            let raw = std::fs::read_to_string(&order_file)
                .with_context(|| format!("无法读取订单文件: {}", order_file.display()))?;
            let mut order: SimpleOrder = serde_json::from_str(&raw)?;
            let outcome = state
                .booking
                .plan_for_order(&mut order, Local::now().date_naive(), now)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if matches!(outcome, BookingOutcome::Scheduled { .. }) {
                std::fs::write(&order_file, serde_json::to_string_pretty(&order)?)?;
            }
        }
        Command::VerifyLink { query } => {
            let response = state.booking.render_booking_link(&query, now);
            println!("{}", serde_json::to_string_pretty(&response)?);
            if let LinkResponse::Rejected { status, .. } = response {
                std::process::exit(i32::from(status / 100));
            }
        }
    }

    Ok(())
}
