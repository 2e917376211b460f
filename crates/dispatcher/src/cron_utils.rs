use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::debug;

use jobflow_core::{models::CronType, Result, SchedulerError};

/// CRON表达式解析和调度工具
///
/// 统一按UTC计算。CRONTAB 5段式表达式先规范化为带秒的形式再交给 `cron` 解析。
#[derive(Debug, Clone)]
pub struct CronScheduler {
    schedule: Schedule,
    expression: String,
}

impl CronScheduler {
    pub fn new(cron_expr: &str, cron_type: CronType) -> Result<Self> {
        let expression = normalize_expression(cron_expr, cron_type)?;
        let schedule = Schedule::from_str(&expression).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;
        debug!("CRON表达式 '{}' 规范化为 '{}'", cron_expr, expression);

        Ok(Self {
            schedule,
            expression,
        })
    }

    /// 规范化之后交给 `cron` 的表达式
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 获取下一次执行时间（严格晚于 `from`）
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 计算下次执行时间距离现在的时长
    pub fn time_until_next_execution(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_execution_time(now).map(|next| next - now)
    }

    /// 验证CRON表达式是否有效
    pub fn validate_cron_expression(cron_expr: &str, cron_type: CronType) -> Result<()> {
        Self::new(cron_expr, cron_type).map(|_| ())
    }
}

/// 把表达式转换为 `cron` 接受的 6/7 段形式
///
/// - CRONTAB: 必须是5段，前面补秒字段 `0`，星期字段从 0-7（周日为0或7）转换为 1-7（周日为1）
/// - QUARTZ: 必须是6或7段，原样保留
///
/// 两种风格都把 `?` 当作 `*`，且月内日期和星期不能同时受限：`cron` 对两者取交集，
/// 与 CRONTAB 的并集语义不同，QUARTZ 本身也不允许同时指定。
pub fn normalize_expression(cron_expr: &str, cron_type: CronType) -> Result<String> {
    let invalid = |message: String| SchedulerError::InvalidCron {
        expr: cron_expr.to_string(),
        message,
    };

    let fields: Vec<String> = cron_expr
        .split_whitespace()
        .map(|f| if f == "?" { "*".to_string() } else { f.to_string() })
        .collect();

    match cron_type {
        CronType::Crontab => {
            if fields.len() != 5 {
                return Err(invalid(format!("CRONTAB表达式需要5个字段，实际为{}个", fields.len())));
            }
            check_day_fields(&fields[2], &fields[4]).map_err(invalid)?;
            let day_of_week = shift_day_of_week(&fields[4]).map_err(invalid)?;
            Ok(format!(
                "0 {} {} {} {} {}",
                fields[0], fields[1], fields[2], fields[3], day_of_week
            ))
        }
        CronType::Quartz => {
            if fields.len() != 6 && fields.len() != 7 {
                return Err(invalid(format!("QUARTZ表达式需要6或7个字段，实际为{}个", fields.len())));
            }
            check_day_fields(&fields[3], &fields[5]).map_err(invalid)?;
            Ok(fields.join(" "))
        }
    }
}

/// 以 `*` 开头的字段（包括 `*/2`）视为不受限
fn check_day_fields(day_of_month: &str, day_of_week: &str) -> std::result::Result<(), String> {
    if day_of_month.starts_with('*') || day_of_week.starts_with('*') {
        return Ok(());
    }
    Err(format!(
        "月内日期({day_of_month})和星期({day_of_week})不能同时指定，其中一个需为 * 或 ?"
    ))
}

fn shift_day_of_week(field: &str) -> std::result::Result<String, String> {
    let parts: std::result::Result<Vec<String>, String> =
        field.split(',').map(shift_day_of_week_part).collect();
    Ok(parts?.join(","))
}

/// 步长部分（`/` 之后）不做转换
fn shift_day_of_week_part(part: &str) -> std::result::Result<String, String> {
    let (base, step) = match part.split_once('/') {
        Some((base, step)) => (base, Some(step)),
        None => (part, None),
    };

    let shifted = if let Some((start, end)) = base.split_once('-') {
        match (parse_day(start)?, parse_day(end)?) {
            (Some(start), Some(end)) => shift_range(start, end)?,
            _ => base.to_string(),
        }
    } else {
        match parse_day(base)? {
            Some(day) => shift_day(day).to_string(),
            None => base.to_string(),
        }
    };

    if shifted.contains(',') && step.is_some() {
        return Err(format!("不支持包含周日的带步长星期范围: {part}"));
    }

    Ok(match step {
        Some(step) => format!("{shifted}/{step}"),
        None => shifted,
    })
}

/// 数字星期，名称（MON）和通配符返回 `None`
fn parse_day(value: &str) -> std::result::Result<Option<u8>, String> {
    if !value.chars().all(|c| c.is_ascii_digit()) || value.is_empty() {
        return Ok(None);
    }
    match value.parse::<u8>() {
        Ok(day) if day <= 7 => Ok(Some(day)),
        _ => Err(format!("星期取值超出范围: {value}")),
    }
}

fn shift_day(day: u8) -> u8 {
    if day == 0 || day == 7 {
        1
    } else {
        day + 1
    }
}

fn shift_range(start: u8, end: u8) -> std::result::Result<String, String> {
    if start > end {
        return Err(format!("星期范围无效: {start}-{end}"));
    }
    Ok(match (start, end) {
        (0, 7) | (0, 6) | (1, 7) => "1-7".to_string(),
        (0, end) => format!("1-{}", end + 1),
        (start, 7) if start == 7 => "1".to_string(),
        (start, 7) => format!("{}-7,1", start + 1),
        (start, end) => format!("{}-{}", start + 1, end + 1),
    })
}
