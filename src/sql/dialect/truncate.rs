//! Time-grain truncation expressions.
//!
//! Weeks start on Monday everywhere except Snowflake, which follows the
//! session `WEEK_START` parameter.

use super::profile::Truncation;
use crate::model::TimeGrain;

/// Truncation expression of the given family.
pub fn truncate(style: Truncation, grain: TimeGrain, expr: &str) -> String {
    match style {
        Truncation::DateTrunc => format!("DATE_TRUNC('{}', {})", grain.as_str(), expr),
        Truncation::TimestampTrunc => {
            let unit = match grain {
                TimeGrain::Week => "ISOWEEK".to_string(),
                other => other.as_str().to_ascii_uppercase(),
            };
            format!("TIMESTAMP_TRUNC({}, {})", expr, unit)
        }
        Truncation::SqlServer => {
            let unit = match grain {
                TimeGrain::Week => "iso_week",
                other => other.as_str(),
            };
            format!("DATETRUNC({}, {})", unit, expr)
        }
        Truncation::Oracle => oracle(grain, expr),
        Truncation::MySql => mysql(grain, expr),
        Truncation::Sqlite => sqlite(grain, expr),
    }
}

fn oracle(grain: TimeGrain, expr: &str) -> String {
    let fmt = match grain {
        // TRUNC stops at minutes.
        TimeGrain::Second => return format!("CAST({} AS TIMESTAMP(0))", expr),
        TimeGrain::Minute => "MI",
        TimeGrain::Hour => "HH",
        TimeGrain::Day => "DD",
        TimeGrain::Week => "IW",
        TimeGrain::Month => "MM",
        TimeGrain::Quarter => "Q",
        TimeGrain::Year => "YYYY",
    };
    format!("TRUNC({}, '{}')", expr, fmt)
}

fn mysql(grain: TimeGrain, expr: &str) -> String {
    let fmt = match grain {
        TimeGrain::Week => return format!("DATE_SUB(DATE({0}), INTERVAL WEEKDAY({0}) DAY)", expr),
        TimeGrain::Quarter => {
            return format!("MAKEDATE(YEAR({0}), 1) + INTERVAL (QUARTER({0}) - 1) QUARTER", expr)
        }
        TimeGrain::Second => "%Y-%m-%d %H:%i:%s",
        TimeGrain::Minute => "%Y-%m-%d %H:%i:00",
        TimeGrain::Hour => "%Y-%m-%d %H:00:00",
        TimeGrain::Day => "%Y-%m-%d",
        TimeGrain::Month => "%Y-%m-01",
        TimeGrain::Year => "%Y-01-01",
    };
    format!("DATE_FORMAT({}, '{}')", expr, fmt)
}

fn sqlite(grain: TimeGrain, expr: &str) -> String {
    let fmt = match grain {
        TimeGrain::Week => return format!("DATE({}, '-6 days', 'weekday 1')", expr),
        TimeGrain::Quarter => {
            return format!(
                "STRFTIME('%Y-', {0}) || PRINTF('%02d', ((CAST(STRFTIME('%m', {0}) AS INTEGER) - 1) / 3) * 3 + 1) || '-01'",
                expr
            )
        }
        TimeGrain::Second => "%Y-%m-%d %H:%M:%S",
        TimeGrain::Minute => "%Y-%m-%d %H:%M:00",
        TimeGrain::Hour => "%Y-%m-%d %H:00:00",
        TimeGrain::Day => "%Y-%m-%d",
        TimeGrain::Month => "%Y-%m-01",
        TimeGrain::Year => "%Y-01-01",
    };
    format!("STRFTIME('{}', {})", fmt, expr)
}
