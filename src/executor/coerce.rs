//! Driver values to declared column types.

use super::connection::RawRows;
use super::error::{ExecutionError, ExecutionResult};
use super::result::QueryResult;
use crate::model::{Value, ValueType};
use crate::semantic::planner::Projection;

/// Coerce driver rows to the plan's outermost projections, in select order.
///
/// Output column names come from the projections, not the driver.
pub fn coerce_rows(raw: RawRows, projections: &[Projection], sql: &str) -> ExecutionResult<QueryResult> {
    if raw.columns.len() != projections.len() {
        return Err(ExecutionError::Shape {
            sql: sql.to_string(),
            message: format!(
                "expected {} columns, driver returned {}",
                projections.len(),
                raw.columns.len()
            ),
        });
    }

    let mut result = QueryResult::new(projections.iter().map(|p| p.alias.clone()).collect());
    result.rows.reserve(raw.rows.len());
    for row in raw.rows {
        let coerced = row
            .into_iter()
            .zip(projections)
            .map(|(value, projection)| {
                coerce(value, projection.value_type).map_err(|value| ExecutionError::Coercion {
                    sql: sql.to_string(),
                    column: projection.alias.clone(),
                    expected: projection.value_type.to_string(),
                    value: value.to_string(),
                })
            })
            .collect::<ExecutionResult<Vec<_>>>()?;
        result.rows.push(coerced);
    }
    Ok(result)
}

/// Read a count result (page totals).
pub fn coerce_count(raw: &RawRows, sql: &str) -> ExecutionResult<u64> {
    let shape_error = |message: &str| ExecutionError::Shape {
        sql: sql.to_string(),
        message: message.to_string(),
    };
    match raw.scalar() {
        Some(Value::Integer(n)) if *n >= 0 => Ok(*n as u64),
        Some(other) => match coerce(other.clone(), ValueType::Integer) {
            Ok(Value::Integer(n)) if n >= 0 => Ok(n as u64),
            _ => Err(shape_error("count is not a non-negative integer")),
        },
        None => Err(shape_error("count query must return one row with one column")),
    }
}

/// Convert one value; the offending value comes back on failure.
///
/// Integer columns widen to decimals rather than truncate (e.g. an average
/// over an integer column).
pub fn coerce(value: Value, value_type: ValueType) -> Result<Value, Value> {
    match (value_type, value) {
        (_, Value::Null) => Ok(Value::Null),

        (ValueType::Integer, Value::Decimal(f)) if is_integral(f) => Ok(Value::Integer(f as i64)),
        (ValueType::Integer, Value::Boolean(b)) => Ok(Value::Integer(i64::from(b))),
        (ValueType::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
            Ok(n) => Ok(Value::Integer(n)),
            Err(_) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::Decimal(f)),
                _ => Err(Value::Text(s)),
            },
        },
        (ValueType::Integer, value) => Ok(value),

        (ValueType::Id, Value::Decimal(f)) if is_integral(f) => Ok(Value::Integer(f as i64)),
        (ValueType::Id, value) => Ok(value),

        (ValueType::Decimal, Value::Integer(n)) => Ok(Value::Decimal(n as f64)),
        (ValueType::Decimal, Value::Text(s)) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Value::Decimal(f)),
            _ => Err(Value::Text(s)),
        },
        (ValueType::Decimal, Value::Boolean(b)) => Err(Value::Boolean(b)),
        (ValueType::Decimal, value) => Ok(value),

        (ValueType::Boolean, Value::Integer(0)) => Ok(Value::Boolean(false)),
        (ValueType::Boolean, Value::Integer(1)) => Ok(Value::Boolean(true)),
        (ValueType::Boolean, Value::Text(s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" => Ok(Value::Boolean(false)),
            _ => Err(Value::Text(s)),
        },
        (ValueType::Boolean, Value::Boolean(b)) => Ok(Value::Boolean(b)),
        (ValueType::Boolean, value) => Err(value),

        (ValueType::Text | ValueType::Enum, Value::Decimal(f)) => {
            let mut buffer = ryu::Buffer::new();
            Ok(Value::Text(buffer.format(f).to_string()))
        }
        (ValueType::Text | ValueType::Enum, Value::Text(s)) => Ok(Value::Text(s)),
        (ValueType::Text | ValueType::Enum, value) => Ok(Value::Text(value.to_string())),

        (ValueType::Time, Value::Text(s)) if ValueType::Time.matches(&s) => Ok(Value::Text(s)),
        (ValueType::Time, Value::Integer(n)) => Ok(Value::Text(n.to_string())),
        (ValueType::Time, value) => Err(value),
    }
}

fn is_integral(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64
}
