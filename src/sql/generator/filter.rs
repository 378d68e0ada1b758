//! Filter trees to SQL expressions.

use crate::model::{Value, ValueType};
use crate::semantic::error::{QueryClause, SemanticError, SemanticResult};
use crate::semantic::query::{FilterExpression, Operator, Predicate};
use crate::sql::expr::{CompareOp, Expr, LikeMatch};
use crate::sql::token::Literal;

/// Stateless filter converter.
pub struct FilterConverter;

impl FilterConverter {
    /// Convert a filter tree. `lookup` supplies the left-hand side of each
    /// predicate and its declared type.
    pub fn convert<F>(filter: &FilterExpression, clause: QueryClause, lookup: &mut F) -> SemanticResult<Expr>
    where
        F: FnMut(&Predicate) -> SemanticResult<(Expr, ValueType)>,
    {
        match filter {
            FilterExpression::And(children) => Ok(Expr::all(Self::convert_all(children, clause, lookup)?)),
            FilterExpression::Or(children) => Ok(Expr::any(Self::convert_all(children, clause, lookup)?)),
            FilterExpression::Not(inner) => Ok(Self::convert(inner, clause, lookup)?.negate()),
            FilterExpression::Predicate(predicate) => {
                let (lhs, value_type) = lookup(predicate)?;
                Self::predicate(lhs, predicate, value_type, clause)
            }
        }
    }

    fn convert_all<F>(children: &[FilterExpression], clause: QueryClause, lookup: &mut F) -> SemanticResult<Vec<Expr>>
    where
        F: FnMut(&Predicate) -> SemanticResult<(Expr, ValueType)>,
    {
        children
            .iter()
            .map(|child| Self::convert(child, clause, &mut *lookup))
            .collect()
    }

    fn predicate(
        lhs: Expr,
        predicate: &Predicate,
        value_type: ValueType,
        clause: QueryClause,
    ) -> SemanticResult<Expr> {
        let values = &predicate.values;
        let literal = |idx: usize| -> SemanticResult<Expr> {
            let value = values.get(idx).ok_or_else(|| {
                SemanticError::invalid_query(
                    clause,
                    format!("missing value for '{}'", predicate.path.to_dotted()),
                )
            })?;
            Self::literal(value, value_type, clause).map(Expr::literal)
        };
        let all = || -> SemanticResult<Vec<Expr>> {
            values
                .iter()
                .map(|v| Self::literal(v, value_type, clause).map(Expr::literal))
                .collect()
        };

        Ok(match predicate.operator {
            Operator::Eq => lhs.compare(CompareOp::Eq, literal(0)?),
            Operator::Ne => lhs.compare(CompareOp::Ne, literal(0)?),
            Operator::Lt => lhs.compare(CompareOp::Lt, literal(0)?),
            Operator::Le => lhs.compare(CompareOp::Le, literal(0)?),
            Operator::Gt => lhs.compare(CompareOp::Gt, literal(0)?),
            Operator::Ge => lhs.compare(CompareOp::Ge, literal(0)?),
            Operator::In => lhs.in_list(all()?, false),
            Operator::NotIn => lhs.in_list(all()?, true),
            Operator::IsNull => lhs.is_null(false),
            Operator::NotNull => lhs.is_null(true),
            Operator::Between => lhs.between(literal(0)?, literal(1)?),
            Operator::Prefix | Operator::Postfix | Operator::Infix => {
                let text = values.first().and_then(Value::as_str).ok_or_else(|| {
                    SemanticError::invalid_query(
                        clause,
                        format!("'{}' needs a text pattern", predicate.path.to_dotted()),
                    )
                })?;
                let position = match predicate.operator {
                    Operator::Prefix => LikeMatch::Prefix,
                    Operator::Postfix => LikeMatch::Suffix,
                    _ => LikeMatch::Contains,
                };
                lhs.like(text, position)
            }
        })
    }

    /// SQL literal for a client value, typed by the column it compares to.
    fn literal(value: &Value, value_type: ValueType, clause: QueryClause) -> SemanticResult<Literal> {
        let non_finite = || SemanticError::invalid_query(clause, "filter values must be finite numbers");
        Ok(match value {
            Value::Null => Literal::Null,
            Value::Boolean(b) => Literal::Bool(*b),
            Value::Integer(n) if value_type == ValueType::Decimal => Literal::Float(*n as f64),
            Value::Integer(n) => Literal::Int(*n),
            Value::Decimal(f) if !f.is_finite() => return Err(non_finite()),
            Value::Decimal(f) => Literal::Float(*f),
            Value::Text(s) => match value_type {
                ValueType::Integer | ValueType::Id => match s.parse::<i64>() {
                    Ok(n) => Literal::Int(n),
                    Err(_) => Literal::Text(s.clone()),
                },
                ValueType::Decimal => match s.parse::<f64>() {
                    Ok(f) if f.is_finite() => Literal::Float(f),
                    Ok(_) => return Err(non_finite()),
                    Err(_) => Literal::Text(s.clone()),
                },
                ValueType::Boolean => match s.to_ascii_lowercase().as_str() {
                    "true" => Literal::Bool(true),
                    "false" => Literal::Bool(false),
                    _ => Literal::Text(s.clone()),
                },
                ValueType::Text | ValueType::Time | ValueType::Enum => Literal::Text(s.clone()),
            },
        })
    }
}
