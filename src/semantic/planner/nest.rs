//! Nesting a plan one level deeper.
//!
//! Every metric of the outermost level is split into inner pieces computed at
//! the current level and an outer expression re-aggregating them:
//!
//! ```text
//! SUM(x)    inner SUM(x)              outer SUM(a)
//! COUNT(x)  inner COUNT(x)            outer SUM(a)
//! MIN(x)    inner MIN(x)              outer MIN(a)
//! MAX(x)    inner MAX(x)              outer MAX(a)
//! AVG(x)    inner SUM(x), COUNT(x)    outer 1.0 * SUM(a_sum) / SUM(a_count)
//! ```
//!
//! Formula metrics are parsed with sqlparser and every top-level aggregate
//! call is split the same way.

use sqlparser::ast::{
    DuplicateTreatment, Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Ident,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::model::{Aggregation, ColumnKind};
use crate::semantic::error::SemanticResult;
use crate::semantic::resolver::{reference, Resolver};

use super::plan::{PlanSource, Projection, ProjectionTemplate, QueryPlan};

/// Inner pieces and the outer expression for one metric.
#[derive(Debug, Clone, PartialEq)]
struct Decomposed {
    inner: Vec<Projection>,
    outer: String,
}

/// Nest `plan` under a new outer level.
///
/// Returns `None` when some metric of the outermost level cannot be split.
/// The new outer level takes over having, sorting and pagination.
pub fn nest(plan: &QueryPlan, resolver: &mut Resolver<'_>) -> SemanticResult<Option<QueryPlan>> {
    let mut inner_projections = Vec::new();
    let mut outer_projections = Vec::new();

    for projection in &plan.projections {
        if !projection.is_metric() {
            inner_projections.push(projection.clone());
            outer_projections.push(projection.pass_through());
            continue;
        }
        let Some(decomposed) = decompose(plan, projection, resolver)? else {
            debug!(metric = %projection.alias, "metric cannot be nested");
            return Ok(None);
        };
        for piece in decomposed.inner {
            if !inner_projections.iter().any(|p: &Projection| p.alias == piece.alias) {
                inner_projections.push(piece);
            }
        }
        outer_projections.push(Projection {
            template: ProjectionTemplate::Expression(decomposed.outer),
            ..projection.clone()
        });
    }

    let mut inner = plan.clone();
    inner.projections = inner_projections;
    inner.having_filter = None;
    inner.sorting = Vec::new();
    inner.pagination = None;

    let mut outer = QueryPlan::over_plan(inner);
    outer.projections = outer_projections;
    outer.having_filter = plan.having_filter.clone();
    outer.sorting = plan.sorting.clone();
    outer.pagination = plan.pagination;
    outer.refinable = plan.refinable;
    Ok(Some(outer))
}

fn decompose(
    level: &QueryPlan,
    projection: &Projection,
    resolver: &mut Resolver<'_>,
) -> SemanticResult<Option<Decomposed>> {
    let PlanSource::Table(table_name) = &level.source else {
        // Derived scope: the template is all there is.
        return Ok(match &projection.template {
            ProjectionTemplate::Expression(template) => decompose_formula(projection, template),
            ProjectionTemplate::Column => decompose_formula(
                projection,
                &format!("{{{{${}}}}}", projection.alias),
            ),
        });
    };

    // Split the definition with its references expanded, so metrics built
    // from other metrics decompose into the aggregates underneath.
    let table = resolver.schema().table(table_name)?;
    let inlined = match &projection.template {
        ProjectionTemplate::Column => resolver.inline_column(
            table,
            &projection.name,
            &projection.arguments,
            &level.arguments,
        )?,
        ProjectionTemplate::Expression(template) => resolver.inline_template(
            table,
            template,
            &projection.name,
            &projection.arguments,
            &level.arguments,
        )?,
    };
    if inlined.needs_join() {
        return Ok(None);
    }

    let declared = match &projection.template {
        ProjectionTemplate::Column => table
            .column(&projection.name)
            .and_then(|column| column.aggregation.map(|agg| (agg, column))),
        ProjectionTemplate::Expression(_) => None,
    };
    Ok(match declared {
        Some((agg, column)) => decompose_aggregation(projection, agg, &column.formula),
        None => decompose_formula(projection, &inlined.sql),
    })
}

/// Split a schema metric by its declared aggregation.
fn decompose_aggregation(projection: &Projection, agg: Aggregation, formula: &str) -> Option<Decomposed> {
    let alias = &projection.alias;
    match agg {
        Aggregation::CountDistinct => None,
        Aggregation::Avg => {
            let sum = format!("{}_sum", alias);
            let count = format!("{}_count", alias);
            Some(Decomposed {
                inner: vec![
                    piece(projection, &sum, format!("SUM({})", formula)),
                    piece(projection, &count, format!("COUNT({})", formula)),
                ],
                outer: avg_outer(&sum, &count),
            })
        }
        agg => Some(Decomposed {
            inner: vec![projection.clone()],
            outer: format!("{}({})", outer_function(agg), pass(alias)),
        }),
    }
}

/// Aggregate calls found in a formula.
#[derive(Debug)]
struct AggregateCall {
    function: Aggregation,
    /// Parenthesized argument text, placeholders included.
    arguments: String,
}

/// Split a formula by rewriting each top-level aggregate call.
fn decompose_formula(projection: &Projection, template: &str) -> Option<Decomposed> {
    let tokens = reference::tokens(template);
    let mut placeholder_sql = String::with_capacity(template.len());
    let mut originals = Vec::with_capacity(tokens.len());
    let mut last = 0;
    for (idx, token) in tokens.iter().enumerate() {
        placeholder_sql.push_str(&template[last..token.span.start]);
        placeholder_sql.push_str(&ref_placeholder(idx));
        originals.push(&template[token.span.clone()]);
        last = token.span.end;
    }
    placeholder_sql.push_str(&template[last..]);

    let mut expr = Parser::new(&GenericDialect {})
        .try_with_sql(&placeholder_sql)
        .and_then(|mut parser| parser.parse_expr())
        .ok()?;

    let mut calls = Vec::new();
    extract_aggregates(&mut expr, &mut calls).ok()?;
    if calls.is_empty() {
        return None;
    }

    let mut outer = expr.to_string();
    if outer.contains("__ref_") {
        // A reference outside every aggregate.
        return None;
    }

    let restore = |text: &str| -> String {
        let mut restored = text.to_string();
        for (idx, original) in originals.iter().enumerate().rev() {
            restored = restored.replace(&ref_placeholder(idx), original);
        }
        restored
    };

    let single = calls.len() == 1;
    let mut inner = Vec::new();
    for (idx, call) in calls.iter().enumerate() {
        let base = if single {
            projection.alias.clone()
        } else {
            format!("{}_{}", projection.alias, idx)
        };
        let arguments = restore(&call.arguments);
        let replacement = match call.function {
            Aggregation::Avg => {
                let sum = format!("{}_sum", base);
                let count = format!("{}_count", base);
                inner.push(piece(projection, &sum, format!("SUM{}", arguments)));
                inner.push(piece(projection, &count, format!("COUNT{}", arguments)));
                format!("({})", avg_outer(&sum, &count))
            }
            agg => {
                inner.push(piece(
                    projection,
                    &base,
                    format!("{}{}", agg.function_name(), arguments),
                ));
                format!("{}({})", outer_function(agg), pass(&base))
            }
        };
        outer = outer.replace(&agg_placeholder(idx), &replacement);
    }

    Some(Decomposed { inner, outer })
}

/// Replace aggregate calls with placeholders, innermost expressions first.
///
/// Fails on DISTINCT aggregates and window functions.
fn extract_aggregates(expr: &mut Expr, calls: &mut Vec<AggregateCall>) -> Result<(), ()> {
    match expr {
        Expr::Function(function) => {
            if let Some(agg) = aggregate_of(function)? {
                let name_len = function.name.to_string().len();
                let text = function.to_string();
                let idx = calls.len();
                calls.push(AggregateCall {
                    function: agg,
                    arguments: text[name_len..].to_string(),
                });
                *expr = Expr::Identifier(Ident::new(agg_placeholder(idx)));
                return Ok(());
            }
            if let FunctionArguments::List(list) = &mut function.args {
                for arg in &mut list.args {
                    if let FunctionArg::Unnamed(FunctionArgExpr::Expr(inner)) = arg {
                        extract_aggregates(inner, calls)?;
                    }
                }
            }
            Ok(())
        }
        Expr::BinaryOp { left, right, .. } => {
            extract_aggregates(left, calls)?;
            extract_aggregates(right, calls)
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
            extract_aggregates(expr, calls)
        }
        _ => Ok(()),
    }
}

fn aggregate_of(function: &Function) -> Result<Option<Aggregation>, ()> {
    let agg = match function.name.to_string().to_ascii_uppercase().as_str() {
        "SUM" => Aggregation::Sum,
        "COUNT" => Aggregation::Count,
        "MIN" => Aggregation::Min,
        "MAX" => Aggregation::Max,
        "AVG" => Aggregation::Avg,
        _ => return Ok(None),
    };
    if function.over.is_some() {
        return Err(());
    }
    if let FunctionArguments::List(list) = &function.args {
        if matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct)) {
            return Err(());
        }
    }
    Ok(Some(agg))
}

fn piece(projection: &Projection, alias: &str, template: String) -> Projection {
    Projection {
        name: projection.name.clone(),
        alias: alias.to_string(),
        kind: ColumnKind::Metric,
        value_type: projection.value_type,
        template: ProjectionTemplate::Expression(template),
        arguments: projection.arguments.clone(),
        grain: None,
    }
}

fn outer_function(agg: Aggregation) -> &'static str {
    match agg {
        Aggregation::Count => "SUM",
        other => other.function_name(),
    }
}

fn avg_outer(sum: &str, count: &str) -> String {
    format!("1.0 * SUM({}) / SUM({})", pass(sum), pass(count))
}

fn pass(alias: &str) -> String {
    format!("{{{{${}}}}}", alias)
}

fn ref_placeholder(idx: usize) -> String {
    format!("__ref_{}__", idx)
}

fn agg_placeholder(idx: usize) -> String {
    format!("__agg_{}__", idx)
}
