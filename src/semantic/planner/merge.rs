//! Merging per-metric plans into one query.

use std::collections::BTreeSet;

use tracing::debug;

use crate::semantic::error::{QueryClause, SemanticError, SemanticResult};
use crate::semantic::resolver::Resolver;

use super::nest::nest;
use super::plan::{PlanSource, Projection, QueryPlan};

/// Merge plans pairwise in order. Fails when any plan is left over.
pub fn merge_all(plans: Vec<QueryPlan>, resolver: &mut Resolver<'_>) -> SemanticResult<QueryPlan> {
    let mut merged: Vec<QueryPlan> = Vec::new();
    for plan in plans {
        let mut placed = false;
        for existing in merged.iter_mut() {
            if let Some(combined) = merge(existing, &plan, resolver)? {
                *existing = combined;
                placed = true;
                break;
            }
        }
        if !placed {
            merged.push(plan);
        }
    }

    match merged.len() {
        0 => Err(SemanticError::invalid_query(
            QueryClause::Metrics,
            "no metric plans to merge",
        )),
        1 => Ok(merged.remove(0)),
        _ => {
            let groups: Vec<String> = merged
                .iter()
                .map(|p| {
                    p.metrics()
                        .map(|m| m.alias.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .collect();
            Err(SemanticError::invalid_query(
                QueryClause::Metrics,
                format!(
                    "metrics cannot be computed in a single query: [{}]",
                    groups.join("] [")
                ),
            ))
        }
    }
}

/// Merge two plans, nesting the shallower one until the depths match.
///
/// `Ok(None)` means the plans are incompatible.
pub fn merge(
    a: &QueryPlan,
    b: &QueryPlan,
    resolver: &mut Resolver<'_>,
) -> SemanticResult<Option<QueryPlan>> {
    let Some(a) = deepen(a.clone(), b.depth(), resolver)? else {
        return Ok(None);
    };
    let Some(b) = deepen(b.clone(), a.depth(), resolver)? else {
        return Ok(None);
    };
    merge_levels(&a, &b)
}

fn deepen(
    mut plan: QueryPlan,
    depth: usize,
    resolver: &mut Resolver<'_>,
) -> SemanticResult<Option<QueryPlan>> {
    while plan.depth() < depth {
        let direct = !plan.is_nested();
        match nest(&plan, resolver)? {
            Some(mut nested) => {
                if direct {
                    nested.mark_refinable();
                }
                plan = nested;
            }
            None => return Ok(None),
        }
    }
    Ok(Some(plan))
}

fn merge_levels(a: &QueryPlan, b: &QueryPlan) -> SemanticResult<Option<QueryPlan>> {
    if canonical(&a.where_filter) != canonical(&b.where_filter) || a.arguments != b.arguments {
        return Ok(None);
    }

    let source = match (&a.source, &b.source) {
        (PlanSource::Table(ta), PlanSource::Table(tb)) if ta == tb => a.source.clone(),
        (PlanSource::Plan(ia), PlanSource::Plan(ib)) => match merge_levels(ia, ib)? {
            Some(inner) => PlanSource::Plan(Box::new(inner)),
            None => return Ok(None),
        },
        _ => return Ok(None),
    };

    let Some(mut projections) = merge_dimensions(a, b) else {
        debug!("dimension sets differ");
        return Ok(None);
    };

    for metric in a.metrics().chain(b.metrics()) {
        match projections.iter().find(|p| p.alias == metric.alias) {
            Some(existing) if existing == metric => {}
            Some(_) => {
                return Err(SemanticError::invalid_query(
                    QueryClause::Metrics,
                    format!("conflicting definitions for alias '{}'", metric.alias),
                ))
            }
            None => projections.push(metric.clone()),
        }
    }

    Ok(Some(QueryPlan {
        source,
        projections,
        where_filter: a.where_filter.clone(),
        having_filter: None,
        sorting: Vec::new(),
        pagination: None,
        arguments: a.arguments.clone(),
        refinable: a.refinable && b.refinable,
    }))
}

/// Union of the dimension lists when the sets match, or when the refinable
/// side's set is contained in the other's.
fn merge_dimensions(a: &QueryPlan, b: &QueryPlan) -> Option<Vec<Projection>> {
    let keys_a = dimension_keys(a);
    let keys_b = dimension_keys(b);

    let (base, extra) = if keys_a == keys_b {
        (a, None)
    } else if a.refinable && keys_a.is_subset(&keys_b) {
        (a, Some(b))
    } else if b.refinable && keys_b.is_subset(&keys_a) {
        (b, Some(a))
    } else {
        return None;
    };

    let mut dims: Vec<Projection> = base.dimensions().cloned().collect();
    if let Some(extra) = extra {
        for dim in extra.dimensions() {
            if !dims.iter().any(|d| d.alias == dim.alias) {
                dims.push(dim.clone());
            }
        }
    }
    Some(dims)
}

fn dimension_keys(plan: &QueryPlan) -> BTreeSet<String> {
    plan.dimensions()
        .map(|d| canonical(&d.dimension_key()))
        .collect()
}

fn canonical<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
