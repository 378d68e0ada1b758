//! Per-metric plan resolvers.
//!
//! A [`QueryPlanResolver`] decides how one metric is planned: `None` projects it
//! straight from the table, `Some(plan)` supplies an explicit nested plan.
//! The [`ResolverRegistry`] picks a resolver per `table.column`, falling back
//! to the column's declared nesting.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::short_hash;
use crate::model::{bind, Aggregation, Bindings, Column, ColumnKind, Nesting, Table, TimeGrain};
use crate::semantic::error::{SemanticError, SemanticResult};
use crate::semantic::resolver::reference::{self, Reference};
use crate::semantic::resolver::Resolver;
use crate::sql::dialect::SqlDialect;

use super::merge::merge_all;
use super::plan::{Projection, ProjectionTemplate, QueryPlan};

pub trait QueryPlanResolver: std::fmt::Debug + Send + Sync {
    fn plan(&self, ctx: &mut PlanContext<'_, '_>, metric: &Projection) -> SemanticResult<Option<QueryPlan>>;
}

/// Projects the metric directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectResolver;

impl QueryPlanResolver for DirectResolver {
    fn plan(&self, _ctx: &mut PlanContext<'_, '_>, _metric: &Projection) -> SemanticResult<Option<QueryPlan>> {
        Ok(None)
    }
}

/// Computes the referenced metrics per `grain` of `time_dimension`, then
/// evaluates the metric's formula over those rows.
#[derive(Debug, Clone)]
pub struct PerGrainResolver {
    pub time_dimension: String,
    pub grain: TimeGrain,
}

impl PerGrainResolver {
    pub fn new(time_dimension: &str, grain: TimeGrain) -> Self {
        Self {
            time_dimension: time_dimension.into(),
            grain,
        }
    }
}

impl QueryPlanResolver for PerGrainResolver {
    fn plan(&self, ctx: &mut PlanContext<'_, '_>, metric: &Projection) -> SemanticResult<Option<QueryPlan>> {
        let table = ctx.table();
        let column = lookup(table, &metric.name)?;
        let time_dimension = lookup(table, &self.time_dimension)?;

        let mut children: Vec<Projection> = Vec::new();
        let only_metrics = || {
            SemanticError::InvalidSchema(format!(
                "per-grain metric '{}' may only reference metrics of '{}'",
                metric.name, table.name
            ))
        };
        let formula = reference::rewrite(&column.formula, |body| match reference::parse(body)? {
            Reference::ColumnArgument(name) => {
                metric
                    .arguments
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| SemanticError::MissingArgument {
                        column: metric.name.clone(),
                        argument: name,
                    })
            }
            Reference::Logical { column, pinned } => {
                let target = lookup(table, &column)?;
                if !target.kind.is_metric() {
                    return Err(only_metrics());
                }
                let alias = if pinned.is_empty() {
                    column.clone()
                } else {
                    let digest = short_hash(&pinned)
                        .map_err(|e| SemanticError::InvalidReference(e.to_string()))?;
                    format!("{}_{}", column, digest)
                };
                if !children.iter().any(|c| c.alias == alias) {
                    children.push(Projection {
                        name: target.name.clone(),
                        alias: alias.clone(),
                        kind: ColumnKind::Metric,
                        value_type: target.value_type,
                        template: ProjectionTemplate::Column,
                        arguments: bind_child(target, &pinned, &metric.arguments),
                        grain: None,
                    });
                }
                Ok(format!("{{{{${}}}}}", alias))
            }
            _ => Err(only_metrics()),
        })?;

        if children.is_empty() {
            return Err(SemanticError::InvalidSchema(format!(
                "per-grain metric '{}' references no metrics",
                metric.name
            )));
        }

        let mut plans = Vec::with_capacity(children.len());
        for child in &children {
            plans.push(ctx.plan_metric(child)?);
        }
        let mut inner = ctx.merge_plans(plans)?;

        inner.attach_dimensions(&[Projection {
            name: time_dimension.name.clone(),
            alias: format!("{}_{}", time_dimension.name, self.grain),
            kind: ColumnKind::TimeDimension,
            value_type: time_dimension.value_type,
            template: ProjectionTemplate::Column,
            arguments: bind(&time_dimension.arguments, &Bindings::new()),
            grain: Some(self.grain),
        }]);

        let outer_formula = match column.aggregation {
            None => formula,
            Some(Aggregation::CountDistinct) => ctx.dialect().count_distinct(&formula),
            Some(agg) => format!("{}({})", agg.function_name(), formula),
        };

        let mut outer = QueryPlan::over_plan(inner);
        outer.projections.push(Projection {
            template: ProjectionTemplate::Expression(outer_formula),
            ..metric.clone()
        });
        Ok(Some(outer))
    }
}

/// Pinned arguments, then the outer metric's bindings, then defaults.
fn bind_child(target: &Column, pinned: &Bindings, outer: &Bindings) -> Bindings {
    let mut bound = Bindings::new();
    for arg in &target.arguments {
        if let Some(value) = pinned
            .get(&arg.name)
            .or_else(|| outer.get(&arg.name))
            .or(arg.default.as_ref())
        {
            bound.insert(arg.name.clone(), value.clone());
        }
    }
    bound
}

fn lookup<'t>(table: &'t Table, column: &str) -> SemanticResult<&'t Column> {
    table.column(column).ok_or_else(|| SemanticError::UnknownColumn {
        table: table.name.clone(),
        column: column.to_string(),
    })
}

/// Explicit resolvers per `table.column`.
#[derive(Debug, Default, Clone)]
pub struct ResolverRegistry {
    explicit: HashMap<String, Arc<dyn QueryPlanResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, table: &str, column: &str, resolver: impl QueryPlanResolver + 'static) {
        self.explicit
            .insert(format!("{}.{}", table, column), Arc::new(resolver));
    }

    pub fn resolver_for(&self, table: &Table, column: &Column) -> Arc<dyn QueryPlanResolver> {
        if let Some(resolver) = self.explicit.get(&format!("{}.{}", table.name, column.name)) {
            return Arc::clone(resolver);
        }
        match &column.nesting {
            Nesting::Direct => Arc::new(DirectResolver),
            Nesting::PerGrain {
                time_dimension,
                grain,
            } => Arc::new(PerGrainResolver::new(time_dimension, *grain)),
        }
    }
}

/// State handed to resolvers while one query is planned.
pub struct PlanContext<'a, 's> {
    table: &'s Table,
    registry: &'a ResolverRegistry,
    resolver: &'a mut Resolver<'s>,
    arguments: &'a Bindings,
    planning: Vec<String>,
}

impl<'a, 's> PlanContext<'a, 's> {
    pub fn new(
        table: &'s Table,
        registry: &'a ResolverRegistry,
        resolver: &'a mut Resolver<'s>,
        arguments: &'a Bindings,
    ) -> Self {
        Self {
            table,
            registry,
            resolver,
            arguments,
            planning: Vec::new(),
        }
    }

    pub fn table(&self) -> &'s Table {
        self.table
    }

    pub fn dialect(&self) -> &'s dyn SqlDialect {
        self.resolver.dialect()
    }

    /// Plan one metric with its registered resolver.
    pub fn plan_metric(&mut self, metric: &Projection) -> SemanticResult<QueryPlan> {
        let column = lookup(self.table, &metric.name)?;

        if let Some(start) = self.planning.iter().position(|m| *m == metric.name) {
            let mut path = self.planning[start..].to_vec();
            path.push(metric.name.clone());
            return Err(SemanticError::ReferenceCycle { path });
        }

        let resolver = self.registry.resolver_for(self.table, column);
        self.planning.push(metric.name.clone());
        let planned = resolver.plan(self, metric);
        self.planning.pop();

        match planned? {
            Some(plan) => Ok(plan),
            None => {
                let mut plan = QueryPlan::over_table(&self.table.name);
                plan.projections.push(metric.clone());
                plan.arguments = self.arguments.clone();
                Ok(plan)
            }
        }
    }

    /// Merge plans produced for one metric's references.
    pub fn merge_plans(&mut self, plans: Vec<QueryPlan>) -> SemanticResult<QueryPlan> {
        merge_all(plans, &mut *self.resolver)
    }
}
