//! Query planning: turn an [`AggregationQuery`] into a [`QueryPlan`].
//!
//! ```text
//! validate ─► per-metric plans (registry) ─► attach dimensions ─► merge ─► outermost clauses
//! ```
//!
//! Each metric is planned on its own. A direct metric is a single level over
//! the table; a per-grain metric nests its references one level down. The
//! plans are then merged into one, nesting shallower plans when needed.

pub mod merge;
pub mod nest;
pub mod plan;
pub mod registry;
mod validate;

use tracing::debug;

use crate::model::{bind, Column, ColumnKind, Schema, TimeGrain};
use crate::semantic::error::{SemanticError, SemanticResult};
use crate::semantic::query::{AggregationQuery, ColumnRequest};
use crate::semantic::resolver::Resolver;
use crate::sql::dialect::{Dialect, SqlDialect};

pub use plan::{DimensionKey, PlanSource, Projection, ProjectionTemplate, QueryPlan};
pub use registry::{DirectResolver, PerGrainResolver, PlanContext, QueryPlanResolver, ResolverRegistry};

pub const DEFAULT_MAX_PAGE_SIZE: u64 = 10_000;

/// Builds plans for one schema.
#[derive(Debug)]
pub struct QueryPlanBuilder<'s> {
    schema: &'s Schema,
    registry: &'s ResolverRegistry,
    dialect: &'s dyn SqlDialect,
    max_page_size: u64,
}

impl<'s> QueryPlanBuilder<'s> {
    pub fn new(schema: &'s Schema, registry: &'s ResolverRegistry) -> Self {
        Self {
            schema,
            registry,
            dialect: &Dialect::DuckDb,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    /// Dialect used for the resolution done while validating.
    pub fn with_dialect(mut self, dialect: &'s dyn SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_max_page_size(mut self, max_page_size: u64) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    pub fn build(&self, query: &AggregationQuery) -> SemanticResult<QueryPlan> {
        let mut resolver = Resolver::new(self.schema, self.dialect);
        let table = validate::validate(self.schema, query, self.max_page_size, &mut resolver)?;

        let mut dimensions = Vec::new();
        let mut metrics = Vec::new();
        for request in &query.columns {
            let column = table.column(&request.name).ok_or_else(|| SemanticError::UnknownColumn {
                table: table.name.clone(),
                column: request.name.clone(),
            })?;
            let projection = projection_for(column, request);
            if projection.is_metric() {
                metrics.push(projection);
            } else {
                dimensions.push(projection);
            }
        }

        let mut plan = if metrics.is_empty() {
            let mut plan = QueryPlan::over_table(&table.name);
            plan.projections = dimensions;
            plan.where_filter = query.where_filter.clone();
            plan.arguments = query.arguments.clone();
            plan
        } else {
            let mut ctx = PlanContext::new(table, self.registry, &mut resolver, &query.arguments);
            let mut plans = Vec::with_capacity(metrics.len());
            for metric in &metrics {
                let mut plan = ctx.plan_metric(metric)?;
                plan.attach_dimensions(&dimensions);
                plan.innermost_mut().where_filter = query.where_filter.clone();
                plans.push(plan);
            }
            ctx.merge_plans(plans)?
        };

        order_outputs(&mut plan, &query.columns);
        plan.having_filter = query.having_filter.clone();
        plan.sorting = query.sorting.clone();
        plan.pagination = query.pagination;

        debug!(
            table = %table.name,
            depth = plan.depth(),
            metrics = metrics.len(),
            "built query plan"
        );
        Ok(plan)
    }
}

fn projection_for(column: &Column, request: &ColumnRequest) -> Projection {
    let grain = match column.kind {
        ColumnKind::TimeDimension => Some(
            request
                .grain
                .unwrap_or_else(|| TimeGrain::default_for(&column.grains)),
        ),
        _ => None,
    };
    Projection {
        name: column.name.clone(),
        alias: request.output_name().to_string(),
        kind: column.kind,
        value_type: column.value_type,
        template: ProjectionTemplate::Column,
        arguments: bind(&column.arguments, &request.arguments),
        grain,
    }
}

/// Put the outermost projections in request order.
fn order_outputs(plan: &mut QueryPlan, requests: &[ColumnRequest]) {
    let mut ordered = Vec::with_capacity(plan.projections.len());
    for request in requests {
        if let Some(pos) = plan
            .projections
            .iter()
            .position(|p| p.alias == request.output_name())
        {
            ordered.push(plan.projections.remove(pos));
        }
    }
    ordered.append(&mut plan.projections);
    plan.projections = ordered;
}
