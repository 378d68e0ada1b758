//! Query plan → SQL statements.
//!
//! Each plan level becomes one SELECT. The innermost level reads from the
//! table (plus the joins its expressions need); every level above reads from
//! the level below as a derived table:
//!
//! ```text
//! SELECT ... FROM (
//!   SELECT ... FROM "playerStats" AS "player_stats" ... GROUP BY ...
//! ) AS "player_stats_inner_0" GROUP BY ...
//! ```

pub mod alias;
pub mod filter;

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Bindings, ColumnKind, JoinKind, Schema, Table, TableSource, ValueType};
use crate::semantic::error::{QueryClause, SemanticError, SemanticResult};
use crate::semantic::planner::{PlanSource, Projection, ProjectionTemplate, QueryPlan};
use crate::semantic::query::Predicate;
use crate::semantic::resolver::{merge_joins, JoinNode, Resolver};
use crate::sql::dialect::SqlDialect;
use crate::sql::expr::Expr;
use crate::sql::query::{JoinType, OrderItem, Query, SelectItem, Source};
use crate::sql::token::Render;

use alias::{page_total_alias, subquery_alias};
use filter::FilterConverter;

/// Statements for one plan, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSql {
    pub main: String,
    /// Row count of the unpaginated main query, when page totals were requested.
    pub page_total: Option<String>,
}

impl GeneratedSql {
    pub fn statements(&self) -> Vec<String> {
        let mut out = vec![self.main.clone()];
        out.extend(self.page_total.clone());
        out
    }
}

/// A generated level: its SELECT and the output names it exposes upward.
struct Level {
    query: Query,
    exposed: Vec<String>,
}

#[derive(Debug)]
pub struct SqlGenerator<'s> {
    schema: &'s Schema,
    dialect: &'s dyn SqlDialect,
}

impl<'s> SqlGenerator<'s> {
    pub fn new(schema: &'s Schema, dialect: &'s dyn SqlDialect) -> Self {
        Self { schema, dialect }
    }

    pub fn dialect(&self) -> &'s dyn SqlDialect {
        self.dialect
    }

    pub fn generate(&self, plan: &QueryPlan) -> Result<GeneratedSql> {
        if let Some(pagination) = &plan.pagination {
            if pagination.offset > 0 && !self.dialect.supports_offset_pagination() {
                return Err(Error::UnsupportedPagination {
                    dialect: self.dialect.name().to_string(),
                    offset: pagination.offset,
                });
            }
        }

        let table = self.schema.table(plan.root_table())?;
        let root = table.root_alias();
        let mut resolver = Resolver::new(self.schema, self.dialect);
        let level = self.level(plan, 0, &root, &mut resolver)?;

        let main = level.query.to_sql(self.dialect);
        let page_total = match &plan.pagination {
            Some(p) if p.return_page_totals => Some(self.page_total(&level.query, &root)),
            _ => None,
        };

        debug!(dialect = self.dialect.name(), depth = plan.depth(), sql = %main, "generated SQL");
        Ok(GeneratedSql { main, page_total })
    }

    fn page_total(&self, main: &Query, root: &str) -> String {
        Query::new()
            .select(vec![SelectItem::new(Expr::CountAll, "page_total")])
            .from(Source::derived(main.unpaged(), &page_total_alias(root)))
            .to_sql(self.dialect)
    }

    fn level(
        &self,
        plan: &QueryPlan,
        depth: usize,
        root: &str,
        resolver: &mut Resolver<'s>,
    ) -> SemanticResult<Level> {
        let mut columns: Vec<(&Projection, String)> = Vec::with_capacity(plan.projections.len());
        let mut query = Query::new();

        match &plan.source {
            PlanSource::Table(name) => {
                let table = self.schema.table(name)?;
                let mut joins: Vec<JoinNode> = Vec::new();

                for projection in &plan.projections {
                    let resolved = match &projection.template {
                        ProjectionTemplate::Column => resolver.resolve_column(
                            table,
                            root,
                            &projection.name,
                            &projection.arguments,
                            &plan.arguments,
                        )?,
                        ProjectionTemplate::Expression(template) => resolver.resolve_template(
                            table,
                            root,
                            template,
                            &projection.name,
                            &projection.arguments,
                            &plan.arguments,
                        )?,
                    };
                    merge_joins(&mut joins, resolved.joins);
                    let sql = match (projection.kind, projection.grain, &projection.template) {
                        (ColumnKind::TimeDimension, Some(grain), ProjectionTemplate::Column) => {
                            self.dialect.date_truncate(grain, &resolved.sql)
                        }
                        _ => resolved.sql,
                    };
                    columns.push((projection, sql));
                }

                if let Some(filter) = &plan.where_filter {
                    let mut lookup = |predicate: &Predicate| -> SemanticResult<(Expr, ValueType)> {
                        self.where_operand(table, root, predicate, &plan.arguments, resolver, &mut joins)
                    };
                    query = query.filter(FilterConverter::convert(filter, QueryClause::Where, &mut lookup)?);
                }

                query = query.from(self.table_source(table, root));
                for join in &joins {
                    let target = self.schema.table(&join.table)?;
                    let on = match join.kind {
                        JoinKind::Cross => None,
                        _ => Some(Expr::raw(join.on.as_str())),
                    };
                    query = query.join(join_type(join.kind), self.table_source(target, &join.alias), on);
                }
            }
            PlanSource::Plan(inner) => {
                let alias = subquery_alias(root, depth);
                let inner_level = self.level(inner, depth + 1, root, resolver)?;

                for projection in &plan.projections {
                    let template = match &projection.template {
                        ProjectionTemplate::Expression(template) => template.clone(),
                        ProjectionTemplate::Column => format!("{{{{${}}}}}", projection.alias),
                    };
                    let sql = resolver.resolve_derived(&alias, &inner_level.exposed, &template)?;
                    columns.push((projection, sql));
                }

                if let Some(filter) = &plan.where_filter {
                    let mut lookup = |predicate: &Predicate| -> SemanticResult<(Expr, ValueType)> {
                        let field = predicate.path.to_dotted();
                        let value_type = inner
                            .projection(&field)
                            .map(|p| p.value_type)
                            .unwrap_or(ValueType::Text);
                        let sql = resolver.resolve_derived(
                            &alias,
                            &inner_level.exposed,
                            &format!("{{{{${}}}}}", field),
                        )?;
                        Ok((Expr::raw(sql), value_type))
                    };
                    query = query.filter(FilterConverter::convert(filter, QueryClause::Where, &mut lookup)?);
                }

                query = query.from(Source::derived(inner_level.query, &alias));
            }
        }

        query = query.select(
            columns
                .iter()
                .map(|(p, sql)| SelectItem::new(Expr::raw(sql.as_str()), &p.alias))
                .collect::<Vec<_>>(),
        );

        if plan.has_metrics() {
            let group_by: Vec<Expr> = columns
                .iter()
                .filter(|(p, _)| !p.is_metric())
                .map(|(_, sql)| Expr::raw(sql.as_str()))
                .collect();
            query = query.group_by(group_by);
        } else {
            query = query.distinct();
        }

        if let Some(having) = &plan.having_filter {
            let mut lookup = |predicate: &Predicate| -> SemanticResult<(Expr, ValueType)> {
                let field = predicate.path.to_dotted();
                columns
                    .iter()
                    .find(|(p, _)| p.alias == field)
                    .map(|(p, sql)| (Expr::raw(sql.as_str()), p.value_type))
                    .ok_or_else(|| {
                        SemanticError::invalid_query(
                            QueryClause::Having,
                            format!("'{}' is not a selected column", field),
                        )
                    })
            };
            query = query.having(FilterConverter::convert(having, QueryClause::Having, &mut lookup)?);
        }

        if !plan.sorting.is_empty() {
            query = query.order_by(
                plan.sorting
                    .iter()
                    .map(|sort| OrderItem {
                        expr: Expr::column(&sort.field),
                        direction: sort.direction,
                    })
                    .collect(),
            );
        }

        if let Some(pagination) = &plan.pagination {
            query = query.page(pagination.limit, pagination.offset);
        }

        Ok(Level {
            query,
            exposed: plan.output_names(),
        })
    }

    /// Left-hand side of a where predicate at table scope.
    fn where_operand(
        &self,
        table: &'s Table,
        root: &str,
        predicate: &Predicate,
        table_args: &Bindings,
        resolver: &mut Resolver<'s>,
        joins: &mut Vec<JoinNode>,
    ) -> SemanticResult<(Expr, ValueType)> {
        let field = predicate.path.field().ok_or_else(|| {
            SemanticError::invalid_query(QueryClause::Where, "empty filter path")
        })?;
        let hops: Vec<String> = predicate
            .path
            .joins()
            .iter()
            .map(|e| e.field.clone())
            .collect();
        let target = self.schema.walk_joins(table, &hops)?;
        let column = target.column(&field.field).ok_or_else(|| SemanticError::UnknownColumn {
            table: target.name.clone(),
            column: field.field.clone(),
        })?;

        let resolved = resolver.resolve_template(
            table,
            root,
            &predicate.path.to_template(),
            &field.field,
            &Bindings::new(),
            table_args,
        )?;
        merge_joins(joins, resolved.joins);

        let sql = match (column.kind, field.grain) {
            (ColumnKind::TimeDimension, Some(grain)) => self.dialect.date_truncate(grain, &resolved.sql),
            _ => resolved.sql,
        };
        Ok((Expr::raw(sql), column.value_type))
    }

    fn table_source(&self, table: &Table, alias: &str) -> Source {
        match &table.source {
            TableSource::Physical { schema, name } => Source::table(schema.as_deref(), name, alias),
            TableSource::Subquery(sql) => Source::raw(sql, alias),
        }
    }
}

fn join_type(kind: JoinKind) -> JoinType {
    match kind {
        JoinKind::Inner => JoinType::Inner,
        JoinKind::Left => JoinType::Left,
        JoinKind::Full => JoinType::Full,
        JoinKind::Cross => JoinType::Cross,
    }
}
