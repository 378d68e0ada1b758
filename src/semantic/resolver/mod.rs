//! Reference resolution: rewrite column templates into physical SQL.
//!
//! ```text
//! {{$$column.args.x}}, {{$$table.args.x}}   substituted first
//! {{$phys}}                                 alias.phys
//! {{col[arg:v]}}                            col's own resolved SQL
//! {{join.col}}                              join added, col resolved at the join alias
//! ```
//!
//! A [`Resolver`] lives for one plan build or one SQL generation. It memoizes
//! resolved columns, so resolving the same column twice is byte-identical,
//! and keeps a visiting stack to report reference loops.

pub mod reference;

use std::collections::{HashMap, HashSet};

use crate::cache::short_hash;
use crate::model::{Aggregation, Bindings, Column, JoinKind, Schema, Table};
use crate::semantic::error::{SemanticError, SemanticResult};
use crate::sql::dialect::SqlDialect;

use reference::Reference;

/// A join required by a resolved expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinNode {
    pub alias: String,
    pub parent_alias: String,
    pub name: String,
    pub kind: JoinKind,
    /// Logical table joined in.
    pub table: String,
    /// Resolved ON condition.
    pub on: String,
}

/// Physical SQL for a template plus the joins it needs, in dependency order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedExpr {
    pub sql: String,
    pub joins: Vec<JoinNode>,
}

impl ResolvedExpr {
    pub fn needs_join(&self) -> bool {
        !self.joins.is_empty()
    }
}

/// Append joins not already present (by alias), keeping first-seen order.
pub fn merge_joins(into: &mut Vec<JoinNode>, joins: impl IntoIterator<Item = JoinNode>) {
    for join in joins {
        if !into.iter().any(|j| j.alias == join.alias) {
            into.push(join);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    table: String,
    alias: String,
    column: String,
    bindings: Bindings,
    table_args: Bindings,
    mode: Mode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Mode {
    aggregated: bool,
    /// Physical references stay `{{$name}}` templates.
    inline: bool,
}

/// What a template is being resolved for, used in error messages and for
/// `$$column.args` lookups.
struct Context<'a> {
    column: &'a str,
    bindings: &'a Bindings,
    table_args: &'a Bindings,
    inline: bool,
}

#[derive(Debug)]
pub struct Resolver<'s> {
    schema: &'s Schema,
    dialect: &'s dyn SqlDialect,
    memo: HashMap<MemoKey, ResolvedExpr>,
    visiting: Vec<String>,
    building: HashSet<String>,
}

impl<'s> Resolver<'s> {
    pub fn new(schema: &'s Schema, dialect: &'s dyn SqlDialect) -> Self {
        Self {
            schema,
            dialect,
            memo: HashMap::new(),
            visiting: Vec::new(),
            building: HashSet::new(),
        }
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    pub fn dialect(&self) -> &'s dyn SqlDialect {
        self.dialect
    }

    /// `alias.column` quoted for the dialect.
    pub fn qualify(&self, alias: &str, column: &str) -> String {
        format!(
            "{}.{}",
            self.dialect.quote_identifier(alias),
            self.dialect.quote_identifier(column)
        )
    }

    /// Resolve a column at `alias`, aggregation included for metrics.
    pub fn resolve_column(
        &mut self,
        table: &Table,
        alias: &str,
        column: &str,
        bindings: &Bindings,
        table_args: &Bindings,
    ) -> SemanticResult<ResolvedExpr> {
        let mode = Mode {
            aggregated: true,
            inline: false,
        };
        self.resolve_memoized(table, alias, column, bindings, table_args, mode)
    }

    /// Resolve a column's formula without wrapping its aggregation.
    pub fn resolve_formula(
        &mut self,
        table: &Table,
        alias: &str,
        column: &str,
        bindings: &Bindings,
        table_args: &Bindings,
    ) -> SemanticResult<ResolvedExpr> {
        let mode = Mode {
            aggregated: false,
            inline: false,
        };
        self.resolve_memoized(table, alias, column, bindings, table_args, mode)
    }

    /// A column's definition with its aggregation applied and every logical
    /// reference expanded in place. Physical columns stay `{{$name}}`, so
    /// the result can still be resolved later at any alias.
    ///
    /// Joined references are expanded too and reported in `joins`.
    pub fn inline_column(
        &mut self,
        table: &Table,
        column: &str,
        bindings: &Bindings,
        table_args: &Bindings,
    ) -> SemanticResult<ResolvedExpr> {
        let mode = Mode {
            aggregated: true,
            inline: true,
        };
        self.resolve_memoized(table, &table.root_alias(), column, bindings, table_args, mode)
    }

    /// [`Resolver::inline_column`] for an ad-hoc template.
    pub fn inline_template(
        &mut self,
        table: &Table,
        template: &str,
        context: &str,
        bindings: &Bindings,
        table_args: &Bindings,
    ) -> SemanticResult<ResolvedExpr> {
        let ctx = Context {
            column: context,
            bindings,
            table_args,
            inline: true,
        };
        self.expand(table, &table.root_alias(), template, &ctx)
    }

    /// Resolve an ad-hoc template in the scope of `table` at `alias`.
    ///
    /// `context` names the column the template belongs to so that
    /// `$$column.args` and error messages refer to it.
    pub fn resolve_template(
        &mut self,
        table: &Table,
        alias: &str,
        template: &str,
        context: &str,
        bindings: &Bindings,
        table_args: &Bindings,
    ) -> SemanticResult<ResolvedExpr> {
        let ctx = Context {
            column: context,
            bindings,
            table_args,
            inline: false,
        };
        self.expand(table, alias, template, &ctx)
    }

    /// Resolve a template over a nested query's output columns.
    ///
    /// Only `{{name}}` and `{{$name}}` are meaningful there; both map to
    /// `alias.name` when the inner level exposes `name`.
    pub fn resolve_derived(
        &self,
        alias: &str,
        exposed: &[String],
        template: &str,
    ) -> SemanticResult<String> {
        reference::rewrite(template, |body| {
            let name = match reference::parse(body)? {
                Reference::Physical(name) => name,
                Reference::Logical { column, pinned } if pinned.is_empty() => column,
                Reference::Joined { .. } => {
                    return Err(SemanticError::InvalidReference(format!(
                        "'{{{{{}}}}}': joins are not available over a nested query",
                        body
                    )))
                }
                _ => {
                    return Err(SemanticError::InvalidReference(format!(
                        "'{{{{{}}}}}' cannot be used over a nested query",
                        body
                    )))
                }
            };
            if exposed.iter().any(|e| *e == name) {
                Ok(self.qualify(alias, &name))
            } else {
                Err(SemanticError::InvalidReference(format!(
                    "'{}' is not exposed by nested query '{}'",
                    name, alias
                )))
            }
        })
    }

    fn resolve_memoized(
        &mut self,
        table: &Table,
        alias: &str,
        column_name: &str,
        bindings: &Bindings,
        table_args: &Bindings,
        mode: Mode,
    ) -> SemanticResult<ResolvedExpr> {
        let column = lookup_column(table, column_name)?;
        let key = MemoKey {
            table: table.name.clone(),
            alias: alias.to_string(),
            column: column.name.clone(),
            bindings: bindings.clone(),
            table_args: table_args.clone(),
            mode,
        };
        if let Some(hit) = self.memo.get(&key) {
            return Ok(hit.clone());
        }

        let frame = format!("{}.{}", table.name, column.name);
        if let Some(start) = self.visiting.iter().position(|f| *f == frame) {
            let mut path: Vec<String> = self.visiting[start..]
                .iter()
                .map(|f| display_frame(f, &table.name))
                .collect();
            path.push(column.name.clone());
            return Err(SemanticError::ReferenceCycle { path });
        }

        self.visiting.push(frame);
        let ctx = Context {
            column: &column.name,
            bindings,
            table_args,
            inline: mode.inline,
        };
        let expanded = self.expand(table, alias, &column.formula, &ctx);
        self.visiting.pop();
        let mut resolved = expanded?;

        if mode.aggregated && column.kind.is_metric() {
            resolved.sql = self.aggregate(column, &resolved.sql);
        }

        self.memo.insert(key, resolved.clone());
        Ok(resolved)
    }

    fn aggregate(&self, column: &Column, sql: &str) -> String {
        match column.aggregation {
            None => sql.to_string(),
            Some(Aggregation::CountDistinct) => self.dialect.count_distinct(sql),
            Some(agg) => format!("{}({})", agg.function_name(), sql),
        }
    }

    fn expand(
        &mut self,
        table: &Table,
        alias: &str,
        template: &str,
        ctx: &Context<'_>,
    ) -> SemanticResult<ResolvedExpr> {
        let substituted = substitute_arguments(table, template, ctx)?;

        let mode = Mode {
            aggregated: true,
            inline: ctx.inline,
        };
        let mut joins = Vec::new();
        let sql = reference::rewrite(&substituted, |body| {
            match reference::parse(body)? {
                Reference::Physical(name) if ctx.inline => Ok(format!("{{{{${}}}}}", name)),
                Reference::Physical(name) => Ok(self.qualify(alias, &name)),
                Reference::Logical { column, pinned } => {
                    let target = lookup_column(table, &column)?;
                    let merged = bind_reference(target, &pinned, ctx.bindings);
                    let resolved =
                        self.resolve_memoized(table, alias, &column, &merged, ctx.table_args, mode)?;
                    merge_joins(&mut joins, resolved.joins);
                    Ok(resolved.sql)
                }
                Reference::Joined { path, leaf } => {
                    let (join_alias, target_table) =
                        self.ensure_path(table, alias, &path, ctx, &mut joins)?;
                    match *leaf {
                        Reference::Physical(name) => Ok(self.qualify(&join_alias, &name)),
                        Reference::Logical { column, pinned } => {
                            let target = lookup_column(target_table, &column)?;
                            let merged = bind_reference(target, &pinned, ctx.bindings);
                            let resolved = self.resolve_memoized(
                                target_table,
                                &join_alias,
                                &column,
                                &merged,
                                ctx.table_args,
                                mode,
                            )?;
                            merge_joins(&mut joins, resolved.joins);
                            Ok(resolved.sql)
                        }
                        _ => Err(SemanticError::InvalidReference(format!("'{{{{{}}}}}'", body))),
                    }
                }
                Reference::ColumnArgument(_) | Reference::TableArgument(_) => Err(
                    SemanticError::InvalidReference(format!("'{{{{{}}}}}' left unsubstituted", body)),
                ),
            }
        })?;

        Ok(ResolvedExpr { sql, joins })
    }

    /// Add every join of `path` starting at `alias`; returns the last alias and table.
    fn ensure_path(
        &mut self,
        table: &Table,
        alias: &str,
        path: &[String],
        ctx: &Context<'_>,
        joins: &mut Vec<JoinNode>,
    ) -> SemanticResult<(String, &'s Table)> {
        let mut current_alias = alias.to_string();
        let mut current: Option<&'s Table> = None;

        for hop in path {
            let parent: &Table = current.unwrap_or(table);
            let (next_alias, target) = self.ensure_join(parent, &current_alias, hop, ctx, joins)?;
            current_alias = next_alias;
            current = Some(target);
        }

        current
            .map(|target| (current_alias, target))
            .ok_or_else(|| SemanticError::InvalidReference("empty join path".into()))
    }

    fn ensure_join(
        &mut self,
        parent: &Table,
        parent_alias: &str,
        name: &str,
        ctx: &Context<'_>,
        joins: &mut Vec<JoinNode>,
    ) -> SemanticResult<(String, &'s Table)> {
        let join = parent.join(name).ok_or_else(|| SemanticError::UnknownJoin {
            table: parent.name.clone(),
            join: name.to_string(),
        })?;
        let target = self.schema.table(&join.target)?;

        let depends_on_column = reference::tokens(&join.expression)
            .iter()
            .any(|t| t.body.starts_with("$$column."));
        let substituted = substitute_arguments(parent, &join.expression, ctx)?;
        let alias = if depends_on_column {
            let digest = short_hash(&substituted)
                .map_err(|e| SemanticError::InvalidReference(e.to_string()))?;
            format!("{}_{}_{}", parent_alias, join.name, digest)
        } else {
            format!("{}_{}", parent_alias, join.name)
        };

        // Self-references inside the ON clause land here.
        if self.building.contains(&alias) || joins.iter().any(|j| j.alias == alias) {
            return Ok((alias, target));
        }

        self.building.insert(alias.clone());
        let on = if join.kind == JoinKind::Cross {
            Ok(ResolvedExpr::default())
        } else {
            self.expand(parent, parent_alias, &substituted, ctx)
        };
        self.building.remove(&alias);
        let on = on?;

        merge_joins(joins, on.joins);
        merge_joins(
            joins,
            [JoinNode {
                alias: alias.clone(),
                parent_alias: parent_alias.to_string(),
                name: join.name.clone(),
                kind: join.kind,
                table: target.name.clone(),
                on: on.sql,
            }],
        );
        Ok((alias, target))
    }
}

fn lookup_column<'t>(table: &'t Table, column: &str) -> SemanticResult<&'t Column> {
    table.column(column).ok_or_else(|| SemanticError::UnknownColumn {
        table: table.name.clone(),
        column: column.to_string(),
    })
}

/// Bindings for a referenced column: pinned, then the caller's same-named
/// bindings, then the referenced column's defaults.
fn bind_reference(target: &Column, pinned: &Bindings, calling: &Bindings) -> Bindings {
    let mut merged = Bindings::new();
    for arg in &target.arguments {
        let value = pinned
            .get(&arg.name)
            .or_else(|| calling.get(&arg.name))
            .or(arg.default.as_ref());
        if let Some(value) = value {
            merged.insert(arg.name.clone(), value.clone());
        }
    }
    merged
}

/// Replace `$$column.args.X` and `$$table.args.X` tokens with their values.
fn substitute_arguments(table: &Table, template: &str, ctx: &Context<'_>) -> SemanticResult<String> {
    reference::rewrite(template, |body| {
        let missing = |argument: &str| SemanticError::MissingArgument {
            column: ctx.column.to_string(),
            argument: argument.to_string(),
        };
        if !body.starts_with("$$") {
            return Ok(format!("{{{{{}}}}}", body));
        }
        match reference::parse(body)? {
            Reference::ColumnArgument(name) => {
                ctx.bindings.get(&name).cloned().ok_or_else(|| missing(&name))
            }
            Reference::TableArgument(name) => ctx
                .table_args
                .get(&name)
                .or_else(|| table.argument(&name).and_then(|a| a.default.as_ref()))
                .cloned()
                .ok_or_else(|| missing(&name)),
            _ => Err(SemanticError::InvalidReference(format!("'{{{{{}}}}}'", body))),
        }
    })
}

/// Frames are `Table.column`; columns of the root table print bare.
fn display_frame(frame: &str, root: &str) -> String {
    match frame.split_once('.') {
        Some((table, column)) if table == root => column.to_string(),
        _ => frame.to_string(),
    }
}
