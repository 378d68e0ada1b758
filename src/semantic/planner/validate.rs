//! Query validation ahead of planning.

use std::collections::HashSet;

use crate::model::{bind, Bindings, ColumnKind, RequiredFilter, Schema, Table, ValueType};
use crate::semantic::error::{QueryClause, SemanticError, SemanticResult};
use crate::semantic::query::{AggregationQuery, FilterExpression, Predicate};
use crate::semantic::resolver::Resolver;

/// Check `query` against the schema and return its table.
///
/// Every selected column and where field is resolved once, so reference
/// loops and missing arguments surface here.
pub(crate) fn validate<'s>(
    schema: &'s Schema,
    query: &AggregationQuery,
    max_page_size: u64,
    resolver: &mut Resolver<'s>,
) -> SemanticResult<&'s Table> {
    let table = schema.table(&query.table).map_err(|_| {
        SemanticError::invalid_query(QueryClause::Table, format!("unknown table '{}'", query.table))
    })?;

    check_table_arguments(table, &query.arguments)?;
    let outputs = check_columns(table, query, resolver)?;

    if let Some(filter) = &query.where_filter {
        for predicate in filter.predicates() {
            check_where(schema, table, predicate, &query.arguments, resolver)?;
        }
    }
    check_required_filters(table, query)?;
    if let Some(filter) = &query.having_filter {
        check_having(filter, &outputs)?;
    }

    for sort in &query.sorting {
        if !outputs.contains(sort.field.as_str()) {
            return Err(SemanticError::invalid_query(
                QueryClause::Sort,
                format!("cannot sort on '{}': not a selected column", sort.field),
            ));
        }
    }

    if let Some(pagination) = &query.pagination {
        if pagination.limit == 0 || pagination.limit > max_page_size {
            return Err(SemanticError::invalid_query(
                QueryClause::Pagination,
                format!(
                    "limit {} is outside 1..={}",
                    pagination.limit, max_page_size
                ),
            ));
        }
    }

    Ok(table)
}

fn check_table_arguments(table: &Table, arguments: &Bindings) -> SemanticResult<()> {
    for (name, value) in arguments {
        let def = table.argument(name).ok_or_else(|| {
            SemanticError::invalid_query(
                QueryClause::Arguments,
                format!("table '{}' has no argument '{}'", table.name, name),
            )
        })?;
        check_value(name, def.check(value), value)?;
    }
    Ok(())
}

fn check_value(argument: &str, checked: Result<(), String>, value: &str) -> SemanticResult<()> {
    checked.map_err(|reason| SemanticError::InvalidArgument {
        argument: argument.to_string(),
        value: value.to_string(),
        reason,
    })
}

/// Returns the selected output names.
fn check_columns<'q>(
    table: &Table,
    query: &'q AggregationQuery,
    resolver: &mut Resolver<'_>,
) -> SemanticResult<HashSet<&'q str>> {
    if query.columns.is_empty() {
        return Err(SemanticError::invalid_query(
            QueryClause::Columns,
            "at least one column must be selected",
        ));
    }

    let root_alias = table.root_alias();
    let mut outputs = HashSet::new();
    let mut only_ids = true;

    for request in &query.columns {
        let column = table.column(&request.name).ok_or_else(|| {
            SemanticError::invalid_query(
                QueryClause::Columns,
                format!("unknown column '{}' on '{}'", request.name, table.name),
            )
        })?;

        if !outputs.insert(request.output_name()) {
            return Err(SemanticError::invalid_query(
                QueryClause::Columns,
                format!("duplicate alias '{}'", request.output_name()),
            ));
        }

        if let Some(grain) = request.grain {
            if column.kind != ColumnKind::TimeDimension {
                return Err(SemanticError::invalid_query(
                    QueryClause::Columns,
                    format!("'{}' is not a time dimension and takes no grain", column.name),
                ));
            }
            if !column.supports_grain(grain) {
                return Err(SemanticError::invalid_query(
                    QueryClause::Columns,
                    format!("'{}' does not support grain '{}'", column.name, grain),
                ));
            }
        }

        for (name, value) in &request.arguments {
            let def = column.argument(name).ok_or_else(|| {
                SemanticError::invalid_query(
                    QueryClause::Arguments,
                    format!("column '{}' has no argument '{}'", column.name, name),
                )
            })?;
            check_value(name, def.check(value), value)?;
        }

        if column.value_type != ValueType::Id {
            only_ids = false;
        }

        let bindings = bind(&column.arguments, &request.arguments);
        resolver.resolve_column(table, &root_alias, &column.name, &bindings, &query.arguments)?;
    }

    if only_ids {
        return Err(SemanticError::invalid_query(
            QueryClause::Columns,
            "a query cannot select only id columns",
        ));
    }
    Ok(outputs)
}

/// Table requirements always apply; column requirements apply when the column is selected.
fn check_required_filters(table: &Table, query: &AggregationQuery) -> SemanticResult<()> {
    let conjuncts = query
        .where_filter
        .as_ref()
        .map(FilterExpression::conjuncts)
        .unwrap_or_default();
    let selected = query
        .columns
        .iter()
        .filter_map(|request| table.column(&request.name))
        .flat_map(|column| column.required_filters.iter().map(move |r| (Some(column.name.as_str()), r)));
    let required = table.required_filters.iter().map(|r| (None, r)).chain(selected);

    for (column, requirement) in required {
        if conjuncts.iter().any(|p| requirement.is_satisfied_by(p)) {
            continue;
        }
        return Err(SemanticError::invalid_query(QueryClause::Where, missing(table, column, requirement)));
    }
    Ok(())
}

fn missing(table: &Table, column: Option<&str>, requirement: &RequiredFilter) -> String {
    match column {
        Some(column) => format!(
            "selecting '{}' requires a where filter on {}",
            column,
            requirement.describe()
        ),
        None => format!(
            "table '{}' requires a where filter on {}",
            table.name,
            requirement.describe()
        ),
    }
}

fn check_where(
    schema: &Schema,
    table: &Table,
    predicate: &Predicate,
    table_args: &Bindings,
    resolver: &mut Resolver<'_>,
) -> SemanticResult<()> {
    let where_error = |message: String| SemanticError::invalid_query(QueryClause::Where, message);
    let dotted = predicate.path.to_dotted();

    let Some(field) = predicate.path.field() else {
        return Err(where_error("empty filter path".into()));
    };
    let hops: Vec<String> = predicate
        .path
        .joins()
        .iter()
        .map(|e| e.field.clone())
        .collect();
    let target = schema.walk_joins(table, &hops).map_err(|e| match e {
        SemanticError::UnknownJoin { table, join } => where_error(format!(
            "filter path '{}' uses unknown join '{}' on '{}'",
            dotted, join, table
        )),
        other => other,
    })?;

    let column = target.column(&field.field).ok_or_else(|| {
        where_error(format!(
            "filter path '{}': '{}' has no column '{}'",
            dotted, target.name, field.field
        ))
    })?;
    if column.kind.is_metric() {
        return Err(where_error(format!(
            "filter path '{}' ends on metric '{}'; use having",
            dotted, column.name
        )));
    }
    if let Some(grain) = field.grain {
        if !column.supports_grain(grain) {
            return Err(where_error(format!(
                "'{}' does not support grain '{}'",
                column.name, grain
            )));
        }
    }
    for (name, value) in &field.arguments {
        let def = column.argument(name).ok_or_else(|| {
            SemanticError::invalid_query(
                QueryClause::Arguments,
                format!("column '{}' has no argument '{}'", column.name, name),
            )
        })?;
        check_value(name, def.check(value), value)?;
    }

    check_values(predicate, QueryClause::Where)?;

    resolver.resolve_template(
        table,
        &table.root_alias(),
        &predicate.path.to_template(),
        &field.field,
        &Bindings::new(),
        table_args,
    )?;
    Ok(())
}

fn check_having(filter: &FilterExpression, outputs: &HashSet<&str>) -> SemanticResult<()> {
    for predicate in filter.predicates() {
        let dotted = predicate.path.to_dotted();
        if predicate.path.0.len() != 1 || !outputs.contains(dotted.as_str()) {
            return Err(SemanticError::invalid_query(
                QueryClause::Having,
                format!("having references '{}', which is not a selected column", dotted),
            ));
        }
        check_values(predicate, QueryClause::Having)?;
    }
    Ok(())
}

fn check_values(predicate: &Predicate, clause: QueryClause) -> SemanticResult<()> {
    let count = predicate.values.len();
    if !predicate.operator.accepts(count) {
        return Err(SemanticError::invalid_query(
            clause,
            format!(
                "operator {:?} on '{}' cannot take {} value(s)",
                predicate.operator,
                predicate.path.to_dotted(),
                count
            ),
        ));
    }
    if predicate.operator.is_pattern() && predicate.values.iter().any(|v| v.as_str().is_none()) {
        return Err(SemanticError::invalid_query(
            clause,
            format!(
                "operator {:?} on '{}' needs a text value",
                predicate.operator,
                predicate.path.to_dotted()
            ),
        ));
    }
    Ok(())
}
