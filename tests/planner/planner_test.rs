use aggplan::model::{
    Aggregation, ArgumentDef, Column, Join, JoinKind, RequiredFilter, Schema, Table, TimeGrain, Value,
    ValueType,
};
use aggplan::semantic::planner::{
    PlanContext, Projection, ProjectionTemplate, QueryPlan, QueryPlanBuilder, QueryPlanResolver,
    ResolverRegistry,
};
use aggplan::semantic::query::{ColumnRequest, FilterExpression, Operator, SortDirection};
use aggplan::semantic::{QueryClause, SemanticError, SemanticResult};
use aggplan::AggregationQuery;

fn player_stats() -> Table {
    Table::physical("PlayerStats", None, "playerStats")
        .with_column(
            Column::metric("highScore", ValueType::Integer, "{{$high_score}}")
                .with_aggregation(Aggregation::Max),
        )
        .with_column(
            Column::metric("lowScore", ValueType::Integer, "{{$low_score}}")
                .with_aggregation(Aggregation::Min),
        )
        .with_column(
            Column::metric("dailyAverageScorePerPeriod", ValueType::Decimal, "AVG({{highScore}})")
                .per_grain("recordedDate", TimeGrain::Day),
        )
        .with_column(
            Column::metric(
                "scaledScore",
                ValueType::Decimal,
                "{{$high_score}} * {{$$column.args.factor}}",
            )
            .with_aggregation(Aggregation::Sum)
            .with_argument(
                ArgumentDef::new("factor", ValueType::Integer)
                    .with_default("1")
                    .with_allowed_values(&["1", "10", "100"]),
            ),
        )
        .with_column(Column::dimension("overallRating", ValueType::Text, "{{$overall_rating}}"))
        .with_column(Column::time_dimension(
            "recordedDate",
            "{{$recorded_date}}",
            &[TimeGrain::Day, TimeGrain::Month],
        ))
}

fn schema() -> Schema {
    Schema::from_tables(vec![player_stats()]).unwrap()
}

fn build(schema: &Schema, query: &AggregationQuery) -> SemanticResult<QueryPlan> {
    let registry = ResolverRegistry::new();
    QueryPlanBuilder::new(schema, &registry).build(query)
}

fn clause_of(err: SemanticError) -> QueryClause {
    match err {
        SemanticError::InvalidQuery { clause, .. } => clause,
        other => panic!("expected an invalid query error, got {other:?}"),
    }
}

#[test]
fn test_direct_metric_with_dimension() {
    let schema = schema();
    let query = AggregationQuery::new("PlayerStats")
        .column("highScore")
        .column("overallRating");
    let plan = build(&schema, &query).unwrap();

    assert_eq!(plan.depth(), 1);
    assert!(!plan.is_nested());
    assert_eq!(plan.root_table(), "PlayerStats");
    assert_eq!(plan.output_names(), vec!["highScore", "overallRating"]);
}

#[test]
fn test_per_grain_metric_nests_one_level() {
    let schema = schema();
    let query = AggregationQuery::new("PlayerStats")
        .column("dailyAverageScorePerPeriod")
        .column("overallRating");
    let plan = build(&schema, &query).unwrap();

    assert_eq!(plan.depth(), 2);
    assert_eq!(
        plan.output_names(),
        vec!["dailyAverageScorePerPeriod", "overallRating"]
    );
    assert_eq!(
        plan.projection("dailyAverageScorePerPeriod").unwrap().template,
        ProjectionTemplate::Expression("AVG({{$highScore}})".into())
    );

    let inner = plan.inner().unwrap();
    assert_eq!(
        inner.output_names(),
        vec!["overallRating", "recordedDate_day", "highScore"]
    );
    assert_eq!(inner.projection("recordedDate_day").unwrap().grain, Some(TimeGrain::Day));
}

#[test]
fn test_where_filter_lands_on_innermost_level() {
    let schema = schema();
    let query = AggregationQuery::new("PlayerStats")
        .column("dailyAverageScorePerPeriod")
        .filter(FilterExpression::eq("overallRating", "Good"));
    let plan = build(&schema, &query).unwrap();

    assert!(plan.where_filter.is_none());
    assert!(plan.innermost().where_filter.is_some());
}

#[test]
fn test_outer_clauses_on_outermost_level() {
    let schema = schema();
    let query = AggregationQuery::new("PlayerStats")
        .column("dailyAverageScorePerPeriod")
        .column("overallRating")
        .having(FilterExpression::predicate(
            "dailyAverageScorePerPeriod",
            Operator::Gt,
            vec![Value::from(100i64)],
        ))
        .sort_by("overallRating", SortDirection::Asc)
        .paginate(0, 20);
    let plan = build(&schema, &query).unwrap();

    assert!(plan.having_filter.is_some());
    assert_eq!(plan.sorting.len(), 1);
    assert_eq!(plan.pagination.map(|p| p.limit), Some(20));

    let inner = plan.inner().unwrap();
    assert!(inner.having_filter.is_none());
    assert!(inner.sorting.is_empty());
    assert!(inner.pagination.is_none());
}

#[test]
fn test_filter_through_missing_join_rejected() {
    let book = Table::physical("Book", None, "books")
        .with_column(Column::metric("copies", ValueType::Integer, "{{$copies}}").with_aggregation(Aggregation::Sum))
        .with_column(Column::dimension("title", ValueType::Text, "{{$title}}"))
        .with_join(Join::new("author", "Author", JoinKind::Left, "{{$author_id}} = {{author.$id}}"));
    let author = Table::physical("Author", None, "authors")
        .with_column(Column::dimension("name", ValueType::Text, "{{$name}}"));
    let schema = Schema::from_tables(vec![book, author]).unwrap();

    let query = AggregationQuery::new("Book")
        .column("copies")
        .filter(FilterExpression::eq("author.country.name", "US"));
    let err = build(&schema, &query).unwrap_err();
    assert!(err.to_string().contains("author.country.name"));
    assert_eq!(clause_of(err), QueryClause::Where);

    // The same join path one hop shorter is fine.
    let query = AggregationQuery::new("Book")
        .column("copies")
        .filter(FilterExpression::eq("author.name", "Le Guin"));
    assert!(build(&schema, &query).is_ok());
}

#[test]
fn test_where_on_metric_rejected() {
    let schema = schema();
    let query = AggregationQuery::new("PlayerStats")
        .column("overallRating")
        .filter(FilterExpression::eq("highScore", 10i64));
    assert_eq!(clause_of(build(&schema, &query).unwrap_err()), QueryClause::Where);
}

fn since(date: &str) -> FilterExpression {
    FilterExpression::predicate("recordedDate", Operator::Ge, vec![Value::from(date)])
}

#[test]
fn test_table_required_filter_enforced() {
    let table = player_stats()
        .with_required_filter(RequiredFilter::on("recordedDate").with_operator(Operator::Ge));
    let schema = Schema::from_tables(vec![table]).unwrap();
    let base = AggregationQuery::new("PlayerStats").column("highScore");

    let err = build(&schema, &base).unwrap_err();
    assert!(matches!(
        &err,
        SemanticError::InvalidQuery { clause: QueryClause::Where, message }
            if message.contains("table 'PlayerStats' requires a where filter on recordedDate Ge")
    ));

    let wrong_operator = base.clone().filter(FilterExpression::predicate(
        "recordedDate",
        Operator::Lt,
        vec![Value::from("2024-02-01")],
    ));
    assert_eq!(clause_of(build(&schema, &wrong_operator).unwrap_err()), QueryClause::Where);

    let under_or = base.clone().filter(FilterExpression::Or(vec![
        since("2024-01-01"),
        FilterExpression::eq("overallRating", "Good"),
    ]));
    assert_eq!(clause_of(build(&schema, &under_or).unwrap_err()), QueryClause::Where);

    let satisfied = base
        .filter(FilterExpression::eq("overallRating", "Good"))
        .filter(since("2024-01-01"));
    assert!(build(&schema, &satisfied).is_ok());
}

#[test]
fn test_column_required_filter_only_when_selected() {
    let mut table = player_stats();
    let rating = table
        .columns
        .iter_mut()
        .find(|c| c.name == "overallRating")
        .unwrap();
    rating.required_filters.push(RequiredFilter::on("recordedDate"));
    let schema = Schema::from_tables(vec![table]).unwrap();

    let without = AggregationQuery::new("PlayerStats").column("highScore");
    assert!(build(&schema, &without).is_ok());

    let with = without.clone().column("overallRating");
    let err = build(&schema, &with).unwrap_err();
    assert!(matches!(
        &err,
        SemanticError::InvalidQuery { message, .. }
            if message == "selecting 'overallRating' requires a where filter on recordedDate"
    ));

    assert!(build(&schema, &with.filter(since("2024-01-01"))).is_ok());
}

#[test]
fn test_having_must_reference_selected_column() {
    let schema = schema();
    let query = AggregationQuery::new("PlayerStats")
        .column("overallRating")
        .column("highScore")
        .having(FilterExpression::eq("lowScore", 1i64));
    assert_eq!(clause_of(build(&schema, &query).unwrap_err()), QueryClause::Having);
}

#[test]
fn test_sort_must_reference_selected_column() {
    let schema = schema();
    let query = AggregationQuery::new("PlayerStats")
        .column("highScore")
        .sort_by("lowScore", SortDirection::Desc);
    assert_eq!(clause_of(build(&schema, &query).unwrap_err()), QueryClause::Sort);
}

#[test]
fn test_unknown_table_and_column() {
    let schema = schema();
    let query = AggregationQuery::new("Nope").column("highScore");
    assert_eq!(clause_of(build(&schema, &query).unwrap_err()), QueryClause::Table);

    let query = AggregationQuery::new("PlayerStats").column("nope");
    assert_eq!(clause_of(build(&schema, &query).unwrap_err()), QueryClause::Columns);
}

#[test]
fn test_unsupported_grain_rejected() {
    let schema = schema();
    let query = AggregationQuery::new("PlayerStats")
        .column("highScore")
        .time_dimension("recordedDate", TimeGrain::Year);
    assert_eq!(clause_of(build(&schema, &query).unwrap_err()), QueryClause::Columns);
}

#[test]
fn test_argument_values_checked() {
    let schema = schema();
    let allowed = AggregationQuery::new("PlayerStats")
        .select(ColumnRequest::new("scaledScore").with_argument("factor", "10"));
    let plan = build(&schema, &allowed).unwrap();
    assert_eq!(
        plan.projection("scaledScore").unwrap().arguments.get("factor").map(String::as_str),
        Some("10")
    );

    let rejected = AggregationQuery::new("PlayerStats")
        .select(ColumnRequest::new("scaledScore").with_argument("factor", "7"));
    assert!(matches!(
        build(&schema, &rejected).unwrap_err(),
        SemanticError::InvalidArgument { argument, value, .. } if argument == "factor" && value == "7"
    ));

    let undeclared = AggregationQuery::new("PlayerStats")
        .select(ColumnRequest::new("highScore").with_argument("factor", "10"));
    assert_eq!(
        clause_of(build(&schema, &undeclared).unwrap_err()),
        QueryClause::Arguments
    );
}

#[test]
fn test_duplicate_alias_rejected() {
    let schema = schema();
    let query = AggregationQuery::new("PlayerStats")
        .column("highScore")
        .select(ColumnRequest::new("lowScore").with_alias("highScore"));
    assert_eq!(clause_of(build(&schema, &query).unwrap_err()), QueryClause::Columns);
}

/// Always computes the metric one level down.
#[derive(Debug)]
struct AlwaysNested;

impl QueryPlanResolver for AlwaysNested {
    fn plan(&self, ctx: &mut PlanContext<'_, '_>, metric: &Projection) -> SemanticResult<Option<QueryPlan>> {
        let mut inner = QueryPlan::over_table(&ctx.table().name);
        inner.projections.push(metric.clone());
        let mut outer = QueryPlan::over_plan(inner);
        outer.projections.push(Projection {
            template: ProjectionTemplate::Expression(format!("MAX({{{{${}}}}})", metric.alias)),
            ..metric.clone()
        });
        Ok(Some(outer))
    }
}

#[test]
fn test_registered_resolver_overrides_declared_nesting() {
    let schema = schema();
    let mut registry = ResolverRegistry::new();
    registry.register("PlayerStats", "highScore", AlwaysNested);

    let query = AggregationQuery::new("PlayerStats")
        .column("highScore")
        .column("overallRating");
    let plan = QueryPlanBuilder::new(&schema, &registry).build(&query).unwrap();

    assert_eq!(plan.depth(), 2);
    assert_eq!(plan.output_names(), vec!["highScore", "overallRating"]);
    assert_eq!(
        plan.inner().unwrap().output_names(),
        vec!["overallRating", "highScore"]
    );
}
