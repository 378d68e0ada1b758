use aggplan::model::{Aggregation, Column, Schema, Table, TimeGrain, ValueType};
use aggplan::semantic::planner::{ProjectionTemplate, QueryPlan, QueryPlanBuilder, ResolverRegistry};
use aggplan::semantic::{QueryClause, SemanticError, SemanticResult};
use aggplan::sql::generator::SqlGenerator;
use aggplan::sql::Dialect;
use aggplan::AggregationQuery;

fn schema() -> Schema {
    let table = Table::physical("PlayerStats", None, "playerStats")
        .with_column(
            Column::metric("highScore", ValueType::Integer, "{{$high_score}}")
                .with_aggregation(Aggregation::Max),
        )
        .with_column(
            Column::metric("lowScore", ValueType::Integer, "{{$low_score}}")
                .with_aggregation(Aggregation::Min),
        )
        .with_column(Column::metric(
            "scoreSpread",
            ValueType::Integer,
            "{{highScore}} - {{lowScore}}",
        ))
        .with_column(
            Column::metric("uniquePlayers", ValueType::Integer, "{{$player_id}}")
                .with_aggregation(Aggregation::CountDistinct),
        )
        .with_column(
            Column::metric("dailyAverageScore", ValueType::Decimal, "AVG({{highScore}})")
                .per_grain("recordedDate", TimeGrain::Day),
        )
        .with_column(
            Column::metric("dailyBestScore", ValueType::Integer, "MAX({{highScore}})")
                .per_grain("recordedDate", TimeGrain::Day),
        )
        .with_column(
            Column::metric("monthlyAverageScore", ValueType::Decimal, "AVG({{highScore}})")
                .per_grain("recordedDate", TimeGrain::Month),
        )
        .with_column(Column::dimension("overallRating", ValueType::Text, "{{$overall_rating}}"))
        .with_column(Column::time_dimension(
            "recordedDate",
            "{{$recorded_date}}",
            &[TimeGrain::Day, TimeGrain::Month],
        ));
    Schema::from_tables(vec![table]).unwrap()
}

fn build(schema: &Schema, columns: &[&str]) -> SemanticResult<QueryPlan> {
    let registry = ResolverRegistry::new();
    let query = columns
        .iter()
        .fold(AggregationQuery::new("PlayerStats"), |q, c| q.column(c));
    QueryPlanBuilder::new(schema, &registry).build(&query)
}

#[test]
fn test_same_grain_metrics_share_one_subquery() {
    let schema = schema();
    let plan = build(&schema, &["dailyAverageScore", "dailyBestScore", "overallRating"]).unwrap();

    assert_eq!(plan.depth(), 2);
    assert_eq!(
        plan.output_names(),
        vec!["dailyAverageScore", "dailyBestScore", "overallRating"]
    );
    // Both metrics read the same inner highScore.
    assert_eq!(
        plan.inner().unwrap().output_names(),
        vec!["overallRating", "recordedDate_day", "highScore"]
    );

    let sql = SqlGenerator::new(&schema, &Dialect::Postgres)
        .generate(&plan)
        .unwrap();
    assert_eq!(sql.main.matches("FROM (").count(), 1);
    assert!(sql.main.contains("AVG(\"player_stats_inner_0\".\"highScore\") AS \"dailyAverageScore\""));
    assert!(sql.main.contains("MAX(\"player_stats_inner_0\".\"highScore\") AS \"dailyBestScore\""));
}

#[test]
fn test_direct_metric_refines_into_per_grain_subquery() {
    let schema = schema();
    let plan = build(&schema, &["highScore", "dailyAverageScore", "overallRating"]).unwrap();

    assert_eq!(plan.depth(), 2);
    assert_eq!(
        plan.projection("highScore").unwrap().template,
        ProjectionTemplate::Expression("MAX({{$highScore}})".into())
    );
    let inner = plan.inner().unwrap();
    assert!(inner.projection("recordedDate_day").is_some());
    assert_eq!(inner.metrics().count(), 1);
}

#[test]
fn test_different_grains_cannot_merge() {
    let schema = schema();
    let err = build(&schema, &["dailyAverageScore", "monthlyAverageScore"]).unwrap_err();
    assert!(matches!(
        err,
        SemanticError::InvalidQuery {
            clause: QueryClause::Metrics,
            ..
        }
    ));
    assert!(err.to_string().contains("dailyAverageScore"));
    assert!(err.to_string().contains("monthlyAverageScore"));
}

#[test]
fn test_distinct_count_cannot_be_nested() {
    let schema = schema();
    let err = build(&schema, &["uniquePlayers", "dailyAverageScore"]).unwrap_err();
    assert!(matches!(
        err,
        SemanticError::InvalidQuery {
            clause: QueryClause::Metrics,
            ..
        }
    ));

    // On its own it stays a direct projection.
    let plan = build(&schema, &["uniquePlayers", "overallRating"]).unwrap();
    assert_eq!(plan.depth(), 1);
}

#[test]
fn test_metric_built_from_metrics_joins_per_grain_subquery() {
    let schema = schema();
    assert_eq!(build(&schema, &["scoreSpread"]).unwrap().depth(), 1);

    let plan = build(&schema, &["scoreSpread", "dailyAverageScore", "overallRating"]).unwrap();
    assert_eq!(plan.depth(), 2);
    assert_eq!(
        plan.projection("scoreSpread").unwrap().template,
        ProjectionTemplate::Expression("MAX({{$scoreSpread_0}}) - MIN({{$scoreSpread_1}})".into())
    );

    let sql = SqlGenerator::new(&schema, &Dialect::Postgres)
        .generate(&plan)
        .unwrap();
    assert_eq!(sql.main.matches("FROM (").count(), 1);
    assert!(sql.main.contains("MAX(\"player_stats\".\"high_score\") AS \"scoreSpread_0\""));
    assert!(sql.main.contains("MIN(\"player_stats\".\"low_score\") AS \"scoreSpread_1\""));
    assert!(sql.main.contains(
        "MAX(\"player_stats_inner_0\".\"scoreSpread_0\") - MIN(\"player_stats_inner_0\".\"scoreSpread_1\") AS \"scoreSpread\""
    ));
}
