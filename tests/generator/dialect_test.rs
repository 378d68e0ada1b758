use aggplan::model::{Aggregation, Column, Schema, Table, TimeGrain, ValueType};
use aggplan::semantic::planner::{QueryPlanBuilder, ResolverRegistry};
use aggplan::semantic::query::SortDirection;
use aggplan::sql::{Dialect, GeneratedSql, SqlDialect, SqlGenerator, TokenStream};
use aggplan::{AggregationQuery, Error};

fn schema() -> Schema {
    let table = Table::physical("PlayerStats", None, "playerStats")
        .with_column(
            Column::metric("highScore", ValueType::Integer, "{{$high_score}}")
                .with_aggregation(Aggregation::Max),
        )
        .with_column(Column::dimension("overallRating", ValueType::Text, "{{$overall_rating}}"))
        .with_column(Column::time_dimension(
            "recordedDate",
            "{{$recorded_date}}",
            &[TimeGrain::Day, TimeGrain::Month],
        ));
    Schema::from_tables(vec![table]).unwrap()
}

fn generate(query: &AggregationQuery, dialect: Dialect) -> aggplan::Result<GeneratedSql> {
    generate_for(query, &dialect)
}

fn generate_for(query: &AggregationQuery, dialect: &dyn SqlDialect) -> aggplan::Result<GeneratedSql> {
    let schema = schema();
    let registry = ResolverRegistry::new();
    let plan = QueryPlanBuilder::new(&schema, &registry)
        .with_dialect(dialect)
        .build(query)?;
    SqlGenerator::new(&schema, dialect).generate(&plan)
}

/// An engine with none of the built-in profiles.
#[derive(Debug)]
struct Warehouse;

impl SqlDialect for Warehouse {
    fn name(&self) -> &str {
        "warehouse"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("[{}]", ident)
    }

    fn date_truncate(&self, grain: TimeGrain, expr: &str) -> String {
        format!("TRUNC({}, '{}')", expr, grain)
    }

    fn write_page(&self, limit: u64, offset: u64, out: &mut TokenStream) {
        out.raw(&format!("ROWS {} TO {}", offset + 1, offset + limit));
    }
}

fn paged(offset: u64) -> AggregationQuery {
    AggregationQuery::new("PlayerStats")
        .column("highScore")
        .column("overallRating")
        .sort_by("highScore", SortDirection::Desc)
        .paginate(offset, 25)
}

#[test]
fn test_presto_rejects_offsets() {
    let err = generate(&paged(50), Dialect::Presto).unwrap_err();
    assert!(matches!(
        err,
        Error::UnsupportedPagination { ref dialect, offset: 50 } if dialect == "presto"
    ));
    assert!(err.is_client_error());
}

#[test]
fn test_presto_first_page_is_fine() {
    let sql = generate(&paged(0), Dialect::Presto).unwrap().main;
    assert!(sql.ends_with("LIMIT 25"));
    assert!(!sql.contains("OFFSET"));
}

#[test]
fn test_every_other_dialect_pages_with_offset() {
    for dialect in Dialect::ALL {
        if dialect == Dialect::Presto {
            continue;
        }
        let sql = generate(&paged(50), dialect).unwrap().main;
        assert!(sql.contains("50"), "{dialect}: {sql}");
        assert!(sql.contains("25"), "{dialect}: {sql}");
    }
}

#[test]
fn test_identifier_quoting_follows_dialect() {
    let query = AggregationQuery::new("PlayerStats")
        .column("highScore")
        .column("overallRating");

    let postgres = generate(&query, Dialect::Postgres).unwrap().main;
    assert!(postgres.contains("\"player_stats\".\"high_score\""));

    let mysql = generate(&query, Dialect::MySql).unwrap().main;
    assert!(mysql.contains("`player_stats`.`high_score`"));
    assert!(mysql.contains("AS `highScore`"));

    let tsql = generate(&query, Dialect::TSql).unwrap().main;
    assert!(tsql.contains("[player_stats].[high_score]"));

    let bigquery = generate(&query, Dialect::BigQuery).unwrap().main;
    assert!(bigquery.contains("`player_stats`.`high_score`"));
}

#[test]
fn test_tsql_offset_fetch() {
    let sql = generate(&paged(50), Dialect::TSql).unwrap().main;
    assert!(sql.ends_with("OFFSET 50 ROWS FETCH NEXT 25 ROWS ONLY"));
}

#[test]
fn test_time_grain_truncation_per_dialect() {
    let query = AggregationQuery::new("PlayerStats")
        .column("highScore")
        .time_dimension("recordedDate", TimeGrain::Month);

    let duckdb = generate(&query, Dialect::DuckDb).unwrap().main;
    assert!(duckdb.contains("DATE_TRUNC('month', \"player_stats\".\"recorded_date\")"));

    for dialect in Dialect::ALL {
        let sql = generate(&query, dialect).unwrap().main;
        assert!(sql.contains("recorded_date"), "{dialect}: {sql}");
        assert!(sql.contains("GROUP BY"), "{dialect}: {sql}");
    }
}

#[test]
fn test_custom_dialect_drives_generation() {
    let query = paged(50).time_dimension("recordedDate", TimeGrain::Month);
    let sql = generate_for(&query, &Warehouse).unwrap().main;

    assert!(sql.contains("MAX([player_stats].[high_score]) AS [highScore]"), "{sql}");
    assert!(sql.contains("TRUNC([player_stats].[recorded_date], 'month')"), "{sql}");
    assert!(sql.contains("FROM [playerStats] AS [player_stats]"), "{sql}");
    assert!(sql.ends_with("ROWS 51 TO 75"), "{sql}");
}
