use aggplan::model::{
    Aggregation, ArgumentDef, Bindings, Column, Join, JoinKind, Schema, Table, ValueType,
};
use aggplan::semantic::planner::{QueryPlanBuilder, ResolverRegistry};
use aggplan::semantic::resolver::Resolver;
use aggplan::semantic::SemanticError;
use aggplan::sql::Dialect;
use aggplan::AggregationQuery;

fn stats() -> Table {
    Table::physical("PlayerStats", None, "playerStats")
        .with_column(
            Column::metric("highScore", ValueType::Integer, "{{$high_score}}")
                .with_aggregation(Aggregation::Max),
        )
        .with_column(
            Column::metric(
                "scoreWithBonus",
                ValueType::Integer,
                "{{$score}} + {{$$column.args.bonus}}",
            )
            .with_aggregation(Aggregation::Sum)
            .with_argument(ArgumentDef::new("bonus", ValueType::Integer).with_default("0")),
        )
        .with_column(Column::metric(
            "boostedScore",
            ValueType::Integer,
            "{{scoreWithBonus[bonus:10]}}",
        ))
        .with_column(Column::dimension("playerName", ValueType::Text, "{{player.$name}}"))
        .with_column(Column::dimension(
            "playerCountry",
            ValueType::Text,
            "{{player.country.name}}",
        ))
        .with_column(Column::dimension(
            "playerCountryIso",
            ValueType::Text,
            "{{player.country.isoCode}}",
        ))
        .with_join(Join::new(
            "player",
            "Player",
            JoinKind::Inner,
            "{{$player_id}} = {{player.$id}}",
        ))
}

fn schema() -> Schema {
    let player = Table::physical("Player", None, "players").with_join(Join::new(
        "country",
        "Country",
        JoinKind::Left,
        "{{$country_id}} = {{country.$id}}",
    ));
    let country = Table::physical("Country", None, "countries")
        .with_column(Column::dimension("name", ValueType::Text, "{{$name}}"))
        .with_column(Column::dimension("isoCode", ValueType::Text, "{{$iso_code}}"));
    Schema::from_tables(vec![stats(), player, country]).unwrap()
}

fn resolve(schema: &Schema, column: &str) -> String {
    let table = schema.table("PlayerStats").unwrap();
    let mut resolver = Resolver::new(schema, &Dialect::Postgres);
    let none = Bindings::new();
    resolver
        .resolve_column(table, "player_stats", column, &none, &none)
        .unwrap()
        .sql
}

#[test]
fn test_physical_reference_is_qualified_by_alias() {
    let schema = schema();
    assert_eq!(resolve(&schema, "highScore"), "MAX(\"player_stats\".\"high_score\")");
}

#[test]
fn test_column_argument_default_and_pin() {
    let schema = schema();
    assert_eq!(
        resolve(&schema, "scoreWithBonus"),
        "SUM(\"player_stats\".\"score\" + 0)"
    );
    assert_eq!(
        resolve(&schema, "boostedScore"),
        "SUM(\"player_stats\".\"score\" + 10)"
    );
}

#[test]
fn test_explicit_binding_overrides_default() {
    let schema = schema();
    let table = schema.table("PlayerStats").unwrap();
    let mut resolver = Resolver::new(&schema, &Dialect::Postgres);
    let bindings = Bindings::from([("bonus".to_string(), "5".to_string())]);
    let resolved = resolver
        .resolve_column(table, "player_stats", "scoreWithBonus", &bindings, &Bindings::new())
        .unwrap();
    assert_eq!(resolved.sql, "SUM(\"player_stats\".\"score\" + 5)");
}

#[test]
fn test_multi_hop_join_path() {
    let schema = schema();
    let table = schema.table("PlayerStats").unwrap();
    let mut resolver = Resolver::new(&schema, &Dialect::Postgres);
    let none = Bindings::new();
    let resolved = resolver
        .resolve_column(table, "player_stats", "playerCountry", &none, &none)
        .unwrap();

    assert_eq!(resolved.sql, "\"player_stats_player_country\".\"name\"");
    let aliases: Vec<&str> = resolved.joins.iter().map(|j| j.alias.as_str()).collect();
    assert_eq!(aliases, vec!["player_stats_player", "player_stats_player_country"]);
    assert_eq!(
        resolved.joins[1].on,
        "\"player_stats_player\".\"country_id\" = \"player_stats_player_country\".\"id\""
    );
    assert_eq!(resolved.joins[1].parent_alias, "player_stats_player");
}

#[test]
fn test_one_alias_per_join_path() {
    let schema = schema();
    let table = schema.table("PlayerStats").unwrap();
    let mut resolver = Resolver::new(&schema, &Dialect::Postgres);
    let none = Bindings::new();
    let name = resolver
        .resolve_column(table, "player_stats", "playerCountry", &none, &none)
        .unwrap();
    let iso = resolver
        .resolve_column(table, "player_stats", "playerCountryIso", &none, &none)
        .unwrap();
    assert_eq!(name.joins, iso.joins);
    assert_eq!(iso.sql, "\"player_stats_player_country\".\"iso_code\"");
}

#[test]
fn test_resolution_is_idempotent() {
    let schema = schema();
    let table = schema.table("PlayerStats").unwrap();
    let none = Bindings::new();

    let mut resolver = Resolver::new(&schema, &Dialect::Postgres);
    let first = resolver
        .resolve_column(table, "player_stats", "playerCountry", &none, &none)
        .unwrap();
    let second = resolver
        .resolve_column(table, "player_stats", "playerCountry", &none, &none)
        .unwrap();
    assert_eq!(first, second);

    let mut fresh = Resolver::new(&schema, &Dialect::Postgres);
    let third = fresh
        .resolve_column(table, "player_stats", "playerCountry", &none, &none)
        .unwrap();
    assert_eq!(first, third);
}

fn looping_schema(columns: Vec<Column>) -> Schema {
    let mut table = Table::physical("PlayerStats", None, "playerStats")
        .with_column(Column::dimension("overallRating", ValueType::Text, "{{$overall_rating}}"));
    for column in columns {
        table = table.with_column(column);
    }
    Schema::from_tables_unchecked(vec![table]).unwrap()
}

fn plan_error(schema: &Schema, column: &str) -> SemanticError {
    let registry = ResolverRegistry::new();
    let query = AggregationQuery::new("PlayerStats")
        .column(column)
        .column("overallRating");
    QueryPlanBuilder::new(schema, &registry).build(&query).unwrap_err()
}

#[test]
fn test_self_loop_detected_when_planning() {
    let schema = looping_schema(vec![Column::metric("a", ValueType::Integer, "{{a}} + 1")
        .with_aggregation(Aggregation::Sum)]);
    match plan_error(&schema, "a") {
        SemanticError::ReferenceCycle { path } => assert_eq!(path, vec!["a", "a"]),
        other => panic!("expected a reference cycle, got {other:?}"),
    }
}

#[test]
fn test_mutual_loop_names_both_columns() {
    let schema = looping_schema(vec![
        Column::metric("a", ValueType::Integer, "{{b}}").with_aggregation(Aggregation::Sum),
        Column::metric("b", ValueType::Integer, "{{a}}"),
    ]);
    match plan_error(&schema, "a") {
        SemanticError::ReferenceCycle { path } => assert_eq!(path, vec!["a", "b", "a"]),
        other => panic!("expected a reference cycle, got {other:?}"),
    }
}

#[test]
fn test_loops_rejected_at_schema_load() {
    let table = Table::physical("PlayerStats", None, "playerStats")
        .with_column(Column::metric("a", ValueType::Integer, "{{b}}"))
        .with_column(Column::metric("b", ValueType::Integer, "{{a}}"));
    let err = Schema::from_tables(vec![table]).unwrap_err();
    assert_eq!(
        err,
        SemanticError::ReferenceCycle {
            path: vec!["a".into(), "b".into(), "a".into()]
        }
    );
    assert_eq!(err.to_string(), "Formula reference loop: a->b->a");
}

#[test]
fn test_missing_argument_reported() {
    let table = Table::physical("Sales", None, "sales").with_column(
        Column::metric("converted", ValueType::Decimal, "{{$amount}} * {{$$column.args.rate}}")
            .with_aggregation(Aggregation::Sum)
            .with_argument(ArgumentDef::new("rate", ValueType::Decimal)),
    );
    let schema = Schema::from_tables(vec![table]).unwrap();
    let table = schema.table("Sales").unwrap();
    let mut resolver = Resolver::new(&schema, &Dialect::Postgres);
    let none = Bindings::new();
    let err = resolver
        .resolve_column(table, "sales", "converted", &none, &none)
        .unwrap_err();
    assert_eq!(
        err,
        SemanticError::MissingArgument {
            column: "converted".into(),
            argument: "rate".into()
        }
    );
}
