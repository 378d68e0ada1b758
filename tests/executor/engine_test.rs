use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aggplan::cache::{MemoryQueryCache, QueryCache};
use aggplan::config::Settings;
use aggplan::executor::{
    CancellationToken, Connection, ConnectionProvider, ExecutionError, ExecutionResult, QueryEngine,
    RawRows, SqliteConnectionProvider,
};
use aggplan::model::{Aggregation, Column, Schema, Table, TimeGrain, Value, ValueType, VersionSource};
use aggplan::semantic::query::SortDirection;
use aggplan::sql::Dialect;
use aggplan::{AggregationQuery, Error};

const SEED: &str = "
    CREATE TABLE player_stats_raw (
        high_score INTEGER NOT NULL,
        overall_rating TEXT NOT NULL,
        recorded_date TEXT NOT NULL
    );
    INSERT INTO player_stats_raw VALUES
        (10, 'Good', '2024-01-01 09:00:00'),
        (20, 'Good', '2024-01-01 18:00:00'),
        (30, 'Good', '2024-01-02 12:00:00'),
        (5,  'Bad',  '2024-01-01 10:00:00');
    CREATE TABLE table_versions (name TEXT PRIMARY KEY, version INTEGER NOT NULL);
    INSERT INTO table_versions VALUES ('player_stats', 1);
";

fn stats_table(version: VersionSource) -> Table {
    Table::physical("PlayerStats", None, "player_stats_raw")
        .with_column(
            Column::metric("highScore", ValueType::Integer, "{{$high_score}}")
                .with_aggregation(Aggregation::Max),
        )
        .with_column(
            Column::metric("dailyAverageScorePerPeriod", ValueType::Decimal, "AVG({{highScore}})")
                .per_grain("recordedDate", TimeGrain::Day),
        )
        .with_column(Column::dimension("overallRating", ValueType::Text, "{{$overall_rating}}"))
        .with_column(Column::time_dimension(
            "recordedDate",
            "{{$recorded_date}}",
            &[TimeGrain::Day, TimeGrain::Month],
        ))
        .with_version(version)
}

fn sqlite_settings() -> Settings {
    let mut settings = Settings::default();
    settings.engine.default_dialect = Dialect::Sqlite;
    settings
}

fn seeded_provider() -> SqliteConnectionProvider {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch(SEED).unwrap();
    SqliteConnectionProvider::new().with_connection("default", conn)
}

/// Counts statements sent to the database.
#[derive(Debug)]
struct CountingProvider {
    inner: SqliteConnectionProvider,
    statements: Arc<AtomicUsize>,
}

struct CountingConnection {
    inner: Box<dyn Connection>,
    statements: Arc<AtomicUsize>,
}

impl ConnectionProvider for CountingProvider {
    fn connect(&self, name: Option<&str>) -> ExecutionResult<Box<dyn Connection>> {
        Ok(Box::new(CountingConnection {
            inner: self.inner.connect(name)?,
            statements: Arc::clone(&self.statements),
        }))
    }
}

impl Connection for CountingConnection {
    fn query(&mut self, sql: &str, cancel: &CancellationToken) -> ExecutionResult<RawRows> {
        self.statements.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql, cancel)
    }
}

/// Trips the request's token as soon as the first statement returns.
#[derive(Debug)]
struct CancelAfterFirstProvider {
    inner: SqliteConnectionProvider,
    statements: Arc<AtomicUsize>,
}

struct CancelAfterFirstConnection {
    inner: Box<dyn Connection>,
    statements: Arc<AtomicUsize>,
}

impl ConnectionProvider for CancelAfterFirstProvider {
    fn connect(&self, name: Option<&str>) -> ExecutionResult<Box<dyn Connection>> {
        Ok(Box::new(CancelAfterFirstConnection {
            inner: self.inner.connect(name)?,
            statements: Arc::clone(&self.statements),
        }))
    }
}

impl Connection for CancelAfterFirstConnection {
    fn query(&mut self, sql: &str, cancel: &CancellationToken) -> ExecutionResult<RawRows> {
        self.statements.fetch_add(1, Ordering::SeqCst);
        let rows = self.inner.query(sql, cancel)?;
        cancel.cancel();
        Ok(rows)
    }
}

fn counting_engine(
    version: VersionSource,
    provider: SqliteConnectionProvider,
) -> (QueryEngine, Arc<MemoryQueryCache>, Arc<AtomicUsize>) {
    let statements = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(MemoryQueryCache::default());
    let provider = CountingProvider {
        inner: provider,
        statements: Arc::clone(&statements),
    };
    let schema = Schema::from_tables(vec![stats_table(version)]).unwrap();
    let engine = QueryEngine::new(Arc::new(schema), Arc::new(provider))
        .with_settings(sqlite_settings())
        .with_cache(Arc::clone(&cache) as Arc<dyn QueryCache>);
    (engine, cache, statements)
}

fn by_rating() -> AggregationQuery {
    AggregationQuery::new("PlayerStats")
        .column("highScore")
        .column("overallRating")
        .sort_by("overallRating", SortDirection::Asc)
}

#[test]
fn test_direct_query_rows() {
    let schema = Schema::from_tables(vec![stats_table(VersionSource::None)]).unwrap();
    let engine = QueryEngine::new(Arc::new(schema), Arc::new(seeded_provider()))
        .with_settings(sqlite_settings());

    let result = engine
        .begin()
        .execute(&by_rating(), &CancellationToken::new())
        .unwrap();

    assert_eq!(result.columns, vec!["highScore", "overallRating"]);
    assert_eq!(
        result.rows,
        vec![
            vec![Value::Integer(5), Value::from("Bad")],
            vec![Value::Integer(30), Value::from("Good")],
        ]
    );
    assert_eq!(result.page_total, None);
}

#[test]
fn test_per_grain_query_averages_daily_maxima() {
    let schema = Schema::from_tables(vec![stats_table(VersionSource::None)]).unwrap();
    let engine = QueryEngine::new(Arc::new(schema), Arc::new(seeded_provider()))
        .with_settings(sqlite_settings());
    let query = AggregationQuery::new("PlayerStats")
        .column("overallRating")
        .column("dailyAverageScorePerPeriod")
        .sort_by("overallRating", SortDirection::Asc);

    let result = engine.begin().execute(&query, &CancellationToken::new()).unwrap();

    // Good: daily maxima 20 and 30. Bad: a single day at 5.
    assert_eq!(result.get(0, "dailyAverageScorePerPeriod"), Some(&Value::Decimal(5.0)));
    assert_eq!(result.get(1, "overallRating"), Some(&Value::from("Good")));
    assert_eq!(result.get(1, "dailyAverageScorePerPeriod"), Some(&Value::Decimal(25.0)));
}

#[test]
fn test_page_totals_ignore_pagination() {
    let (engine, _, statements) = counting_engine(VersionSource::None, seeded_provider());
    let query = by_rating().paginate(0, 1).with_page_totals();

    let result = engine.begin().execute(&query, &CancellationToken::new()).unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.page_total, Some(2));
    assert_eq!(statements.load(Ordering::SeqCst), 2);
}

#[test]
fn test_fixed_version_served_from_cache() {
    let (engine, cache, statements) =
        counting_engine(VersionSource::Fixed("2024-01".into()), seeded_provider());

    let first = engine.begin().execute(&by_rating(), &CancellationToken::new()).unwrap();
    let second = engine.begin().execute(&by_rating(), &CancellationToken::new()).unwrap();

    assert_eq!(first, second);
    assert_eq!(statements.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_unversioned_table_never_cached() {
    let (engine, cache, statements) = counting_engine(VersionSource::None, seeded_provider());

    let first = engine.begin().execute(&by_rating(), &CancellationToken::new()).unwrap();
    let second = engine.begin().execute(&by_rating(), &CancellationToken::new()).unwrap();

    assert_eq!(first, second);
    assert_eq!(statements.load(Ordering::SeqCst), 2);
    assert_eq!(cache.len(), 0);
}

fn scores_table(aggregation: Aggregation) -> Table {
    Table::physical("PlayerStats", None, "player_stats_raw")
        .with_column(
            Column::metric("highScore", ValueType::Integer, "{{$high_score}}")
                .with_aggregation(aggregation),
        )
        .with_column(Column::dimension("overallRating", ValueType::Text, "{{$overall_rating}}"))
        .with_version(VersionSource::Fixed("v1".into()))
}

#[test]
fn test_changed_definition_misses_cache() {
    let cache = Arc::new(MemoryQueryCache::default());
    let engine_for = |aggregation| {
        let schema = Schema::from_tables(vec![scores_table(aggregation)]).unwrap();
        QueryEngine::new(Arc::new(schema), Arc::new(seeded_provider()))
            .with_settings(sqlite_settings())
            .with_cache(Arc::clone(&cache) as Arc<dyn QueryCache>)
    };
    let max_engine = engine_for(Aggregation::Max);
    let min_engine = engine_for(Aggregation::Min);

    let max = max_engine.begin().execute(&by_rating(), &CancellationToken::new()).unwrap();
    let min = min_engine.begin().execute(&by_rating(), &CancellationToken::new()).unwrap();

    assert_eq!(max.get(1, "highScore"), Some(&Value::Integer(30)));
    assert_eq!(
        min.rows,
        vec![
            vec![Value::Integer(5), Value::from("Bad")],
            vec![Value::Integer(10), Value::from("Good")],
        ]
    );
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_bypass_skips_cache() {
    let (engine, cache, statements) =
        counting_engine(VersionSource::Fixed("2024-01".into()), seeded_provider());
    let query = by_rating().bypass_cache();

    engine.begin().execute(&query, &CancellationToken::new()).unwrap();
    engine.begin().execute(&query, &CancellationToken::new()).unwrap();

    assert_eq!(statements.load(Ordering::SeqCst), 2);
    assert!(cache.is_empty());
}

#[test]
fn test_queried_version_change_invalidates() {
    let dir = std::env::temp_dir().join(format!("aggplan-engine-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("games.db");
    let admin = rusqlite::Connection::open(&path).unwrap();
    admin.execute_batch(SEED).unwrap();

    let version = VersionSource::Query(
        "SELECT version FROM table_versions WHERE name = 'player_stats'".into(),
    );
    let provider = SqliteConnectionProvider::new().with_database("default", &path);
    let (engine, cache, statements) = counting_engine(version, provider);
    let run = || engine.begin().execute(&by_rating(), &CancellationToken::new()).unwrap();

    let before = run();
    assert_eq!(statements.load(Ordering::SeqCst), 2);

    // Same version: only the version lookup runs.
    assert_eq!(run(), before);
    assert_eq!(statements.load(Ordering::SeqCst), 3);

    admin
        .execute_batch(
            "INSERT INTO player_stats_raw VALUES (99, 'Bad', '2024-01-03 08:00:00');
             UPDATE table_versions SET version = 2 WHERE name = 'player_stats';",
        )
        .unwrap();

    let after = run();
    assert_eq!(statements.load(Ordering::SeqCst), 5);
    assert_eq!(after.get(0, "highScore"), Some(&Value::Integer(99)));
    assert_eq!(cache.len(), 2);

    drop(admin);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_cancelled_before_main_query() {
    let (engine, _, statements) = counting_engine(VersionSource::None, seeded_provider());
    let token = CancellationToken::new();
    token.cancel();

    let err = engine.begin().execute(&by_rating(), &token).unwrap_err();
    assert!(matches!(err, Error::Execution(ExecutionError::Cancelled)));
    assert!(!err.is_client_error());
    assert_eq!(statements.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cancelled_during_main_query_skips_page_totals() {
    let statements = Arc::new(AtomicUsize::new(0));
    let provider = CancelAfterFirstProvider {
        inner: seeded_provider(),
        statements: Arc::clone(&statements),
    };
    let schema = Schema::from_tables(vec![stats_table(VersionSource::None)]).unwrap();
    let engine = QueryEngine::new(Arc::new(schema), Arc::new(provider)).with_settings(sqlite_settings());
    let query = by_rating().paginate(0, 1).with_page_totals();

    let token = CancellationToken::new();
    let err = engine.begin().execute(&query, &token).unwrap_err();

    assert!(matches!(err, Error::Execution(ExecutionError::Cancelled)));
    assert_eq!(statements.load(Ordering::SeqCst), 1);
}

#[test]
fn test_expired_deadline_cancels() {
    let (engine, _, _) = counting_engine(VersionSource::None, seeded_provider());
    let token = CancellationToken::with_timeout(Duration::ZERO);
    let err = engine.begin().execute(&by_rating(), &token).unwrap_err();
    assert!(matches!(err, Error::Execution(ExecutionError::Cancelled)));
}

#[test]
fn test_invalid_query_is_client_error() {
    let (engine, _, statements) = counting_engine(VersionSource::None, seeded_provider());
    let query = AggregationQuery::new("PlayerStats").column("nope");

    let err = engine.begin().execute(&query, &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, Error::Semantic(_)));
    assert!(err.is_client_error());
    assert_eq!(statements.load(Ordering::SeqCst), 0);
}

#[test]
fn test_explain_lists_statements_in_order() {
    let (engine, _, statements) = counting_engine(VersionSource::None, seeded_provider());
    let query = by_rating().paginate(0, 1).with_page_totals();

    let explained = engine.begin().explain(&query).unwrap();
    assert_eq!(explained.len(), 2);
    assert!(explained[0].contains("MAX(\"player_stats\".\"high_score\")"));
    assert!(explained[1].contains("COUNT(*)"));
    assert_eq!(statements.load(Ordering::SeqCst), 0);
}

#[test]
fn test_engine_dialect_overrides_settings() {
    let (engine, _, _) = counting_engine(VersionSource::None, seeded_provider());
    let engine = engine.with_dialect(Arc::new(Dialect::MySql));

    let explained = engine.begin().explain(&by_rating()).unwrap();
    assert!(explained[0].contains("MAX(`player_stats`.`high_score`)"), "{}", explained[0]);
}

#[test]
fn test_transactions_have_distinct_ids() {
    let (engine, _, _) = counting_engine(VersionSource::None, seeded_provider());
    let a = engine.begin();
    let b = engine.begin();
    assert_ne!(a.id(), b.id());
}
