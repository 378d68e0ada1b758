use std::sync::Arc;
use std::thread;

use aggplan::cache::{fingerprint, CacheKey, MemoryQueryCache, QueryCache, SqliteQueryCache};
use aggplan::model::Value;
use aggplan::semantic::query::{ColumnRequest, FilterExpression, SortDirection};
use aggplan::{AggregationQuery, QueryResult};

fn query() -> AggregationQuery {
    AggregationQuery::new("PlayerStats")
        .column("highScore")
        .column("overallRating")
        .filter(FilterExpression::eq("overallRating", "Good"))
}

fn sql() -> Vec<String> {
    vec![
        "SELECT MAX(\"player_stats\".\"high_score\") AS \"highScore\" FROM \"playerStats\" AS \"player_stats\"".to_string(),
    ]
}

fn result(score: i64) -> QueryResult {
    let mut result = QueryResult::new(vec!["highScore".into(), "overallRating".into()]);
    result.rows.push(vec![Value::Integer(score), Value::from("Good")]);
    result
}

fn exercise(cache: &dyn QueryCache) {
    let key = CacheKey::new("v1", &query(), &sql()).unwrap();
    assert_eq!(cache.get(&key).unwrap(), None);

    cache.put(key.clone(), result(10)).unwrap();
    assert_eq!(cache.get(&key).unwrap(), Some(result(10)));

    // A new table version never sees the old entry.
    let next = CacheKey::new("v2", &query(), &sql()).unwrap();
    assert_eq!(cache.get(&next).unwrap(), None);

    cache.put(key.clone(), result(20)).unwrap();
    assert_eq!(cache.get(&key).unwrap(), Some(result(20)));
}

#[test]
fn test_memory_backend() {
    exercise(&MemoryQueryCache::default());
}

#[test]
fn test_sqlite_backend() {
    exercise(&SqliteQueryCache::open_in_memory().unwrap());
}

#[test]
fn test_fingerprint_tracks_result_shaping_fields() {
    let base = fingerprint(&query(), &sql()).unwrap();

    let variants = [
        query().column("lowScore"),
        query().filter(FilterExpression::eq("overallRating", "Bad")),
        query().sort_by("highScore", SortDirection::Desc),
        query().paginate(0, 10),
        query().paginate(10, 10),
        query().with_argument("region", "eu"),
        AggregationQuery::new("PlayerStats")
            .column("overallRating")
            .column("highScore")
            .filter(FilterExpression::eq("overallRating", "Good")),
        AggregationQuery::new("PlayerStats")
            .select(ColumnRequest::new("highScore").with_alias("best"))
            .column("overallRating")
            .filter(FilterExpression::eq("overallRating", "Good")),
    ];
    for variant in &variants {
        assert_ne!(fingerprint(variant, &sql()).unwrap(), base, "{variant:?}");
    }

    assert_eq!(fingerprint(&query().bypass_cache(), &sql()).unwrap(), base);
}

#[test]
fn test_argument_order_does_not_change_fingerprint() {
    let a = query().with_argument("region", "eu").with_argument("currency", "EUR");
    let b = query().with_argument("currency", "EUR").with_argument("region", "eu");
    assert_eq!(fingerprint(&a, &sql()).unwrap(), fingerprint(&b, &sql()).unwrap());
}

#[test]
fn test_memory_cache_stays_bounded() {
    let cache = MemoryQueryCache::new(3);
    for i in 0..10 {
        let key = CacheKey::new(&format!("v{i}"), &query(), &sql()).unwrap();
        cache.put(key, result(i)).unwrap();
    }
    assert_eq!(cache.len(), 3);

    // The latest write always survives.
    let last = CacheKey::new("v9", &query(), &sql()).unwrap();
    assert_eq!(cache.get(&last).unwrap(), Some(result(9)));
}

#[test]
fn test_memory_cache_concurrent_access() {
    let cache = Arc::new(MemoryQueryCache::new(64));
    thread::scope(|s| {
        for t in 0..8i64 {
            let cache = Arc::clone(&cache);
            s.spawn(move || {
                let key = CacheKey::new(&format!("thread-{t}"), &query(), &sql()).unwrap();
                cache.put(key.clone(), result(t)).unwrap();
                assert_eq!(cache.get(&key).unwrap(), Some(result(t)));
            });
        }
    });
    assert_eq!(cache.len(), 8);
}

#[test]
fn test_sqlite_cache_survives_reopen() {
    let dir = std::env::temp_dir().join(format!("aggplan-cache-test-{}", uuid::Uuid::new_v4()));
    let path = dir.join("results.db");
    let key = CacheKey::new("v1", &query(), &sql()).unwrap();

    {
        let cache = SqliteQueryCache::open(&path).unwrap();
        cache.put(key.clone(), result(42)).unwrap();
        assert_eq!(cache.len().unwrap(), 1);
    }

    let reopened = SqliteQueryCache::open(&path).unwrap();
    assert_eq!(reopened.get(&key).unwrap(), Some(result(42)));
    reopened.clear().unwrap();
    assert_eq!(reopened.get(&key).unwrap(), None);

    drop(reopened);
    let _ = std::fs::remove_dir_all(&dir);
}
