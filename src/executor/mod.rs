//! Query execution.
//!
//! A [`QueryEngine`] owns everything shared between requests: the schema,
//! resolver registry, settings, connection provider and result cache. Each
//! request runs inside a [`Transaction`]:
//!
//! ```text
//! plan ─► generate ─► table version ─► cache lookup ─► main query ─► page totals ─► cache store
//! ```
//!
//! Everything here is synchronous; cancellation is cooperative through a
//! [`CancellationToken`].

mod cancel;
mod coerce;
mod connection;
mod error;
mod result;
mod sqlite;

pub use cancel::CancellationToken;
pub use coerce::{coerce, coerce_count, coerce_rows};
pub use connection::{Connection, ConnectionProvider, RawRows};
pub use error::{ExecutionError, ExecutionResult};
pub use result::QueryResult;
pub use sqlite::{SqliteConnection, SqliteConnectionProvider};

use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Span};
use uuid::Uuid;

use crate::cache::{CacheError, CacheKey, MemoryQueryCache, QueryCache, SqliteQueryCache};
use crate::config::{CacheBackend, CacheSettings, Settings};
use crate::error::Result;
use crate::model::{Schema, Table, Value, VersionSource};
use crate::semantic::planner::{QueryPlan, QueryPlanBuilder, ResolverRegistry};
use crate::semantic::query::AggregationQuery;
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::generator::{GeneratedSql, SqlGenerator};

/// Shared, read-only state for executing aggregation queries.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    schema: Arc<Schema>,
    registry: Arc<ResolverRegistry>,
    settings: Arc<Settings>,
    provider: Arc<dyn ConnectionProvider>,
    cache: Option<Arc<dyn QueryCache>>,
    /// Overrides the per-connection dialects from settings.
    dialect: Option<Arc<dyn SqlDialect>>,
}

impl QueryEngine {
    /// Engine with default settings and no cache.
    pub fn new(schema: Arc<Schema>, provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            schema,
            registry: Arc::new(ResolverRegistry::new()),
            settings: Arc::new(Settings::default()),
            provider,
            cache: None,
            dialect: None,
        }
    }

    /// Engine over the SQLite connections and cache backend named in `settings`.
    pub fn from_settings(schema: Arc<Schema>, settings: Settings) -> Result<Self> {
        let provider = SqliteConnectionProvider::from_settings(&settings)?;
        let cache = open_cache(&settings.cache)?;
        Ok(Self {
            schema,
            registry: Arc::new(ResolverRegistry::new()),
            settings: Arc::new(settings),
            provider: Arc::new(provider),
            cache,
            dialect: None,
        })
    }

    pub fn with_registry(mut self, registry: ResolverRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Generate every statement with `dialect`, whatever the settings say.
    pub fn with_dialect(mut self, dialect: Arc<dyn SqlDialect>) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Open a transaction for one request.
    pub fn begin(&self) -> Transaction<'_> {
        let id = Uuid::new_v4();
        let span = info_span!("transaction", id = %id);
        span.in_scope(|| info!("transaction started"));
        Transaction {
            engine: self,
            id,
            span,
        }
    }

    /// Dialect of the connection that serves `table`.
    fn dialect_for(&self, table: &Table) -> Dialect {
        self.settings.dialect_for(table.connection.as_deref())
    }
}

/// Build the configured cache backend, if caching is enabled.
pub fn open_cache(settings: &CacheSettings) -> Result<Option<Arc<dyn QueryCache>>> {
    if !settings.enabled {
        return Ok(None);
    }
    let cache: Arc<dyn QueryCache> = match settings.backend {
        CacheBackend::Memory => Arc::new(MemoryQueryCache::new(settings.max_entries)),
        CacheBackend::Sqlite => {
            let path = match settings.resolved_path()? {
                Some(path) => path,
                None => SqliteQueryCache::default_path()?,
            };
            Arc::new(SqliteQueryCache::open(path)?)
        }
    };
    Ok(Some(cache))
}

/// One request's unit of work. The connection it uses is released when each
/// call returns; dropping the transaction closes its span.
#[derive(Debug)]
pub struct Transaction<'e> {
    engine: &'e QueryEngine,
    id: Uuid,
    span: Span,
}

impl Transaction<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn plan(&self, query: &AggregationQuery) -> Result<QueryPlan> {
        let _enter = self.span.enter();
        self.compile(query).map(|(plan, _)| plan)
    }

    /// Statements `execute` would run for `query`, in execution order.
    pub fn explain(&self, query: &AggregationQuery) -> Result<Vec<String>> {
        let _enter = self.span.enter();
        let (_, sql) = self.compile(query)?;
        Ok(sql.statements())
    }

    pub fn execute(&self, query: &AggregationQuery, cancel: &CancellationToken) -> Result<QueryResult> {
        let _enter = self.span.enter();
        let engine = self.engine;
        let (plan, sql) = self.compile(query)?;
        let table = engine.schema.table(&query.table)?;

        let mut conn = engine.provider.connect(table.connection.as_deref())?;

        let key = match self.table_version(query, table, conn.as_mut(), cancel)? {
            Some(version) => Some(CacheKey::new(&version, query, &sql.statements()).map_err(CacheError::from)?),
            None => None,
        };

        if let (Some(cache), Some(key)) = (&engine.cache, &key) {
            match cache.get(key) {
                Ok(Some(hit)) => {
                    debug!(fingerprint = %key.fingerprint, version = %key.table_version, "cache hit");
                    return Ok(hit);
                }
                Ok(None) => debug!(fingerprint = %key.fingerprint, "cache miss"),
                Err(e) => warn!(error = %e, "cache read failed; executing"),
            }
        }

        cancel.check().inspect_err(|_| warn!("cancelled before main query"))?;
        debug!(sql = %sql.main, "executing main query");
        let raw = conn.query(&sql.main, cancel)?;
        let mut result = coerce_rows(raw, &plan.projections, &sql.main)?;

        if let Some(total_sql) = &sql.page_total {
            cancel.check().inspect_err(|_| warn!("cancelled before page totals"))?;
            debug!(sql = %total_sql, "executing page total query");
            let raw = conn.query(total_sql, cancel)?;
            result.page_total = Some(coerce_count(&raw, total_sql)?);
        }
        drop(conn);

        if let (Some(cache), Some(key)) = (&engine.cache, key) {
            if let Err(e) = cache.put(key, result.clone()) {
                warn!(error = %e, "cache write failed");
            }
        }

        info!(table = %query.table, rows = result.len(), "query executed");
        Ok(result)
    }

    fn compile(&self, query: &AggregationQuery) -> Result<(QueryPlan, GeneratedSql)> {
        let engine = self.engine;
        let configured: Dialect;
        let dialect: &dyn SqlDialect = match &engine.dialect {
            Some(custom) => custom.as_ref(),
            None => {
                // Unknown tables are reported by validation.
                configured = engine
                    .schema
                    .table(&query.table)
                    .map(|t| engine.dialect_for(t))
                    .unwrap_or(engine.settings.engine.default_dialect);
                &configured
            }
        };

        let plan = QueryPlanBuilder::new(&engine.schema, &engine.registry)
            .with_dialect(dialect)
            .with_max_page_size(engine.settings.engine.max_page_size)
            .build(query)?;
        let sql = SqlGenerator::new(&engine.schema, dialect).generate(&plan)?;
        Ok((plan, sql))
    }

    /// Version of the table's data, or `None` when the result must not be cached.
    fn table_version(
        &self,
        query: &AggregationQuery,
        table: &Table,
        conn: &mut dyn Connection,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        if query.bypass_cache || self.engine.cache.is_none() {
            return Ok(None);
        }
        match &table.version {
            VersionSource::None => Ok(None),
            VersionSource::Fixed(version) => Ok(Some(version.clone())),
            VersionSource::Query(sql) => {
                cancel.check()?;
                let raw = conn.query(sql, cancel)?;
                match raw.scalar() {
                    Some(Value::Null) | None => Err(ExecutionError::Shape {
                        sql: sql.clone(),
                        message: "version query must return one non-null value".into(),
                    }
                    .into()),
                    Some(value) => Ok(Some(value.to_string())),
                }
            }
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.span.in_scope(|| info!("transaction finished"));
    }
}
