//! Cache keys.

use serde::{Deserialize, Serialize};

use super::hash::compute_hash;
use crate::model::Bindings;
use crate::semantic::query::{AggregationQuery, ColumnRequest, FilterExpression, Pagination, Sort};

/// Identifies one cached result: the table's data version plus a
/// fingerprint of the request and the statements generated for it.
///
/// The statements carry the resolved schema definitions, so editing a
/// formula or aggregation changes the key even when the version does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub table_version: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(
        table_version: &str,
        query: &AggregationQuery,
        statements: &[String],
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            table_version: table_version.to_string(),
            fingerprint: fingerprint(query, statements)?,
        })
    }

    /// Single-string form used by persistent backends.
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.table_version, self.fingerprint)
    }
}

/// The query fields that shape a result. `bypass_cache` is left out.
#[derive(Serialize)]
struct Canonical<'q> {
    table: &'q str,
    columns: &'q [ColumnRequest],
    arguments: &'q Bindings,
    where_filter: Option<&'q FilterExpression>,
    having_filter: Option<&'q FilterExpression>,
    sorting: &'q [Sort],
    pagination: Option<&'q Pagination>,
    statements: &'q [String],
}

/// SHA-256 over the canonical JSON form of `query` and its statements.
///
/// Argument bindings are ordered maps, so their order in the request does
/// not matter; column order does.
pub fn fingerprint(query: &AggregationQuery, statements: &[String]) -> Result<String, serde_json::Error> {
    compute_hash(&Canonical {
        table: &query.table,
        columns: &query.columns,
        arguments: &query.arguments,
        where_filter: query.where_filter.as_ref(),
        having_filter: query.having_filter.as_ref(),
        sorting: &query.sorting,
        pagination: query.pagination.as_ref(),
        statements,
    })
}
