//! Target SQL dialects.
//!
//! Everything the builder and generator need to know about an engine goes
//! through [`SqlDialect`]. The defaults follow ANSI SQL, so a new engine
//! only has to say how it quotes identifiers and truncates timestamps.
//!
//! The built-in engines are data: each [`Dialect`] variant resolves to a
//! static [`Profile`], and `Profile` itself implements the trait. A custom
//! engine can either implement `SqlDialect` directly or start from
//! [`Profile::ANSI`] with struct update syntax.
//!
//! ```ignore
//! use aggplan::sql::{Dialect, SqlDialect};
//!
//! assert_eq!(Dialect::TSql.quote_identifier("highScore"), "[highScore]");
//! assert!(!Dialect::Presto.supports_offset_pagination());
//! ```

mod profile;
mod truncate;

pub use profile::{Paging, Profile, Quoting, Truncation};
pub use truncate::truncate;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::token::{Keyword, Literal, TokenStream};
use crate::model::TimeGrain;

/// How SQL constructs are written for one engine.
pub trait SqlDialect: fmt::Debug + Send + Sync {
    /// Lowercase name used in logs and error messages.
    fn name(&self) -> &str;

    fn quote_identifier(&self, ident: &str) -> String;

    /// Single-quoted string literal with `''` escaping.
    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    fn format_bool(&self, b: bool) -> &'static str {
        if b {
            "true"
        } else {
            "false"
        }
    }

    /// Whether `AS` goes between a table (or derived table) and its alias.
    fn table_alias_keyword(&self) -> bool {
        true
    }

    /// Distinct count over an already resolved expression.
    fn count_distinct(&self, expr: &str) -> String {
        format!("COUNT(DISTINCT {})", expr)
    }

    /// Truncate a resolved temporal expression to `grain`.
    fn date_truncate(&self, grain: TimeGrain, expr: &str) -> String;

    /// Character written in an `ESCAPE` clause after LIKE patterns. `None`
    /// means the engine has no such clause and escapes with a backslash.
    fn like_escape(&self) -> Option<char> {
        Some('!')
    }

    /// Whether a non-zero OFFSET can be expressed.
    fn supports_offset_pagination(&self) -> bool {
        true
    }

    /// Whether a row window is a syntax error without ORDER BY.
    fn requires_order_by_for_paging(&self) -> bool {
        false
    }

    /// Write the row window clause. A zero offset is left out.
    fn write_page(&self, limit: u64, offset: u64, out: &mut TokenStream) {
        out.keyword(Keyword::Limit).space().literal(count(limit));
        if offset > 0 && self.supports_offset_pagination() {
            out.space().keyword(Keyword::Offset).space().literal(count(offset));
        }
    }
}

impl SqlDialect for Profile {
    fn name(&self) -> &str {
        self.name
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.quoting.quote(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        let mut body = s.replace('\'', "''");
        if self.backslash_escapes {
            body = body.replace('\\', "\\\\");
        }
        if self.unicode_prefix && !s.is_ascii() {
            format!("N'{}'", body)
        } else {
            format!("'{}'", body)
        }
    }

    fn format_bool(&self, b: bool) -> &'static str {
        match (self.numeric_bools, b) {
            (true, true) => "1",
            (true, false) => "0",
            (false, true) => "true",
            (false, false) => "false",
        }
    }

    fn table_alias_keyword(&self) -> bool {
        self.table_alias_keyword
    }

    fn date_truncate(&self, grain: TimeGrain, expr: &str) -> String {
        truncate(self.truncation, grain, expr)
    }

    fn like_escape(&self) -> Option<char> {
        self.like_escape
    }

    fn supports_offset_pagination(&self) -> bool {
        self.paging != Paging::LimitOnly
    }

    fn requires_order_by_for_paging(&self) -> bool {
        matches!(
            self.paging,
            Paging::OffsetFetch {
                needs_order_by: true
            }
        )
    }

    fn write_page(&self, limit: u64, offset: u64, out: &mut TokenStream) {
        match self.paging {
            Paging::LimitOffset | Paging::LimitOnly => {
                out.keyword(Keyword::Limit).space().literal(count(limit));
                if offset > 0 && self.supports_offset_pagination() {
                    out.space().keyword(Keyword::Offset).space().literal(count(offset));
                }
            }
            Paging::OffsetFetch { .. } => {
                out.keyword(Keyword::Offset)
                    .space()
                    .literal(count(offset))
                    .space()
                    .keyword(Keyword::Rows)
                    .space()
                    .keyword(Keyword::FetchNext)
                    .space()
                    .literal(count(limit))
                    .space()
                    .keyword(Keyword::Rows)
                    .space()
                    .keyword(Keyword::Only);
            }
        }
    }
}

fn count(n: u64) -> Literal {
    Literal::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Built-in dialects, selectable by name in settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    DuckDb,
    Postgres,
    MySql,
    TSql,
    Snowflake,
    BigQuery,
    Presto,
    Sqlite,
    Oracle,
}

impl Dialect {
    pub const ALL: [Dialect; 9] = [
        Dialect::DuckDb,
        Dialect::Postgres,
        Dialect::MySql,
        Dialect::TSql,
        Dialect::Snowflake,
        Dialect::BigQuery,
        Dialect::Presto,
        Dialect::Sqlite,
        Dialect::Oracle,
    ];

    pub fn profile(self) -> &'static Profile {
        match self {
            Dialect::DuckDb => &profile::DUCKDB,
            Dialect::Postgres => &profile::POSTGRES,
            Dialect::MySql => &profile::MYSQL,
            Dialect::TSql => &profile::TSQL,
            Dialect::Snowflake => &profile::SNOWFLAKE,
            Dialect::BigQuery => &profile::BIGQUERY,
            Dialect::Presto => &profile::PRESTO,
            Dialect::Sqlite => &profile::SQLITE,
            Dialect::Oracle => &profile::ORACLE,
        }
    }
}

impl SqlDialect for Dialect {
    fn name(&self) -> &str {
        self.profile().name
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.profile().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.profile().quote_string(s)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        self.profile().format_bool(b)
    }

    fn table_alias_keyword(&self) -> bool {
        self.profile().table_alias_keyword
    }

    fn count_distinct(&self, expr: &str) -> String {
        self.profile().count_distinct(expr)
    }

    fn date_truncate(&self, grain: TimeGrain, expr: &str) -> String {
        self.profile().date_truncate(grain, expr)
    }

    fn like_escape(&self) -> Option<char> {
        self.profile().like_escape
    }

    fn supports_offset_pagination(&self) -> bool {
        self.profile().supports_offset_pagination()
    }

    fn requires_order_by_for_paging(&self) -> bool {
        self.profile().requires_order_by_for_paging()
    }

    fn write_page(&self, limit: u64, offset: u64, out: &mut TokenStream) {
        self.profile().write_page(limit, offset, out)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a dialect name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown SQL dialect: {0}")]
pub struct UnknownDialect(pub String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let alias = match lower.as_str() {
            "postgresql" => Some(Dialect::Postgres),
            "mssql" | "sqlserver" => Some(Dialect::TSql),
            "trino" => Some(Dialect::Presto),
            _ => None,
        };
        Dialect::ALL
            .into_iter()
            .find(|d| d.name() == lower)
            .or(alias)
            .ok_or_else(|| UnknownDialect(s.to_string()))
    }
}
