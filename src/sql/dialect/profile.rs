//! Static syntax profiles, one per built-in dialect.

/// Identifier quoting style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    /// `"name"`
    Double,
    /// `` `name` ``
    Backtick,
    /// `[name]`
    Bracket,
}

impl Quoting {
    /// Quote `ident`, doubling any embedded closing character.
    pub fn quote(self, ident: &str) -> String {
        let (open, close) = match self {
            Quoting::Double => ('"', '"'),
            Quoting::Backtick => ('`', '`'),
            Quoting::Bracket => ('[', ']'),
        };
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(open);
        for c in ident.chars() {
            if c == close {
                out.push(close);
            }
            out.push(c);
        }
        out.push(close);
        out
    }
}

/// How a row window is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `LIMIT n`. A non-zero offset cannot be expressed at all.
    LimitOnly,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch { needs_order_by: bool },
}

/// Which family of truncation expression the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    /// `DATE_TRUNC('unit', expr)`
    DateTrunc,
    /// `TIMESTAMP_TRUNC(expr, UNIT)`
    TimestampTrunc,
    /// `DATETRUNC(unit, expr)`
    SqlServer,
    /// `TRUNC(expr, 'fmt')`
    Oracle,
    /// `DATE_FORMAT` plus date arithmetic.
    MySql,
    /// `STRFTIME` producing ISO-8601 text.
    Sqlite,
}

/// A dialect described entirely by data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub name: &'static str,
    pub quoting: Quoting,
    /// Booleans written as `1`/`0` instead of `true`/`false`.
    pub numeric_bools: bool,
    /// Non-ASCII string literals take the `N'...'` prefix.
    pub unicode_prefix: bool,
    /// `FROM t AS a` rather than `FROM t a`.
    pub table_alias_keyword: bool,
    /// Backslash is an escape inside string literals.
    pub backslash_escapes: bool,
    pub like_escape: Option<char>,
    pub truncation: Truncation,
    pub paging: Paging,
}

impl Profile {
    pub const ANSI: Profile = Profile {
        name: "ansi",
        quoting: Quoting::Double,
        numeric_bools: false,
        unicode_prefix: false,
        table_alias_keyword: true,
        backslash_escapes: false,
        like_escape: Some('!'),
        truncation: Truncation::DateTrunc,
        paging: Paging::LimitOffset,
    };
}

pub(super) const DUCKDB: Profile = Profile {
    name: "duckdb",
    ..Profile::ANSI
};

pub(super) const POSTGRES: Profile = Profile {
    name: "postgres",
    ..Profile::ANSI
};

pub(super) const SNOWFLAKE: Profile = Profile {
    name: "snowflake",
    backslash_escapes: true,
    ..Profile::ANSI
};

pub(super) const MYSQL: Profile = Profile {
    name: "mysql",
    quoting: Quoting::Backtick,
    numeric_bools: true,
    backslash_escapes: true,
    truncation: Truncation::MySql,
    ..Profile::ANSI
};

pub(super) const TSQL: Profile = Profile {
    name: "tsql",
    quoting: Quoting::Bracket,
    numeric_bools: true,
    unicode_prefix: true,
    truncation: Truncation::SqlServer,
    paging: Paging::OffsetFetch {
        needs_order_by: true,
    },
    ..Profile::ANSI
};

pub(super) const BIGQUERY: Profile = Profile {
    name: "bigquery",
    quoting: Quoting::Backtick,
    backslash_escapes: true,
    // LIKE has no ESCAPE clause; backslash is the fixed escape.
    like_escape: None,
    truncation: Truncation::TimestampTrunc,
    ..Profile::ANSI
};

// Older Presto releases have no OFFSET clause.
pub(super) const PRESTO: Profile = Profile {
    name: "presto",
    paging: Paging::LimitOnly,
    ..Profile::ANSI
};

pub(super) const SQLITE: Profile = Profile {
    name: "sqlite",
    numeric_bools: true,
    truncation: Truncation::Sqlite,
    ..Profile::ANSI
};

pub(super) const ORACLE: Profile = Profile {
    name: "oracle",
    numeric_bools: true,
    table_alias_keyword: false,
    truncation: Truncation::Oracle,
    paging: Paging::OffsetFetch {
        needs_order_by: false,
    },
    ..Profile::ANSI
};
