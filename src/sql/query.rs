//! SELECT statements, one per plan level.
//!
//! Only the shape an aggregation level needs is modelled: an aliased select
//! list, one source (table, nested level or schema SQL), joins, WHERE,
//! GROUP BY, HAVING, ORDER BY and a row window.

use super::dialect::{Dialect, SqlDialect};
use super::expr::Expr;
use super::token::{Keyword, Render, Token, TokenStream};
use crate::semantic::query::SortDirection;

/// A select-list entry. Generated columns always carry their output name.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: String,
}

impl SelectItem {
    pub fn new(expr: Expr, alias: &str) -> Self {
        Self {
            expr,
            alias: alias.to_string(),
        }
    }
}

impl Render for SelectItem {
    fn render(&self, dialect: &dyn SqlDialect, out: &mut TokenStream) {
        self.expr.render(dialect, out);
        out.space().keyword(Keyword::As).space().ident(&self.alias);
    }
}

/// What a level reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table {
        schema: Option<String>,
        name: String,
        alias: String,
    },
    /// The level below, as a derived table.
    Derived { query: Box<Query>, alias: String },
    /// Schema-declared SQL standing in for a table.
    Raw { sql: String, alias: String },
}

impl Source {
    pub fn table(schema: Option<&str>, name: &str, alias: &str) -> Self {
        Source::Table {
            schema: schema.map(str::to_string),
            name: name.to_string(),
            alias: alias.to_string(),
        }
    }

    pub fn derived(query: Query, alias: &str) -> Self {
        Source::Derived {
            query: Box::new(query),
            alias: alias.to_string(),
        }
    }

    pub fn raw(sql: &str, alias: &str) -> Self {
        Source::Raw {
            sql: sql.to_string(),
            alias: alias.to_string(),
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            Source::Table { alias, .. } | Source::Derived { alias, .. } | Source::Raw { alias, .. } => alias,
        }
    }
}

impl Render for Source {
    fn render(&self, dialect: &dyn SqlDialect, out: &mut TokenStream) {
        match self {
            Source::Table { schema, name, .. } => {
                let path = schema.iter().cloned().chain([name.clone()]).collect();
                out.push(Token::Path(path));
            }
            Source::Derived { query, .. } => {
                out.symbol("(").newline();
                query.render(dialect, out);
                out.newline().symbol(")");
            }
            Source::Raw { sql, .. } => {
                out.symbol("(").raw(sql).symbol(")");
            }
        }
        out.space();
        if dialect.table_alias_keyword() {
            out.keyword(Keyword::As).space();
        }
        out.ident(self.alias());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub source: Source,
    /// Ignored for cross joins.
    pub on: Option<Expr>,
}

impl Render for JoinClause {
    fn render(&self, dialect: &dyn SqlDialect, out: &mut TokenStream) {
        out.keyword(match self.join_type {
            JoinType::Inner => Keyword::InnerJoin,
            JoinType::Left => Keyword::LeftJoin,
            JoinType::Full => Keyword::FullJoin,
            JoinType::Cross => Keyword::CrossJoin,
        })
        .space();
        self.source.render(dialect, out);
        if let (Some(on), false) = (&self.on, self.join_type == JoinType::Cross) {
            out.space().keyword(Keyword::On).space();
            on.render(dialect, out);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub direction: SortDirection,
}

impl Render for OrderItem {
    fn render(&self, dialect: &dyn SqlDialect, out: &mut TokenStream) {
        self.expr.render(dialect, out);
        out.space().keyword(match self.direction {
            SortDirection::Asc => Keyword::Asc,
            SortDirection::Desc => Keyword::Desc,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[must_use = "a query does nothing until rendered"]
pub struct Query {
    pub items: Vec<SelectItem>,
    pub distinct: bool,
    pub source: Option<Source>,
    pub joins: Vec<JoinClause>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
    pub page: Option<Page>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, items: Vec<SelectItem>) -> Self {
        self.items = items;
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn from(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn join(mut self, join_type: JoinType, source: Source, on: Option<Expr>) -> Self {
        self.joins.push(JoinClause {
            join_type,
            source,
            on,
        });
        self
    }

    /// ANDed onto any existing WHERE condition.
    pub fn filter(mut self, condition: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn group_by(mut self, exprs: Vec<Expr>) -> Self {
        self.group_by = exprs;
        self
    }

    pub fn having(mut self, condition: Expr) -> Self {
        self.having = Some(condition);
        self
    }

    pub fn order_by(mut self, items: Vec<OrderItem>) -> Self {
        self.order_by = items;
        self
    }

    pub fn page(mut self, limit: u64, offset: u64) -> Self {
        self.page = Some(Page { limit, offset });
        self
    }

    /// This query without ORDER BY and row window, for counting every row.
    pub fn unpaged(&self) -> Self {
        Self {
            order_by: Vec::new(),
            page: None,
            ..self.clone()
        }
    }
}

impl Render for Query {
    fn render(&self, dialect: &dyn SqlDialect, out: &mut TokenStream) {
        out.keyword(Keyword::Select);
        if self.distinct {
            out.space().keyword(Keyword::Distinct);
        }
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                out.symbol(",");
            }
            out.newline().indent(1);
            item.render(dialect, out);
        }

        if let Some(source) = &self.source {
            out.newline().keyword(Keyword::From).space();
            source.render(dialect, out);
        }
        for join in &self.joins {
            out.newline();
            join.render(dialect, out);
        }
        if let Some(filter) = &self.filter {
            out.newline().keyword(Keyword::Where).space();
            filter.render(dialect, out);
        }
        if !self.group_by.is_empty() {
            out.newline().keyword(Keyword::GroupBy).space();
            out.comma_separated(&self.group_by, dialect);
        }
        if let Some(having) = &self.having {
            out.newline().keyword(Keyword::Having).space();
            having.render(dialect, out);
        }

        if !self.order_by.is_empty() {
            out.newline().keyword(Keyword::OrderBy).space();
            out.comma_separated(&self.order_by, dialect);
        } else if self.page.is_some() && dialect.requires_order_by_for_paging() {
            // Row order is unspecified here.
            out.newline().keyword(Keyword::OrderBy).space().raw("(SELECT NULL)");
        }

        if let Some(page) = &self.page {
            out.newline();
            dialect.write_page(page.limit, page.offset, out);
        }
    }
}

impl std::fmt::Display for Query {
    /// Renders with the default dialect.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql(&Dialect::default()))
    }
}
