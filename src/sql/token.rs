//! Tokens the SQL builder renders into.
//!
//! Builders never format SQL text themselves. They push tokens, and the
//! stream quotes identifiers and literals for the target dialect when it is
//! serialized.

use std::fmt::Write as _;

use super::dialect::SqlDialect;

/// Reserved words, including the multi-word ones emitted as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Select,
    Distinct,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    As,
    On,
    InnerJoin,
    LeftJoin,
    FullJoin,
    CrossJoin,
    And,
    Or,
    Not,
    In,
    Between,
    Like,
    Escape,
    IsNull,
    IsNotNull,
    Null,
    Asc,
    Desc,
    Limit,
    Offset,
    Rows,
    FetchNext,
    Only,
}

impl Keyword {
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Select => "SELECT",
            Keyword::Distinct => "DISTINCT",
            Keyword::From => "FROM",
            Keyword::Where => "WHERE",
            Keyword::GroupBy => "GROUP BY",
            Keyword::Having => "HAVING",
            Keyword::OrderBy => "ORDER BY",
            Keyword::As => "AS",
            Keyword::On => "ON",
            Keyword::InnerJoin => "INNER JOIN",
            Keyword::LeftJoin => "LEFT OUTER JOIN",
            Keyword::FullJoin => "FULL OUTER JOIN",
            Keyword::CrossJoin => "CROSS JOIN",
            Keyword::And => "AND",
            Keyword::Or => "OR",
            Keyword::Not => "NOT",
            Keyword::In => "IN",
            Keyword::Between => "BETWEEN",
            Keyword::Like => "LIKE",
            Keyword::Escape => "ESCAPE",
            Keyword::IsNull => "IS NULL",
            Keyword::IsNotNull => "IS NOT NULL",
            Keyword::Null => "NULL",
            Keyword::Asc => "ASC",
            Keyword::Desc => "DESC",
            Keyword::Limit => "LIMIT",
            Keyword::Offset => "OFFSET",
            Keyword::Rows => "ROWS",
            Keyword::FetchNext => "FETCH NEXT",
            Keyword::Only => "ONLY",
        }
    }
}

/// A client-supplied or generated constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Null,
}

impl Literal {
    fn write(&self, dialect: &dyn SqlDialect, out: &mut String) {
        match self {
            Literal::Int(n) => {
                let _ = write!(out, "{}", n);
            }
            // Non-finite filter values are rejected before they get here.
            Literal::Float(f) if !f.is_finite() => out.push_str("NULL"),
            Literal::Float(f) => out.push_str(ryu::Buffer::new().format(*f)),
            Literal::Text(s) => out.push_str(&dialect.quote_string(s)),
            Literal::Bool(b) => out.push_str(dialect.format_bool(*b)),
            Literal::Null => out.push_str("NULL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    /// Punctuation or an operator, written as is.
    Symbol(&'static str),
    Space,
    Newline,
    Indent(usize),
    /// Identifier quoted for the dialect.
    Ident(String),
    /// Dotted name, each part quoted separately.
    Path(Vec<String>),
    Literal(Literal),
    /// Resolved schema SQL, written without escaping. Client input never
    /// travels as `Raw`.
    Raw(String),
}

impl Token {
    fn write(&self, dialect: &dyn SqlDialect, out: &mut String) {
        match self {
            Token::Keyword(k) => out.push_str(k.as_str()),
            Token::Symbol(s) => out.push_str(s),
            Token::Space => out.push(' '),
            Token::Newline => out.push('\n'),
            Token::Indent(n) => out.extend(std::iter::repeat("  ").take(*n)),
            Token::Ident(name) => out.push_str(&dialect.quote_identifier(name)),
            Token::Path(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        out.push('.');
                    }
                    out.push_str(&dialect.quote_identifier(part));
                }
            }
            Token::Literal(lit) => lit.write(dialect, out),
            Token::Raw(sql) => out.push_str(sql),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    pub fn keyword(&mut self, keyword: Keyword) -> &mut Self {
        self.push(Token::Keyword(keyword))
    }

    pub fn symbol(&mut self, symbol: &'static str) -> &mut Self {
        self.push(Token::Symbol(symbol))
    }

    pub fn ident(&mut self, name: &str) -> &mut Self {
        self.push(Token::Ident(name.to_string()))
    }

    pub fn literal(&mut self, literal: Literal) -> &mut Self {
        self.push(Token::Literal(literal))
    }

    pub fn raw(&mut self, sql: &str) -> &mut Self {
        self.push(Token::Raw(sql.to_string()))
    }

    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }

    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }

    pub fn indent(&mut self, depth: usize) -> &mut Self {
        self.push(Token::Indent(depth))
    }

    /// Render each item, writing `", "` between them.
    pub fn comma_separated<T: Render>(&mut self, items: &[T], dialect: &dyn SqlDialect) -> &mut Self {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.symbol(",").space();
            }
            item.render(dialect, self);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn serialize(&self, dialect: &dyn SqlDialect) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            token.write(dialect, &mut out);
        }
        out
    }
}

/// Anything that renders itself into a token stream.
pub trait Render {
    fn render(&self, dialect: &dyn SqlDialect, out: &mut TokenStream);

    fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        let mut ts = TokenStream::new();
        self.render(dialect, &mut ts);
        ts.serialize(dialect)
    }
}
