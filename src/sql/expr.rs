//! Expression trees for predicates and select items.
//!
//! Resolved schema formulas enter the tree as [`Expr::Raw`]. Values from the
//! client only ever arrive as [`Literal`]s, so the dialect quotes them.

use super::dialect::SqlDialect;
use super::token::{Keyword, Literal, Render, TokenStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Junction {
    All,
    Any,
}

/// Where the text of a LIKE match has to appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeMatch {
    Prefix,
    Suffix,
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Output column of the current level, optionally qualified.
    Column {
        qualifier: Option<String>,
        name: String,
    },
    Literal(Literal),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    /// Terms joined by AND or OR. With more than one term each is
    /// parenthesized; with none the junction is a constant.
    Junction {
        junction: Junction,
        terms: Vec<Expr>,
    },
    Not(Box<Expr>),
    InList {
        expr: Box<Expr>,
        values: Vec<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    /// Match on literal `text`; wildcards in it are escaped when rendered.
    Like {
        expr: Box<Expr>,
        text: String,
        position: LikeMatch,
    },
    /// `COUNT(*)`
    CountAll,
    Raw(String),
}

impl Expr {
    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    pub fn column(name: &str) -> Self {
        Expr::Column {
            qualifier: None,
            name: name.to_string(),
        }
    }

    pub fn qualified(qualifier: &str, name: &str) -> Self {
        Expr::Column {
            qualifier: Some(qualifier.to_string()),
            name: name.to_string(),
        }
    }

    pub fn literal(literal: Literal) -> Self {
        Expr::Literal(literal)
    }

    pub fn all(terms: Vec<Expr>) -> Self {
        Expr::Junction {
            junction: Junction::All,
            terms,
        }
    }

    pub fn any(terms: Vec<Expr>) -> Self {
        Expr::Junction {
            junction: Junction::Any,
            terms,
        }
    }

    pub fn compare(self, op: CompareOp, right: Expr) -> Self {
        Expr::Compare {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    /// AND `other` onto this expression, flattening an existing conjunction.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::Junction {
                junction: Junction::All,
                mut terms,
            } => {
                terms.push(other);
                Expr::all(terms)
            }
            first => Expr::all(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn in_list(self, values: Vec<Expr>, negated: bool) -> Self {
        Expr::InList {
            expr: Box::new(self),
            values,
            negated,
        }
    }

    pub fn between(self, low: Expr, high: Expr) -> Self {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low),
            high: Box::new(high),
        }
    }

    pub fn is_null(self, negated: bool) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated,
        }
    }

    pub fn like(self, text: impl Into<String>, position: LikeMatch) -> Self {
        Expr::Like {
            expr: Box::new(self),
            text: text.into(),
            position,
        }
    }
}

impl Render for Expr {
    fn render(&self, dialect: &dyn SqlDialect, out: &mut TokenStream) {
        match self {
            Expr::Column { qualifier, name } => {
                if let Some(q) = qualifier {
                    out.ident(q).symbol(".");
                }
                out.ident(name);
            }
            Expr::Literal(lit) => {
                out.literal(lit.clone());
            }
            Expr::Compare { left, op, right } => {
                left.render(dialect, out);
                out.space().symbol(op.symbol()).space();
                right.render(dialect, out);
            }
            Expr::Junction { junction, terms } => match terms.as_slice() {
                [] => {
                    out.raw(match junction {
                        Junction::All => "1 = 1",
                        Junction::Any => "1 = 0",
                    });
                }
                [only] => only.render(dialect, out),
                _ => {
                    let keyword = match junction {
                        Junction::All => Keyword::And,
                        Junction::Any => Keyword::Or,
                    };
                    for (i, term) in terms.iter().enumerate() {
                        if i > 0 {
                            out.space().keyword(keyword).space();
                        }
                        out.symbol("(");
                        term.render(dialect, out);
                        out.symbol(")");
                    }
                }
            },
            Expr::Not(inner) => {
                out.keyword(Keyword::Not).space().symbol("(");
                inner.render(dialect, out);
                out.symbol(")");
            }
            // An empty list is invalid SQL.
            Expr::InList { values, negated, .. } if values.is_empty() => {
                out.raw(if *negated { "1 = 1" } else { "1 = 0" });
            }
            Expr::InList {
                expr,
                values,
                negated,
            } => {
                expr.render(dialect, out);
                if *negated {
                    out.space().keyword(Keyword::Not);
                }
                out.space().keyword(Keyword::In).space().symbol("(");
                out.comma_separated(values, dialect);
                out.symbol(")");
            }
            Expr::Between { expr, low, high } => {
                expr.render(dialect, out);
                out.space().keyword(Keyword::Between).space();
                low.render(dialect, out);
                out.space().keyword(Keyword::And).space();
                high.render(dialect, out);
            }
            Expr::IsNull { expr, negated } => {
                expr.render(dialect, out);
                out.space().keyword(if *negated {
                    Keyword::IsNotNull
                } else {
                    Keyword::IsNull
                });
            }
            Expr::Like {
                expr,
                text,
                position,
            } => {
                let escape = dialect.like_escape();
                let escaped = escape_like(text, escape.unwrap_or('\\'));
                let pattern = match position {
                    LikeMatch::Prefix => format!("{}%", escaped),
                    LikeMatch::Suffix => format!("%{}", escaped),
                    LikeMatch::Contains => format!("%{}%", escaped),
                };
                expr.render(dialect, out);
                out.space()
                    .keyword(Keyword::Like)
                    .space()
                    .literal(Literal::Text(pattern));
                if let Some(c) = escape {
                    out.space()
                        .keyword(Keyword::Escape)
                        .space()
                        .literal(Literal::Text(c.to_string()));
                }
            }
            Expr::CountAll => {
                out.raw("COUNT(*)");
            }
            Expr::Raw(sql) => {
                out.raw(sql);
            }
        }
    }
}

fn escape_like(text: &str, escape: char) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '%' || c == '_' || c == escape {
            out.push(escape);
        }
        out.push(c);
    }
    out
}
