//! SQL generation.
//!
//! A small statement builder plus the generator that turns query plans into
//! dialect-specific statements.
//!
//! - [`generator`] - QueryPlan → SQL statements
//! - [`query`] - one SELECT per plan level
//! - [`expr`] - predicate and select-item expressions
//! - [`token`] - tokens and the [`Render`] trait
//! - [`dialect`] - per-engine syntax

pub mod dialect;
pub mod expr;
pub mod generator;
pub mod query;
pub mod token;


pub use dialect::{Dialect, Profile, SqlDialect, UnknownDialect};
pub use expr::{CompareOp, Expr, Junction, LikeMatch};
pub use generator::{GeneratedSql, SqlGenerator};
pub use query::{JoinClause, JoinType, OrderItem, Page, Query, SelectItem, Source};
pub use token::{Keyword, Literal, Render, Token, TokenStream};
