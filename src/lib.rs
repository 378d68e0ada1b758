//! # aggplan
//!
//! Compiles analytic queries over logical tables to multi-dialect SQL and
//! executes them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Schema (logical tables)                  │
//! │  (metrics, dimensions, time dimensions, joins, args)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!   AggregationQuery ──►   ▼ [semantic::planner]
//! ┌─────────────────────────────────────────────────────────┐
//! │                      QueryPlan                           │
//! │        (nested levels; resolved via the registry)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [sql::generator + resolver]
//! ┌─────────────────────────────────────────────────────────┐
//! │              SQL (main + page-total query)               │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [executor + cache]
//! ┌─────────────────────────────────────────────────────────┐
//! │                     QueryResult                          │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod model;
pub mod semantic;
pub mod sql;

pub use error::{Error, Result};
pub use executor::{CancellationToken, QueryEngine, QueryResult, Transaction};
pub use model::Schema;
pub use semantic::planner::{QueryPlan, QueryPlanBuilder, ResolverRegistry};
pub use semantic::query::AggregationQuery;
pub use sql::dialect;
pub use sql::expr;
pub use sql::query;
pub use sql::token;
