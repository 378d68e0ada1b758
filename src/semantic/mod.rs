//! Semantic layer: client queries, reference resolution and query planning.
//!
//! ```text
//! AggregationQuery ──► planner::validate ──► planner::QueryPlanBuilder ──► QueryPlan
//!                              │                        │
//!                              └──────► resolver ◄───────┘
//! ```

pub mod error;
pub mod planner;
pub mod query;
pub mod resolver;

pub use error::{QueryClause, SemanticError, SemanticResult};
