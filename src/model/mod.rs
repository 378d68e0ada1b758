//! Schema model: tables, columns, joins and their declared arguments.
//!
//! Types here are plain data. They are built once per configuration load
//! (JSON/TOML document or builder methods) and never mutated afterwards.

pub mod argument;
pub mod column;
pub mod grain;
pub mod join;
pub mod required;
pub mod schema;
pub mod table;
pub mod types;

pub use argument::{bind, ArgumentDef, Bindings};
pub use column::{Aggregation, Column, ColumnKind, Nesting};
pub use grain::TimeGrain;
pub use join::{Join, JoinKind};
pub use required::RequiredFilter;
pub use schema::Schema;
pub use table::{Table, TableSource, VersionSource};
pub use types::{Value, ValueType};
