//! Client-side aggregation queries.

pub mod filter;

pub use filter::{FilterExpression, Operator, Path, PathElement, Predicate};

use serde::{Deserialize, Serialize};

use crate::model::{Bindings, TimeGrain};

/// A requested column: metric, dimension or time dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Bindings::is_empty")]
    pub arguments: Bindings,
    /// Only valid for time dimensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grain: Option<TimeGrain>,
}

impl ColumnRequest {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: Bindings::new(),
            grain: None,
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_argument(mut self, name: &str, value: &str) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn with_grain(mut self, grain: TimeGrain) -> Self {
        self.grain = Some(grain);
        self
    }

    /// Output name: the alias, or the column name.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Sort on a selected column, by output name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: u64,
    pub limit: u64,
    #[serde(default)]
    pub return_page_totals: bool,
}

/// An analytic query against one logical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationQuery {
    pub table: String,
    pub columns: Vec<ColumnRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub where_filter: Option<FilterExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having_filter: Option<FilterExpression>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sorting: Vec<Sort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    /// Table-level arguments (`$$table.args.X`).
    #[serde(default, skip_serializing_if = "Bindings::is_empty")]
    pub arguments: Bindings,
    #[serde(default)]
    pub bypass_cache: bool,
}

impl AggregationQuery {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            where_filter: None,
            having_filter: None,
            sorting: Vec::new(),
            pagination: None,
            arguments: Bindings::new(),
            bypass_cache: false,
        }
    }

    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn select(mut self, column: ColumnRequest) -> Self {
        self.columns.push(column);
        self
    }

    pub fn column(self, name: &str) -> Self {
        self.select(ColumnRequest::new(name))
    }

    pub fn time_dimension(self, name: &str, grain: TimeGrain) -> Self {
        self.select(ColumnRequest::new(name).with_grain(grain))
    }

    /// Add a WHERE filter (ANDed with any existing one).
    pub fn filter(mut self, filter: FilterExpression) -> Self {
        self.where_filter = Some(match self.where_filter {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn having(mut self, filter: FilterExpression) -> Self {
        self.having_filter = Some(match self.having_filter {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn sort_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.sorting.push(Sort {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn paginate(mut self, offset: u64, limit: u64) -> Self {
        let totals = self.pagination.is_some_and(|p| p.return_page_totals);
        self.pagination = Some(Pagination {
            offset,
            limit,
            return_page_totals: totals,
        });
        self
    }

    /// Request page totals; pagination must be set first.
    pub fn with_page_totals(mut self) -> Self {
        if let Some(p) = self.pagination.as_mut() {
            p.return_page_totals = true;
        }
        self
    }

    pub fn with_argument(mut self, name: &str, value: &str) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }
}
