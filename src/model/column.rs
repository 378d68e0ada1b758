//! Columns of a logical table.

use serde::{Deserialize, Serialize};

use super::argument::ArgumentDef;
use super::grain::TimeGrain;
use super::required::RequiredFilter;
use super::types::ValueType;

/// Role of a column in an aggregation query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Metric,
    Dimension,
    TimeDimension,
}

impl ColumnKind {
    pub fn is_metric(&self) -> bool {
        matches!(self, ColumnKind::Metric)
    }
}

/// Aggregation wrapped around a metric's resolved formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Count,
    CountDistinct,
    Min,
    Max,
    Avg,
}

impl Aggregation {
    /// SQL function name for the plain (non-distinct) aggregations.
    pub fn function_name(&self) -> &'static str {
        match self {
            Aggregation::Sum => "SUM",
            Aggregation::Count | Aggregation::CountDistinct => "COUNT",
            Aggregation::Min => "MIN",
            Aggregation::Max => "MAX",
            Aggregation::Avg => "AVG",
        }
    }
}

/// How a metric is planned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nesting {
    /// Projected straight from the table.
    #[default]
    Direct,
    /// Referenced metrics are computed per `grain` of `time_dimension` first,
    /// then the formula is evaluated over those rows.
    PerGrain {
        time_dimension: String,
        grain: TimeGrain,
    },
}

/// A column of a logical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub value_type: ValueType,
    /// Template containing `{{...}}` references.
    pub formula: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
    /// Supported grains; only meaningful for time dimensions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grains: Vec<TimeGrain>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<ArgumentDef>,
    #[serde(default)]
    pub nesting: Nesting,
    /// Checked whenever this column is selected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_filters: Vec<RequiredFilter>,
}

impl Column {
    fn new(name: &str, kind: ColumnKind, value_type: ValueType, formula: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            value_type,
            formula: formula.into(),
            aggregation: None,
            grains: Vec::new(),
            arguments: Vec::new(),
            nesting: Nesting::Direct,
            required_filters: Vec::new(),
        }
    }

    pub fn metric(name: &str, value_type: ValueType, formula: &str) -> Self {
        Self::new(name, ColumnKind::Metric, value_type, formula)
    }

    pub fn dimension(name: &str, value_type: ValueType, formula: &str) -> Self {
        Self::new(name, ColumnKind::Dimension, value_type, formula)
    }

    pub fn time_dimension(name: &str, formula: &str, grains: &[TimeGrain]) -> Self {
        let mut column = Self::new(name, ColumnKind::TimeDimension, ValueType::Time, formula);
        column.grains = grains.to_vec();
        column
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn with_argument(mut self, argument: ArgumentDef) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn with_required_filter(mut self, filter: RequiredFilter) -> Self {
        self.required_filters.push(filter);
        self
    }

    pub fn per_grain(mut self, time_dimension: &str, grain: TimeGrain) -> Self {
        self.nesting = Nesting::PerGrain {
            time_dimension: time_dimension.into(),
            grain,
        };
        self
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentDef> {
        self.arguments.iter().find(|a| a.name == name)
    }

    /// Whether `grain` may be requested for this column.
    pub fn supports_grain(&self, grain: TimeGrain) -> bool {
        self.kind == ColumnKind::TimeDimension && (self.grains.is_empty() || self.grains.contains(&grain))
    }
}
