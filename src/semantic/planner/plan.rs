//! Query plan tree.

use serde::Serialize;

use crate::model::{Bindings, ColumnKind, TimeGrain, ValueType};
use crate::semantic::query::{FilterExpression, Pagination, Sort};

/// What a projection evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionTemplate {
    /// The named schema column, resolved in the level's table scope.
    Column,
    /// A template over the level's scope: the table for innermost levels,
    /// the nested query's outputs otherwise.
    Expression(String),
}

/// One output column of a plan level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Projection {
    /// Schema column this projection derives from.
    pub name: String,
    /// Output name at this level.
    pub alias: String,
    pub kind: ColumnKind,
    pub value_type: ValueType,
    pub template: ProjectionTemplate,
    /// Complete argument bindings, defaults applied.
    pub arguments: Bindings,
    pub grain: Option<TimeGrain>,
}

/// Identity of a dimension for merge comparisons.
#[derive(Debug, Serialize)]
pub struct DimensionKey<'a> {
    pub name: &'a str,
    pub arguments: &'a Bindings,
    pub grain: Option<TimeGrain>,
}

impl Projection {
    pub fn is_metric(&self) -> bool {
        self.kind.is_metric()
    }

    pub fn dimension_key(&self) -> DimensionKey<'_> {
        DimensionKey {
            name: &self.name,
            arguments: &self.arguments,
            grain: self.grain,
        }
    }

    /// The same column read back from the level below.
    pub fn pass_through(&self) -> Projection {
        Projection {
            template: ProjectionTemplate::Expression(format!("{{{{${}}}}}", self.alias)),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// Logical table name.
    Table(String),
    Plan(Box<QueryPlan>),
}

/// One level of a plan; nested levels hang off `source`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub source: PlanSource,
    pub projections: Vec<Projection>,
    pub where_filter: Option<FilterExpression>,
    pub having_filter: Option<FilterExpression>,
    pub sorting: Vec<Sort>,
    pub pagination: Option<Pagination>,
    /// Table arguments, meaningful on the innermost level.
    pub arguments: Bindings,
    /// Level produced by nesting a direct plan; a merge may add dimensions to it.
    pub refinable: bool,
}

impl QueryPlan {
    /// Empty level reading from a table.
    pub fn over_table(table: &str) -> Self {
        Self {
            source: PlanSource::Table(table.to_string()),
            projections: Vec::new(),
            where_filter: None,
            having_filter: None,
            sorting: Vec::new(),
            pagination: None,
            arguments: Bindings::new(),
            refinable: false,
        }
    }

    /// Empty level reading from a nested plan.
    pub fn over_plan(inner: QueryPlan) -> Self {
        Self {
            source: PlanSource::Plan(Box::new(inner)),
            ..Self::over_table("")
        }
    }

    /// Number of levels, 1 for a direct plan.
    pub fn depth(&self) -> usize {
        match &self.source {
            PlanSource::Table(_) => 1,
            PlanSource::Plan(inner) => 1 + inner.depth(),
        }
    }

    pub fn inner(&self) -> Option<&QueryPlan> {
        match &self.source {
            PlanSource::Plan(inner) => Some(inner),
            PlanSource::Table(_) => None,
        }
    }

    pub fn inner_mut(&mut self) -> Option<&mut QueryPlan> {
        match &mut self.source {
            PlanSource::Plan(inner) => Some(inner),
            PlanSource::Table(_) => None,
        }
    }

    pub fn innermost(&self) -> &QueryPlan {
        match &self.source {
            PlanSource::Plan(inner) => inner.innermost(),
            PlanSource::Table(_) => self,
        }
    }

    pub fn innermost_mut(&mut self) -> &mut QueryPlan {
        match self.source {
            PlanSource::Plan(ref mut inner) => inner.innermost_mut(),
            PlanSource::Table(_) => self,
        }
    }

    /// Logical table at the bottom of the plan.
    pub fn root_table(&self) -> &str {
        match &self.source {
            PlanSource::Table(name) => name,
            PlanSource::Plan(inner) => inner.root_table(),
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.source, PlanSource::Plan(_))
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Projection> {
        self.projections.iter().filter(|p| p.is_metric())
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Projection> {
        self.projections.iter().filter(|p| !p.is_metric())
    }

    pub fn has_metrics(&self) -> bool {
        self.metrics().next().is_some()
    }

    pub fn projection(&self, alias: &str) -> Option<&Projection> {
        self.projections.iter().find(|p| p.alias == alias)
    }

    /// Output names of this level, in order.
    pub fn output_names(&self) -> Vec<String> {
        self.projections.iter().map(|p| p.alias.clone()).collect()
    }

    /// Add dimensions to every level: as-is on the innermost level and read
    /// through on the levels above. Aliases already present are skipped.
    pub fn attach_dimensions(&mut self, dims: &[Projection]) {
        let innermost = !self.is_nested();
        let mut added: Vec<Projection> = dims
            .iter()
            .filter(|d| self.projection(&d.alias).is_none())
            .map(|d| if innermost { d.clone() } else { d.pass_through() })
            .collect();
        added.append(&mut self.projections);
        self.projections = added;

        if let Some(inner) = self.inner_mut() {
            inner.attach_dimensions(dims);
        }
    }

    /// Mark every level as refinable.
    pub fn mark_refinable(&mut self) {
        self.refinable = true;
        if let Some(inner) = self.inner_mut() {
            inner.mark_refinable();
        }
    }
}
