//! Filter expressions over column paths.

use serde::{Deserialize, Serialize};

use crate::model::{Bindings, TimeGrain, Value};

/// Filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    In,
    NotIn,
    IsNull,
    NotNull,
    Prefix,
    Postfix,
    Infix,
    Lt,
    Le,
    Gt,
    Ge,
    Between,
}

/// Number of values an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    None,
    One,
    Two,
    Any,
}

impl Operator {
    pub fn arity(&self) -> Arity {
        match self {
            Operator::IsNull | Operator::NotNull => Arity::None,
            Operator::Between => Arity::Two,
            Operator::In | Operator::NotIn => Arity::Any,
            _ => Arity::One,
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        match self.arity() {
            Arity::None => count == 0,
            Arity::One => count == 1,
            Arity::Two => count == 2,
            Arity::Any => true,
        }
    }

    /// PREFIX, POSTFIX and INFIX match text patterns.
    pub fn is_pattern(&self) -> bool {
        matches!(self, Operator::Prefix | Operator::Postfix | Operator::Infix)
    }
}

/// One hop of a filter path: a join name, or the final field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathElement {
    pub field: String,
    #[serde(default, skip_serializing_if = "Bindings::is_empty")]
    pub arguments: Bindings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grain: Option<TimeGrain>,
}

impl PathElement {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.into(),
            arguments: Bindings::new(),
            grain: None,
        }
    }
}

/// `author.country.name` → joins `author`, `country`, then field `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn parse(dotted: &str) -> Self {
        Path(dotted.split('.').map(PathElement::new).collect())
    }

    /// Join hops, excluding the final field.
    pub fn joins(&self) -> &[PathElement] {
        match self.0.split_last() {
            Some((_, joins)) => joins,
            None => &[],
        }
    }

    pub fn field(&self) -> Option<&PathElement> {
        self.0.last()
    }

    /// Reference token for the path, with the field's arguments pinned:
    /// `{{author.country.name[lang:en]}}`.
    pub fn to_template(&self) -> String {
        let mut body = self.to_dotted();
        if let Some(field) = self.field() {
            for (name, value) in &field.arguments {
                body.push_str(&format!("[{}:{}]", name, value));
            }
        }
        format!("{{{{{}}}}}", body)
    }

    pub fn to_dotted(&self) -> String {
        self.0
            .iter()
            .map(|e| e.field.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub path: Path,
    pub operator: Operator,
    #[serde(default)]
    pub values: Vec<Value>,
}

/// A boolean tree of predicates. Used for both WHERE and HAVING.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpression {
    And(Vec<FilterExpression>),
    Or(Vec<FilterExpression>),
    Not(Box<FilterExpression>),
    Predicate(Predicate),
}

impl FilterExpression {
    pub fn predicate(path: &str, operator: Operator, values: Vec<Value>) -> Self {
        FilterExpression::Predicate(Predicate {
            path: Path::parse(path),
            operator,
            values,
        })
    }

    pub fn eq(path: &str, value: impl Into<Value>) -> Self {
        Self::predicate(path, Operator::Eq, vec![value.into()])
    }

    pub fn and(self, other: FilterExpression) -> Self {
        match self {
            FilterExpression::And(mut children) => {
                children.push(other);
                FilterExpression::And(children)
            }
            first => FilterExpression::And(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        FilterExpression::Not(Box::new(self))
    }

    /// Every predicate in the tree, depth first.
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    /// Predicates that must all hold: the root, or the members of a root `AND`
    /// (nested `AND`s flattened). Nothing under `OR` or `NOT`.
    pub fn conjuncts(&self) -> Vec<&Predicate> {
        match self {
            FilterExpression::And(children) => children.iter().flat_map(|c| c.conjuncts()).collect(),
            FilterExpression::Predicate(p) => vec![p],
            FilterExpression::Or(_) | FilterExpression::Not(_) => Vec::new(),
        }
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        match self {
            FilterExpression::And(children) | FilterExpression::Or(children) => {
                for child in children {
                    child.collect(out);
                }
            }
            FilterExpression::Not(inner) => inner.collect(out),
            FilterExpression::Predicate(p) => out.push(p),
        }
    }
}
