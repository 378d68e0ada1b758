//! The schema: every logical table the engine can query.
//!
//! A schema is validated when it is loaded and read-only afterwards;
//! share it behind an `Arc`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use super::column::{ColumnKind, Nesting};
use super::table::Table;
use crate::semantic::resolver::reference::{self, Reference};
use crate::semantic::{SemanticError, SemanticResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    tables: BTreeMap<String, Table>,
}

/// On-disk document: `{ "tables": [...] }` in JSON or TOML.
#[derive(Debug, Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    tables: Vec<Table>,
}

impl Schema {
    /// Build and fully validate a schema.
    pub fn from_tables(tables: Vec<Table>) -> SemanticResult<Self> {
        let schema = Self::from_tables_unchecked(tables)?;
        schema.validate_references()?;
        Ok(schema)
    }

    /// Build a schema checking structure only.
    ///
    /// Formula references are still checked when columns are resolved,
    /// so loops and dangling references surface at planning time instead.
    pub fn from_tables_unchecked(tables: Vec<Table>) -> SemanticResult<Self> {
        let mut map = BTreeMap::new();
        for table in tables {
            if map.contains_key(&table.name) {
                return Err(SemanticError::InvalidSchema(format!(
                    "duplicate table '{}'",
                    table.name
                )));
            }
            map.insert(table.name.clone(), table);
        }
        let schema = Self { tables: map };
        schema.validate_structure()?;
        Ok(schema)
    }

    pub fn from_json_str(json: &str) -> SemanticResult<Self> {
        let doc: SchemaDocument = serde_json::from_str(json)
            .map_err(|e| SemanticError::InvalidSchema(format!("JSON parse error: {}", e)))?;
        Self::from_tables(doc.tables)
    }

    pub fn from_toml_str(text: &str) -> SemanticResult<Self> {
        let doc: SchemaDocument = toml::from_str(text)
            .map_err(|e| SemanticError::InvalidSchema(format!("TOML parse error: {}", e)))?;
        Self::from_tables(doc.tables)
    }

    /// Load a `.json` or `.toml` schema file.
    pub fn from_file(path: impl AsRef<Path>) -> SemanticResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SemanticError::InvalidSchema(format!("cannot read {}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            _ => Self::from_json_str(&text),
        }
    }

    pub fn table(&self, name: &str) -> SemanticResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| SemanticError::UnknownTable(name.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    fn validate_structure(&self) -> SemanticResult<()> {
        for table in self.tables.values() {
            let invalid =
                |msg: String| SemanticError::InvalidSchema(format!("table '{}': {}", table.name, msg));

            let mut seen = HashSet::new();
            for column in &table.columns {
                if !seen.insert(column.name.as_str()) {
                    return Err(invalid(format!("duplicate column '{}'", column.name)));
                }
            }

            let mut joins = HashSet::new();
            for join in &table.joins {
                if !joins.insert(join.name.as_str()) {
                    return Err(invalid(format!("duplicate join '{}'", join.name)));
                }
                if !self.tables.contains_key(&join.target) {
                    return Err(invalid(format!(
                        "join '{}' targets unknown table '{}'",
                        join.name, join.target
                    )));
                }
            }

            for arg in &table.arguments {
                if let Some(default) = &arg.default {
                    arg.check(default).map_err(|reason| SemanticError::InvalidArgument {
                        argument: arg.name.clone(),
                        value: default.clone(),
                        reason,
                    })?;
                }
            }

            for column in &table.columns {
                if !column.grains.is_empty() && column.kind != ColumnKind::TimeDimension {
                    return Err(invalid(format!(
                        "column '{}' declares grains but is not a time dimension",
                        column.name
                    )));
                }
                for arg in &column.arguments {
                    if let Some(default) = &arg.default {
                        arg.check(default).map_err(|reason| SemanticError::InvalidArgument {
                            argument: arg.name.clone(),
                            value: default.clone(),
                            reason,
                        })?;
                    }
                }
                if let Nesting::PerGrain {
                    time_dimension,
                    grain,
                } = &column.nesting
                {
                    if column.kind != ColumnKind::Metric {
                        return Err(invalid(format!(
                            "column '{}' declares per-grain nesting but is not a metric",
                            column.name
                        )));
                    }
                    let supported = table
                        .column(time_dimension)
                        .is_some_and(|td| td.supports_grain(*grain));
                    if !supported {
                        return Err(invalid(format!(
                            "column '{}' nests on '{}' at grain '{}', which is not a supported time dimension grain",
                            column.name, time_dimension, grain
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Check that every formula reference points at something declared and
    /// that the column reference graph is acyclic.
    pub fn validate_references(&self) -> SemanticResult<()> {
        let mut graph: DiGraph<(String, String), ()> = DiGraph::new();
        let mut index: HashMap<(String, String), NodeIndex> = HashMap::new();
        let mut node = |graph: &mut DiGraph<(String, String), ()>, table: &str, column: &str| {
            *index
                .entry((table.to_string(), column.to_string()))
                .or_insert_with(|| graph.add_node((table.to_string(), column.to_string())))
        };

        for table in self.tables.values() {
            for column in &table.columns {
                let from = node(&mut graph, &table.name, &column.name);
                for token in reference::tokens(&column.formula) {
                    match reference::parse(token.body)? {
                        Reference::ColumnArgument(arg) => {
                            if column.argument(&arg).is_none() {
                                return Err(SemanticError::InvalidReference(format!(
                                    "column '{}.{}' uses undeclared argument '{}'",
                                    table.name, column.name, arg
                                )));
                            }
                        }
                        Reference::TableArgument(arg) => {
                            if table.argument(&arg).is_none() {
                                return Err(SemanticError::InvalidReference(format!(
                                    "column '{}.{}' uses undeclared table argument '{}'",
                                    table.name, column.name, arg
                                )));
                            }
                        }
                        Reference::Physical(_) => {}
                        Reference::Logical { column: target, .. } => {
                            self.column_exists(table, &target)?;
                            let to = node(&mut graph, &table.name, &target);
                            graph.add_edge(from, to, ());
                        }
                        Reference::Joined { path, leaf } => {
                            let target_table = self.walk_joins(table, &path)?;
                            if let Reference::Logical { column: target, .. } = leaf.as_ref() {
                                self.column_exists(target_table, target)?;
                                let to = node(&mut graph, &target_table.name, target);
                                graph.add_edge(from, to, ());
                            }
                        }
                    }
                }
            }

            for join in &table.joins {
                for token in reference::tokens(&join.expression) {
                    if let Reference::Joined { path, .. } = reference::parse(token.body)? {
                        // The first hop may be the join being defined.
                        if path.first() != Some(&join.name) {
                            self.walk_joins(table, &path)?;
                        }
                    }
                }
            }
        }

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || graph.edges_connecting(scc[0], scc[0]).next().is_some()
            })
            .map(|scc| cycle_path(&graph, &scc))
            .collect();
        cycles.sort();

        match cycles.into_iter().next() {
            Some(path) => Err(SemanticError::ReferenceCycle { path }),
            None => Ok(()),
        }
    }

    fn column_exists(&self, table: &Table, column: &str) -> SemanticResult<()> {
        match table.column(column) {
            Some(_) => Ok(()),
            None => Err(SemanticError::UnknownColumn {
                table: table.name.clone(),
                column: column.to_string(),
            }),
        }
    }

    /// Follow a join path from `table`, returning the final target.
    pub fn walk_joins<'a>(&'a self, table: &'a Table, path: &[String]) -> SemanticResult<&'a Table> {
        let mut current = table;
        for hop in path {
            let join = current.join(hop).ok_or_else(|| SemanticError::UnknownJoin {
                table: current.name.clone(),
                join: hop.clone(),
            })?;
            current = self.table(&join.target)?;
        }
        Ok(current)
    }
}

/// A concrete loop through a strongly connected component, starting and
/// ending at its smallest member.
fn cycle_path(graph: &DiGraph<(String, String), ()>, scc: &[NodeIndex]) -> Vec<String> {
    let members: HashSet<NodeIndex> = scc.iter().copied().collect();
    let Some(&start) = scc.iter().min_by_key(|idx| &graph[**idx]) else {
        return Vec::new();
    };

    fn walk(
        graph: &DiGraph<(String, String), ()>,
        current: NodeIndex,
        start: NodeIndex,
        members: &HashSet<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
        path: &mut Vec<NodeIndex>,
    ) -> bool {
        let mut next: Vec<NodeIndex> = graph.neighbors(current).collect();
        next.sort_by(|a, b| graph[*a].cmp(&graph[*b]));
        for n in next {
            if n == start {
                path.push(n);
                return true;
            }
            if members.contains(&n) && visited.insert(n) {
                path.push(n);
                if walk(graph, n, start, members, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    let mut path = vec![start];
    let mut visited = HashSet::from([start]);
    walk(graph, start, start, &members, &mut visited, &mut path);

    let single_table = path.iter().all(|idx| graph[*idx].0 == graph[start].0);
    path.into_iter()
        .map(|idx| {
            let (table, column) = &graph[idx];
            if single_table {
                column.clone()
            } else {
                format!("{}.{}", table, column)
            }
        })
        .collect()
}
