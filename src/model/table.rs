//! Logical tables.

use inflector::cases::snakecase::to_snake_case;
use serde::{Deserialize, Serialize};

use super::argument::ArgumentDef;
use super::column::Column;
use super::join::Join;
use super::required::RequiredFilter;

/// Where a table's rows come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSource {
    Physical {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        name: String,
    },
    /// SQL text used as a derived table.
    Subquery(String),
}

/// How the table's data version is determined for cache keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    /// Unversioned; results are never cached.
    #[default]
    None,
    Fixed(String),
    /// Single-value SQL executed on the table's connection.
    Query(String),
}

/// A logical table: a source plus the columns, joins and arguments defined over it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub source: TableSource,
    #[serde(default)]
    pub version: VersionSource,
    /// Connection name; `None` uses the default connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<Join>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<ArgumentDef>,
    /// Checked on every query over this table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_filters: Vec<RequiredFilter>,
}

impl Table {
    pub fn physical(name: &str, schema: Option<&str>, table: &str) -> Self {
        Self::with_source(
            name,
            TableSource::Physical {
                schema: schema.map(String::from),
                name: table.into(),
            },
        )
    }

    pub fn subquery(name: &str, sql: &str) -> Self {
        Self::with_source(name, TableSource::Subquery(sql.into()))
    }

    fn with_source(name: &str, source: TableSource) -> Self {
        Self {
            name: name.into(),
            source,
            version: VersionSource::None,
            connection: None,
            columns: Vec::new(),
            joins: Vec::new(),
            arguments: Vec::new(),
            required_filters: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_join(mut self, join: Join) -> Self {
        self.joins.push(join);
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

    pub fn with_version(mut self, version: VersionSource) -> Self {
        self.version = version;
        self
    }

    pub fn with_connection(mut self, connection: &str) -> Self {
        self.connection = Some(connection.into());
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn join(&self, name: &str) -> Option<&Join> {
        self.joins.iter().find(|j| j.name == name)
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentDef> {
        self.arguments.iter().find(|a| a.name == name)
    }

    /// Alias of the table at the root of a query (`PlayerStats` → `player_stats`).
    pub fn root_alias(&self) -> String {
        to_snake_case(&self.name)
    }
}
