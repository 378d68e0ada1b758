//! TOML configuration.
//!
//! ```toml
//! [engine]
//! max_page_size = 5000
//! default_dialect = "postgres"
//!
//! [cache]
//! backend = "sqlite"
//! path = "${HOME}/.cache/aggplan/results.db"
//!
//! [connections.default]
//! driver = "sqlite"
//! database = "./data/games.db"
//!
//! [connections.reporting]
//! driver = "sqlite"
//! database = "${REPORTING_DB}"
//! dialect = "sqlite"
//! ```
//!
//! Every section is optional; missing keys take their defaults.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::semantic::planner::DEFAULT_MAX_PAGE_SIZE;
use crate::sql::dialect::Dialect;

/// Name of the connection used by tables that don't name one.
pub const DEFAULT_CONNECTION: &str = "default";

/// Environment variable pointing at an explicit settings file.
pub const CONFIG_ENV: &str = "AGGPLAN_CONFIG";

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(?:\{([^}]*)\}|([A-Za-z0-9_]+))").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file {0} does not exist")]
    NotFound(PathBuf),

    #[error("cannot read settings: {0}")]
    Io(#[from] io::Error),

    #[error("malformed settings: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("environment variable {0} is not set")]
    UnsetVariable(String),

    #[error("unterminated '${{' in '{0}'")]
    UnterminatedVariable(String),

    #[error("no connection named '{0}'")]
    UnknownConnection(String),

    #[error("unsupported driver '{0}' (expected sqlite)")]
    UnsupportedDriver(String),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub cache: CacheSettings,
    pub connections: HashMap<String, ConnectionSettings>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Largest page a query may request.
    pub max_page_size: u64,
    /// Dialect for connections that don't declare one.
    pub default_dialect: Dialect,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            default_dialect: Dialect::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: CacheBackend,
    /// Entry bound for the memory backend.
    pub max_entries: usize,
    /// Results file for the sqlite backend. Environment variables expand.
    pub path: Option<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            max_entries: DEFAULT_MAX_ENTRIES,
            path: None,
        }
    }
}

impl CacheSettings {
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        match &self.path {
            Some(path) => Ok(Some(PathBuf::from(expand_env_vars(path)?))),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Sqlite,
}

impl std::str::FromStr for Driver {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("sqlite") || s.eq_ignore_ascii_case("sqlite3") {
            Ok(Driver::Sqlite)
        } else {
            Err(SettingsError::UnsupportedDriver(s.to_string()))
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    pub driver: String,
    /// Database location. Environment variables expand.
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Dialect>,
}

impl ConnectionSettings {
    pub fn driver_type(&self) -> Result<Driver, SettingsError> {
        self.driver.parse()
    }

    pub fn resolved_database(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.database)
    }
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SettingsError::NotFound(path.to_path_buf()),
            _ => SettingsError::Io(e),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.check()?;
        Ok(settings)
    }

    /// Settings from `$AGGPLAN_CONFIG`, else `./aggplan.toml`, else
    /// `<config dir>/aggplan/config.toml`, else defaults.
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Self::from_file(path);
        }
        let candidates = [
            Some(PathBuf::from("aggplan.toml")),
            dirs::config_dir().map(|dir| dir.join("aggplan").join("config.toml")),
        ];
        match candidates.into_iter().flatten().find(|p| p.is_file()) {
            Some(path) => Self::from_file(path),
            None => Ok(Settings::default()),
        }
    }

    fn check(&self) -> Result<(), SettingsError> {
        if self.engine.max_page_size == 0 {
            return Err(SettingsError::Invalid("engine.max_page_size must be positive".into()));
        }
        let bounded = self.cache.backend == CacheBackend::Memory;
        if self.cache.enabled && bounded && self.cache.max_entries == 0 {
            return Err(SettingsError::Invalid("cache.max_entries must be positive".into()));
        }
        self.connections
            .values()
            .try_for_each(|c| c.driver_type().map(|_| ()))
    }

    pub fn connection(&self, name: &str) -> Result<&ConnectionSettings, SettingsError> {
        self.connections
            .get(name)
            .ok_or_else(|| SettingsError::UnknownConnection(name.to_string()))
    }

    /// The connection named "default", or the only connection when exactly
    /// one is configured.
    pub fn default_connection(&self) -> Option<(&str, &ConnectionSettings)> {
        match self.connections.get_key_value(DEFAULT_CONNECTION) {
            Some((name, conn)) => Some((name.as_str(), conn)),
            None if self.connections.len() == 1 => {
                self.connections.iter().next().map(|(name, conn)| (name.as_str(), conn))
            }
            None => None,
        }
    }

    /// Dialect for statements sent to `connection` (`None` = default connection).
    pub fn dialect_for(&self, connection: Option<&str>) -> Dialect {
        let settings = match connection {
            Some(name) => self.connections.get(name),
            None => self.default_connection().map(|(_, c)| c),
        };
        settings
            .and_then(|c| c.dialect)
            .unwrap_or(self.engine.default_dialect)
    }
}

/// Expand `${VAR}` and `$VAR`. A `$` not followed by a name stays as is.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut out = String::with_capacity(s.len());
    let mut rest_start = 0;
    for caps in VARIABLE.captures_iter(s) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2))) else {
            continue;
        };
        let value = env::var(name.as_str())
            .map_err(|_| SettingsError::UnsetVariable(name.as_str().to_string()))?;
        out.push_str(&s[rest_start..whole.start()]);
        out.push_str(&value);
        rest_start = whole.end();
    }
    let rest = &s[rest_start..];
    if rest.contains("${") {
        return Err(SettingsError::UnterminatedVariable(s.to_string()));
    }
    out.push_str(rest);
    Ok(out)
}
