//! Configuration: engine limits, result cache backend and named connections.

mod settings;

pub use settings::{
    expand_env_vars, CacheBackend, CacheSettings, ConnectionSettings, Driver, EngineSettings,
    Settings, SettingsError, CONFIG_ENV, DEFAULT_CONNECTION,
};
