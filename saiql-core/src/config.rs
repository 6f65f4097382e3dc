//! Configuration types

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Target SQL dialect for code generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    #[serde(alias = "postgresql")]
    Postgres,
    MySql,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::MySql),
            other => Err(ConfigError::InvalidValue {
                field: "target_dialect".to_string(),
                reason: format!("unknown dialect '{}'", other),
            }),
        }
    }
}

/// Optimization levels, ordered from none to aggressive. Each level
/// includes everything below it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    None,
    Basic,
    #[default]
    Standard,
    Aggressive,
}

impl OptimizationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationLevel::None => "none",
            OptimizationLevel::Basic => "basic",
            OptimizationLevel::Standard => "standard",
            OptimizationLevel::Aggressive => "aggressive",
        }
    }
}

/// Backend database identity. The engine treats the backend as opaque; the
/// `name` and `path` only feed the cache fingerprint and adapter selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Backend kind, e.g. "sqlite" or "memory".
    pub backend: String,
    /// Backend identity (file path, DSN, or logical name).
    pub path: String,
    /// Statement timeout handed to the adapter.
    pub timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: "saiql.db".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Compilation pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationConfig {
    pub target_dialect: Dialect,
    pub optimization_level: OptimizationLevel,
    pub enable_caching: bool,
}

impl Default for CompilationConfig {
    fn default() -> Self {
        Self {
            target_dialect: Dialect::Sqlite,
            optimization_level: OptimizationLevel::Standard,
            enable_caching: true,
        }
    }
}

/// Master engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub compilation: CompilationConfig,

    /// Legend file to load; `None` uses the compiled-in core legend.
    pub legend_path: Option<PathBuf>,
    /// Firewall rules file; `None` uses the builtin rule set. A configured
    /// path that fails to load leaves the firewall fail-closed.
    pub firewall_rules_path: Option<PathBuf>,

    /// Bounded LRU capacity of the query cache.
    pub cache_size: usize,
    /// Sessions idle longer than this are reaped.
    pub session_timeout: Duration,
    /// Active transactions older than this are aborted by the reaper.
    pub transaction_timeout: Duration,
    /// Default lock-acquisition timeout.
    pub lock_timeout: Duration,
    /// Deadlock detector sweep interval.
    pub deadlock_interval: Duration,
    /// Queries longer than this are rejected before lexing.
    pub max_query_len: usize,
    /// When set, firewall and safety failures are reported without rule
    /// contents or policy internals.
    pub hide_error_details: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            compilation: CompilationConfig::default(),
            legend_path: None,
            firewall_rules_path: None,
            cache_size: 1000,
            session_timeout: Duration::from_secs(3600),
            transaction_timeout: Duration::from_secs(3600),
            lock_timeout: Duration::from_secs(30),
            deadlock_interval: Duration::from_secs(1),
            max_query_len: 10_000,
            hide_error_details: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file, filling gaps with defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}
