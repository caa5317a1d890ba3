//! Configuration module for the code intelligence engine.
//!
//! Layered configuration:
//! - Default values
//! - `citadel.toml` configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CITADEL_` and use double
//! underscores to separate nested levels:
//! - `CITADEL_INDEXER__STAGING_DELAY_MS=500` sets `indexer.staging_delay_ms`
//! - `CITADEL_EVAL__TIMEOUT_MS=1000` sets `eval.timeout_ms`
//! - `CITADEL_DEBUG=true` sets `debug`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{EngineError, EngineResult};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Directory holding persisted zone indices
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Background indexer settings
    #[serde(default)]
    pub indexer: IndexerConfig,

    /// Evaluation session settings
    #[serde(default)]
    pub eval: EvalConfig,

    /// Library search targets consulted after the buffer's own directory
    #[serde(default)]
    pub libraries: LibraryConfig,

    /// Language-specific settings, keyed by language id (e.g. "python")
    #[serde(default)]
    pub languages: HashMap<String, LanguageConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexerConfig {
    /// Delay from a request being staged to being queued (edit debounce)
    #[serde(default = "default_staging_delay_ms")]
    pub staging_delay_ms: u64,

    /// Bounded grace period when shutting the worker down
    #[serde(default = "default_finalize_grace_ms")]
    pub finalize_grace_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EvalConfig {
    /// Default timeout for the synchronous evaluation wrappers
    #[serde(default = "default_eval_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LibraryConfig {
    /// Extra project directories searched for importable blobs
    #[serde(default)]
    pub extra_dirs: Vec<PathBuf>,

    /// Environment variable holding a path-separated list of import dirs
    /// (e.g. "PYTHONPATH")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_path_var: Option<String>,

    /// Catalog files (JSON) selected for import resolution
    #[serde(default)]
    pub catalogs: Vec<PathBuf>,

    /// Standard-library snapshot files (JSON), keyed by language id
    #[serde(default)]
    pub stdlibs: HashMap<String, PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LanguageConfig {
    /// Whether this language is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// File extensions for this language (no dot prefix)
    #[serde(default)]
    pub extensions: Vec<String>,
}

fn default_version() -> u32 {
    1
}

fn default_false() -> bool {
    false
}

fn default_true() -> bool {
    true
}

fn default_database_path() -> PathBuf {
    PathBuf::from(".citadel/db")
}

fn default_staging_delay_ms() -> u64 {
    1500
}

fn default_finalize_grace_ms() -> u64 {
    2000
}

fn default_eval_timeout_ms() -> u64 {
    3000
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            staging_delay_ms: default_staging_delay_ms(),
            finalize_grace_ms: default_finalize_grace_ms(),
        }
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_eval_timeout_ms(),
        }
    }
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extensions: Vec::new(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            debug: false,
            database_path: default_database_path(),
            indexer: IndexerConfig::default(),
            eval: EvalConfig::default(),
            libraries: LibraryConfig::default(),
            languages: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, the user-level config
    /// (`<config dir>/citadel/citadel.toml`), `citadel.toml` in the working
    /// directory, and `CITADEL_*` environment overrides, in that order.
    pub fn load() -> EngineResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(global) = dirs::config_dir() {
            figment = figment.merge(Toml::file(global.join("citadel").join("citadel.toml")));
        }
        figment
            .merge(Toml::file("citadel.toml"))
            .merge(Env::prefixed("CITADEL_").split("__"))
            .extract()
            .map_err(|e| EngineError::Config {
                reason: e.to_string(),
            })
    }

    /// Load settings with an explicit config file path.
    pub fn load_from(config_file: &Path) -> EngineResult<Self> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed("CITADEL_").split("__"))
            .extract()
            .map_err(|e| EngineError::Config {
                reason: e.to_string(),
            })
    }

    /// True if the given language id is enabled.
    ///
    /// Languages absent from the config are enabled by default; an explicit
    /// entry controls enablement.
    pub fn is_language_enabled(&self, language: &str) -> bool {
        self.languages
            .get(language)
            .map(|config| config.enabled)
            .unwrap_or(true)
    }

    /// Delay used when staging edit-driven scan requests.
    pub fn staging_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.indexer.staging_delay_ms)
    }

    /// Default synchronous evaluation timeout.
    pub fn eval_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.eval.timeout_ms)
    }

    /// Write a commented default config file if none exists yet.
    pub fn init_config_file(path: &Path) -> EngineResult<bool> {
        if path.exists() {
            return Ok(false);
        }
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).map_err(|e| EngineError::Config {
            reason: format!("failed to serialize default settings: {e}"),
        })?;
        let contents = format!(
            "# Citadel configuration\n# Values here override built-in defaults; CITADEL_* env vars override both.\n\n{toml}"
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::Config {
                reason: format!("failed to create config directory: {e}"),
            })?;
        }
        std::fs::write(path, contents).map_err(|e| EngineError::Config {
            reason: format!("failed to write '{}': {e}", path.display()),
        })?;
        Ok(true)
    }
}
