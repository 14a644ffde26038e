//! Layered configuration for modfetch.
//!
//! Values are resolved in order, later layers overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A config file: the path given on the command line, or `config.toml` in
//!    the platform config directory if it exists. TOML, YAML and JSON are
//!    accepted, chosen by file extension.
//! 3. Environment variables prefixed `MODFETCH_`, with `__` separating nested
//!    keys (`MODFETCH_QUEUE__WORKERS=4`).

pub mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{ErrorKind, Result};

const ENV_PREFIX: &str = "MODFETCH_";
const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "modfetch.db";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "modfetch")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = project_dirs()
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE));
        Self { path, max_connections: 8 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Base URL of a GOPROXY-protocol module proxy.
    pub url: String,
    /// Timeout for a single proxy request, in seconds.
    pub timeout_secs: u64,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self { url: "https://proxy.golang.org".to_string(), timeout_secs: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of fetches running at once.
    pub workers: usize,
    /// Time allowed for one whole fetch, in seconds.
    pub fetch_timeout_secs: u64,
    /// How many versions one requeue pass schedules.
    pub requeue_batch: usize,
}

impl QueueConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { workers: 10, fetch_timeout_secs: 300, requeue_batch: 100 }
    }
}

/// Module-wide resource ceilings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Largest Go source file read, in bytes.
    pub max_file_size: u64,
    /// Largest license or README file read, in bytes.
    pub max_license_size: u64,
    /// Largest archive downloaded, in bytes.
    pub max_archive_size: u64,
    pub max_directories: usize,
    pub max_imports_per_package: usize,
    pub max_packages_per_module: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: 30 * 1024 * 1024,
            max_license_size: 1024 * 1024,
            max_archive_size: 500 * 1024 * 1024,
            max_directories: 10_000,
            max_imports_per_package: 1_000,
            max_packages_per_module: 10_000,
        }
    }
}

/// Modules that must never be fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionsConfig {
    /// Module paths excluded along with everything below them.
    pub prefixes: Vec<String>,
    /// Individual `module@version` pairs.
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub proxy: ProxyConfig,
    pub queue: QueueConfig,
    pub limits: Limits,
    pub exclusions: ExclusionsConfig,
}

impl Config {
    /// Default config file location, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load configuration from defaults, a config file and the environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.display().to_string())),
            Some(path) => figment = figment.merge(Self::file_provider(path)?),
            None => {
                if let Some(default) = Self::default_path().filter(|p| p.is_file()) {
                    tracing::debug!(path = %default.display(), "using default config file");
                    figment = figment.merge(Self::file_provider(&default)?);
                }
            },
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    fn file_provider(path: &Path) -> Result<Figment> {
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
        Ok(match extension.to_ascii_lowercase().as_str() {
            "toml" => Figment::from(Toml::file(path)),
            "yaml" | "yml" => Figment::from(Yaml::file(path)),
            "json" => Figment::from(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.display().to_string())),
        })
    }

    /// Reject settings that would stall or disable the pipeline.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.database.max_connections == 0, "database.max_connections must be at least 1"),
            (self.proxy.url.trim().is_empty(), "proxy.url must not be empty"),
            (self.proxy.timeout_secs == 0, "proxy.timeout_secs must be at least 1"),
            (self.queue.workers == 0, "queue.workers must be at least 1"),
            (self.queue.fetch_timeout_secs == 0, "queue.fetch_timeout_secs must be at least 1"),
            (self.queue.requeue_batch == 0, "queue.requeue_batch must be at least 1"),
            (self.limits.max_file_size == 0, "limits.max_file_size must be at least 1"),
            (self.limits.max_license_size == 0, "limits.max_license_size must be at least 1"),
            (self.limits.max_archive_size == 0, "limits.max_archive_size must be at least 1"),
            (self.limits.max_directories == 0, "limits.max_directories must be at least 1"),
            (self.limits.max_packages_per_module == 0, "limits.max_packages_per_module must be at least 1"),
        ];
        if let Some((_, message)) = checks.iter().find(|(failed, _)| *failed) {
            exn::bail!(ErrorKind::Invalid(message.to_string()));
        }
        if let Some(pair) = self.exclusions.versions.iter().find(|pair| !pair.contains('@')) {
            exn::bail!(ErrorKind::Invalid(format!("exclusion {pair:?} is not of the form module@version")));
        }
        Ok(())
    }
}
