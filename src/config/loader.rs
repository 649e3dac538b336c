//! Configuration file loader.
//!
//! The file is chosen in this order: an explicit `--config` path, then
//! `$PREVIEW_SUPERVISOR_CONFIG`, then the first existing file on the search
//! path. An explicit file must exist; a searched one may be absent, in which
//! case defaults apply. Command-line overrides are applied last.

use std::path::{Path, PathBuf};

use super::PreviewConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PREVIEW_SUPERVISOR_CONFIG";

/// Settings given on the command line. They win over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Where the configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    /// A file the user named; it must exist.
    Explicit(PathBuf),
    /// Candidate files in priority order; none of them has to exist.
    Search(Vec<PathBuf>),
}

/// Locates, parses and validates the supervisor configuration.
#[derive(Debug)]
pub struct ConfigLoader {
    source: Source,
}

impl ConfigLoader {
    /// Loader honouring `$PREVIEW_SUPERVISOR_CONFIG`, else the search path.
    #[must_use]
    pub fn new() -> Self {
        Self::resolve(None, std::env::var_os(CONFIG_ENV).map(PathBuf::from))
    }

    /// Loader for a file named on the command line.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            source: Source::Explicit(path),
        }
    }

    /// Pick the source from a command-line path and the environment value.
    #[must_use]
    pub fn resolve(cli_path: Option<PathBuf>, env_path: Option<PathBuf>) -> Self {
        match cli_path.or(env_path) {
            Some(path) => Self::with_path(path),
            None => Self {
                source: Source::Search(default_search_paths()),
            },
        }
    }

    /// Load the file, falling back to defaults when nothing was found on the
    /// search path.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing, or a file cannot be
    /// read, parsed or validated.
    pub fn load(&self) -> Result<PreviewConfig, ConfigError> {
        self.load_with(&ConfigOverrides::default())
    }

    /// Like [`load`](Self::load), then apply `overrides`.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_with(&self, overrides: &ConfigOverrides) -> Result<PreviewConfig, ConfigError> {
        let mut config = match self.config_file()? {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                parse_file(path)?
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                PreviewConfig::default()
            }
        };

        if let Some(host) = &overrides.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = overrides.port {
            config.server.port = port;
        }

        validate(&config)?;
        Ok(config)
    }

    /// The file that will be loaded, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when an explicit file is missing.
    pub fn config_file(&self) -> Result<Option<&Path>, ConfigError> {
        match &self.source {
            Source::Explicit(path) if path.exists() => Ok(Some(path.as_path())),
            Source::Explicit(path) => Err(ConfigError::NotFound { path: path.clone() }),
            Source::Search(paths) => Ok(paths.iter().find(|p| p.exists()).map(PathBuf::as_path)),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".preview-supervisor.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("preview-supervisor").join("config.toml"));
    }
    paths
}

fn parse_file(path: &Path) -> Result<PreviewConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn validate(config: &PreviewConfig) -> Result<(), ConfigError> {
    if config.process.program.trim().is_empty() {
        return Err(ConfigError::Invalid("process.program is empty".to_string()));
    }
    if config.ports.scan_width == 0 {
        return Err(ConfigError::Invalid("ports.scan_width must be at least 1".to_string()));
    }
    if config.readiness.timeout_ms == 0 {
        return Err(ConfigError::Invalid("readiness.timeout_ms must be positive".to_string()));
    }
    if config.process.log_capacity == 0 {
        return Err(ConfigError::Invalid("process.log_capacity must be at least 1".to_string()));
    }
    Ok(())
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file {path} does not exist")]
    NotFound { path: PathBuf },

    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
