//! Configuration management for relive.
//!
//! Parses `relive.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `build.command` (every entry)
//! - `build.cwd`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Clone, Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override the served site root.
    pub root: Option<PathBuf>,
    /// Override live reload enabled flag.
    pub live_reload_enabled: Option<bool>,
    /// Override file watching flag.
    pub watch: Option<bool>,
    /// Override the watched directory.
    pub watch_path: Option<PathBuf>,
    /// Override the build command (argv).
    pub build_command: Option<Vec<String>>,
}

/// Configuration filename to search for.
pub const CONFIG_FILENAME: &str = "relive.toml";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Site configuration (paths are relative strings from TOML).
    site: SiteConfigRaw,
    /// Live reload configuration (paths are relative strings from TOML).
    live_reload: LiveReloadConfigRaw,
    /// Build step configuration (optional section).
    build: Option<BuildConfigRaw>,

    /// Resolved site configuration (set after loading).
    #[serde(skip)]
    pub site_resolved: SiteConfig,
    /// Resolved live reload configuration (set after loading).
    #[serde(skip)]
    pub live_reload_resolved: LiveReloadConfig,
    /// Resolved build configuration (set after loading).
    #[serde(skip)]
    pub build_resolved: Option<BuildConfig>,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    #[allow(clippy::derivable_impls)]
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8888,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SiteConfigRaw {
    root: Option<String>,
}

/// Resolved site configuration with absolute paths.
#[derive(Debug, Default)]
pub struct SiteConfig {
    /// Directory served over HTTP.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LiveReloadConfigRaw {
    enabled: bool,
    watch: bool,
    watch_path: Option<String>,
    ignore: Vec<String>,
}

impl Default for LiveReloadConfigRaw {
    fn default() -> Self {
        Self {
            enabled: true,
            watch: true,
            watch_path: None,
            ignore: Vec::new(),
        }
    }
}

/// Resolved live reload configuration.
#[derive(Debug, Default)]
pub struct LiveReloadConfig {
    /// Whether the live reload layer is installed at all.
    pub enabled: bool,
    /// Directory to watch. `None` disables change-driven reloads.
    pub watch_path: Option<PathBuf>,
    /// Glob patterns, relative to the watch path, whose changes are ignored.
    pub ignore: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BuildConfigRaw {
    command: Vec<String>,
    cwd: Option<String>,
}

/// Resolved build step configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildConfig {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Working directory for the build.
    pub cwd: PathBuf,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`build.cwd`").
        field: String,
        /// Error message (e.g., "${`BUILD_DIR`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `relive.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the resulting configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(root) = &settings.root {
            // A watch path that followed the old root follows the new one.
            if self.live_reload_resolved.watch_path.as_ref() == Some(&self.site_resolved.root) {
                self.live_reload_resolved.watch_path = Some(root.clone());
            }
            self.site_resolved.root.clone_from(root);
        }
        if let Some(enabled) = settings.live_reload_enabled {
            self.live_reload_resolved.enabled = enabled;
        }
        if let Some(watch_path) = &settings.watch_path {
            self.live_reload_resolved.watch_path = Some(watch_path.clone());
        }
        if settings.watch == Some(false) {
            self.live_reload_resolved.watch_path = None;
        } else if settings.watch == Some(true) && self.live_reload_resolved.watch_path.is_none() {
            self.live_reload_resolved.watch_path = Some(self.site_resolved.root.clone());
        }
        if let Some(command) = &settings.build_command {
            let cwd = self.build_resolved.as_ref().map_or_else(
                || self.base_dir().to_path_buf(),
                |build| build.cwd.clone(),
            );
            self.build_resolved = Some(BuildConfig {
                command: command.clone(),
                cwd,
            });
        }
    }

    /// Directory relative paths are resolved against.
    fn base_dir(&self) -> &Path {
        self.config_path
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(Path::new("."))
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            site: SiteConfigRaw::default(),
            live_reload: LiveReloadConfigRaw::default(),
            build: None,
            site_resolved: SiteConfig {
                root: base.to_path_buf(),
            },
            live_reload_resolved: LiveReloadConfig {
                enabled: true,
                watch_path: Some(base.to_path_buf()),
                ignore: Vec::new(),
            },
            build_resolved: None,
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir)?;
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file and after CLI settings
    /// are applied.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_live_reload()?;
        self.validate_build()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is technically valid (OS assigns a random port), but the
        // browser needs a known address to reconnect to
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    fn validate_live_reload(&self) -> Result<(), ConfigError> {
        for pattern in &self.live_reload_resolved.ignore {
            if let Err(e) = glob::Pattern::new(pattern) {
                return Err(ConfigError::Validation(format!(
                    "live_reload.ignore pattern {pattern:?} is invalid: {e}"
                )));
            }
        }
        Ok(())
    }

    fn validate_build(&self) -> Result<(), ConfigError> {
        let Some(build) = &self.build_resolved else {
            return Ok(());
        };
        match build.command.first() {
            None => Err(ConfigError::Validation(
                "build.command cannot be empty".to_owned(),
            )),
            Some(program) => require_non_empty(program, "build.command[0]"),
        }
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref mut build) = self.build {
            for arg in &mut build.command {
                *arg = expand::expand_env(arg, "build.command")?;
            }
            if let Some(ref cwd) = build.cwd {
                build.cwd = Some(expand::expand_env(cwd, "build.cwd")?);
            }
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        let resolve = |path: Option<&str>, default: &Path| {
            path.map_or_else(|| default.to_path_buf(), |p| config_dir.join(p))
        };

        let root = resolve(self.site.root.as_deref(), config_dir);

        let watch_path = self
            .live_reload
            .watch
            .then(|| resolve(self.live_reload.watch_path.as_deref(), &root));

        self.live_reload_resolved = LiveReloadConfig {
            enabled: self.live_reload.enabled,
            watch_path,
            ignore: self.live_reload.ignore.clone(),
        };

        self.build_resolved = match &self.build {
            Some(build) => {
                if build.command.is_empty() {
                    return Err(ConfigError::Validation(
                        "[build] section requires command to be set".to_owned(),
                    ));
                }
                Some(BuildConfig {
                    command: build.command.clone(),
                    cwd: resolve(build.cwd.as_deref(), config_dir),
                })
            }
            None => None,
        };

        self.site_resolved = SiteConfig { root };

        Ok(())
    }
}
