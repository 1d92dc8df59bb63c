//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! tbd has two configuration scopes:
//! - **Global**: User-level settings
//! - **Repo**: Repository-level overrides
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$TBD_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/tbd/config.toml`
//! 3. `~/.tbd/config.toml` (canonical write location)
//!
//! # Repo Config Location
//!
//! `<git_dir>/tbd/config.toml`, routed through [`TbdPaths`].
//!
//! # Example
//!
//! ```no_run
//! use tbd::core::config::Config;
//! use tbd::core::paths::TbdPaths;
//! use std::path::PathBuf;
//!
//! let paths = TbdPaths::new(PathBuf::from("/path/to/repo/.git"));
//! let result = Config::load(Some(&paths)).unwrap();
//! println!("Interactive: {}", result.config.interactive());
//! ```

pub mod schema;

pub use schema::{FuseDefaults, GlobalConfig, InsertionPointDefault, RepoConfig, UserConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::paths::TbdPaths;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Warnings generated during config loading.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// The warning message.
    pub message: String,
    /// The path that triggered the warning.
    pub path: PathBuf,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Any warnings generated during loading.
    pub warnings: Vec<ConfigWarning>,
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence: repo config overrides global config, and
/// both override the defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Repository configuration (if in a repo)
    pub repo: Option<RepoConfig>,
    /// Path to the global config file (if loaded)
    global_path: Option<PathBuf>,
    /// Path to the repo config file (if loaded)
    repo_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// If `paths` is provided, also loads the repository's config.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or fail
    /// validation. Missing config files are not an error (defaults are used).
    pub fn load(paths: Option<&TbdPaths>) -> Result<ConfigLoadResult, ConfigError> {
        let mut warnings = Vec::new();
        let global_path = Self::find_global(&mut warnings);
        let repo_path = paths.map(TbdPaths::repo_config_path);
        let mut result = Self::load_from(global_path.as_deref(), repo_path.as_deref())?;
        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        Ok(result)
    }

    /// Load configuration from explicit file locations.
    ///
    /// Either file may be absent.
    pub fn load_from(
        global_path: Option<&Path>,
        repo_path: Option<&Path>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let (global, global_loaded) = match global_path.filter(|p| p.exists()) {
            Some(path) => (Self::read_config::<GlobalConfig>(path)?, Some(path.to_path_buf())),
            None => (GlobalConfig::default(), None),
        };
        let (repo, repo_loaded) = match repo_path.filter(|p| p.exists()) {
            Some(path) => (
                Some(Self::read_config::<RepoConfig>(path)?),
                Some(path.to_path_buf()),
            ),
            None => (None, None),
        };

        global.validate()?;
        if let Some(ref r) = repo {
            r.validate()?;
        }

        Ok(ConfigLoadResult {
            config: Config {
                global,
                repo,
                global_path: global_loaded,
                repo_path: repo_loaded,
            },
            warnings: Vec::new(),
        })
    }

    /// Locate the global config file.
    fn find_global(warnings: &mut Vec<ConfigWarning>) -> Option<PathBuf> {
        // 1. Check $TBD_CONFIG
        if let Ok(path) = std::env::var("TBD_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            warnings.push(ConfigWarning {
                message: "TBD_CONFIG points to a missing file, ignoring it".to_string(),
                path,
            });
        }

        // 2. Check $XDG_CONFIG_HOME/tbd/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("tbd/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Check ~/.tbd/config.toml
        dirs::home_dir()
            .map(|home| home.join(".tbd/config.toml"))
            .filter(|path| path.exists())
    }

    /// Read and parse a config file.
    fn read_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Write repo config atomically.
    ///
    /// Creates parent directories if needed.
    pub fn write_repo(paths: &TbdPaths, config: &RepoConfig) -> Result<PathBuf, ConfigError> {
        let path = paths.repo_config_path();
        Self::write_config_atomic(&path, config)?;
        Ok(path)
    }

    /// Write a config file atomically (temp file, sync, rename).
    fn write_config_atomic<T: serde::Serialize>(
        path: &Path,
        config: &T,
    ) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        file.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        file.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Check if interactive mode is enabled by default.
    ///
    /// Defaults to `true` if not configured.
    pub fn interactive(&self) -> bool {
        self.repo
            .as_ref()
            .and_then(|r| r.interactive)
            .or(self.global.interactive)
            .unwrap_or(true)
    }

    /// Default insertion point of `tbd fuse`.
    ///
    /// Defaults to [`InsertionPointDefault::Head`].
    pub fn fuse_insertion_point(&self) -> InsertionPointDefault {
        let repo = self
            .repo
            .as_ref()
            .and_then(|r| r.fuse.as_ref())
            .and_then(|f| f.insertion_point);
        let global = self.global.fuse.as_ref().and_then(|f| f.insertion_point);
        repo.or(global).unwrap_or_default()
    }

    /// Fallback commit author name.
    pub fn user_name(&self) -> Option<&str> {
        self.user_field(|u| u.name.as_deref())
    }

    /// Fallback commit author email.
    pub fn user_email(&self) -> Option<&str> {
        self.user_field(|u| u.email.as_deref())
    }

    fn user_field<'a>(&'a self, field: impl Fn(&'a UserConfig) -> Option<&'a str>) -> Option<&'a str> {
        self.repo
            .as_ref()
            .and_then(|r| r.user.as_ref())
            .and_then(&field)
            .or_else(|| self.global.user.as_ref().and_then(&field))
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded repo config file.
    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_empty_defaults() {
        let result = Config::load_from(None, None).unwrap();
        let config = result.config;
        assert!(config.interactive());
        assert_eq!(config.fuse_insertion_point(), InsertionPointDefault::Head);
        assert!(config.user_name().is_none());
        assert!(config.global_config_loaded_from().is_none());
    }

    #[test]
    fn missing_files_are_defaults() {
        let temp = TempDir::new().unwrap();
        let result =
            Config::load_from(Some(&temp.path().join("nope.toml")), Some(&temp.path().join("x")))
                .unwrap();
        assert!(result.config.repo.is_none());
    }

    #[test]
    fn repo_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global = write(
            temp.path(),
            "global.toml",
            r#"
            interactive = false
            [fuse]
            insertion_point = "dp"
            [user]
            name = "Global"
            email = "global@example.com"
            "#,
        );
        let repo = write(
            temp.path(),
            "repo.toml",
            r#"
            [fuse]
            insertion_point = "head"
            [user]
            name = "Repo"
            "#,
        );

        let config = Config::load_from(Some(&global), Some(&repo)).unwrap().config;
        assert!(!config.interactive());
        assert_eq!(config.fuse_insertion_point(), InsertionPointDefault::Head);
        assert_eq!(config.user_name(), Some("Repo"));
        assert_eq!(config.user_email(), Some("global@example.com"));
        assert_eq!(config.repo_config_loaded_from(), Some(repo.as_path()));
    }

    #[test]
    fn unknown_fields_rejected() {
        let temp = TempDir::new().unwrap();
        let repo = write(temp.path(), "repo.toml", "trunk = \"main\"\n");
        let result = Config::load_from(None, Some(&repo));
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn invalid_values_rejected() {
        let temp = TempDir::new().unwrap();
        let global = write(temp.path(), "g.toml", "[user]\nemail = \"nobody\"\n");
        assert!(matches!(
            Config::load_from(Some(&global), None),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn write_repo_config_atomic() {
        let temp = TempDir::new().unwrap();
        let paths = TbdPaths::new(temp.path().join(".git"));

        let config = RepoConfig {
            fuse: Some(FuseDefaults {
                insertion_point: Some(InsertionPointDefault::Dp),
            }),
            ..Default::default()
        };
        let path = Config::write_repo(&paths, &config).unwrap();
        assert_eq!(path, paths.repo_config_path());
        assert!(!path.with_extension("toml.tmp").exists());

        let loaded = Config::load_from(None, Some(&path)).unwrap().config;
        assert_eq!(loaded.fuse_insertion_point(), InsertionPointDefault::Dp);
    }
}
