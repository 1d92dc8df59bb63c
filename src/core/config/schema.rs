//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$TBD_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/tbd/config.toml`
//! 3. `~/.tbd/config.toml` (canonical write location)
//!
//! # Repo Config
//!
//! Located at `<git_dir>/tbd/config.toml`.
//!
//! Both files share one layout; repo values override global ones.
//!
//! # Validation
//!
//! Config values are validated after parsing (e.g. a configured email must
//! look like one).

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default insertion point of `tbd fuse`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertionPointDefault {
    /// After the current tip.
    #[default]
    Head,
    /// At the divergence point with the source.
    Dp,
}

/// `[fuse]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FuseDefaults {
    /// Where fused commits go when `--insertion-point` is not given
    pub insertion_point: Option<InsertionPointDefault>,
}

/// `[user]` table: commit identity used when Git config has none.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct UserConfig {
    /// Author and committer name
    pub name: Option<String>,
    /// Author and committer email
    pub email: Option<String>,
}

impl UserConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidValue("user.name cannot be empty".into()));
            }
        }
        if let Some(email) = &self.email {
            if !email.contains('@') || email.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidValue(format!(
                    "user.email '{}' is not an email address",
                    email
                )));
            }
        }
        Ok(())
    }
}

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// interactive = true
///
/// [fuse]
/// insertion_point = "dp"
///
/// [user]
/// name = "Ada"
/// email = "ada@example.com"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default interactive mode
    pub interactive: Option<bool>,

    /// Fuse defaults
    pub fuse: Option<FuseDefaults>,

    /// Fallback commit identity
    pub user: Option<UserConfig>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(user) = &self.user {
            user.validate()?;
        }
        Ok(())
    }
}

/// Repository configuration.
///
/// # Example
///
/// ```toml
/// [fuse]
/// insertion_point = "head"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Interactive mode for this repository
    pub interactive: Option<bool>,

    /// Fuse defaults
    pub fuse: Option<FuseDefaults>,

    /// Fallback commit identity
    pub user: Option<UserConfig>,
}

impl RepoConfig {
    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(user) = &self.user {
            user.validate()?;
        }
        Ok(())
    }
}
