//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`BranchName`] - Validated Git branch name
//! - [`Oid`] - Git object identifier (SHA)
//! - [`RefName`] - Validated Git reference name, with constructors for the
//!   refs tbd owns
//! - [`RepoPath`] - Working-copy path relative to the repository root
//! - [`UtcTimestamp`] - RFC3339 timestamp
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented.
//!
//! # Examples
//!
//! ```
//! use tbd::core::types::{BranchName, Oid, RefName, RepoPath};
//!
//! let branch = BranchName::new("feature/my-branch").unwrap();
//! let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! let refname = RefName::for_branch(&branch);
//! assert_eq!(refname.as_str(), "refs/heads/feature/my-branch");
//!
//! let path = RepoPath::new("src/lib.rs").unwrap();
//! assert_eq!(path.file_name(), "lib.rs");
//!
//! assert!(BranchName::new("invalid..name").is_err());
//! assert!(Oid::new("not-a-sha").is_err());
//! assert!(RepoPath::new("../escape").is_err());
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Characters Git never allows in a refname.
const FORBIDDEN_REF_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];

/// Apply the `git check-ref-format` rules shared by branch and ref names.
///
/// Returns a description of the first violated rule.
fn check_refname_rules(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("cannot be empty".into());
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err("cannot start or end with '/'".into());
    }
    if name.ends_with(".lock") {
        return Err("cannot end with '.lock'".into());
    }
    for pattern in ["..", "@{", "//"] {
        if name.contains(pattern) {
            return Err(format!("cannot contain '{pattern}'"));
        }
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_REF_CHARS.contains(c)) {
        return Err(format!("cannot contain '{c}'"));
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err("cannot contain control characters".into());
    }
    for component in name.split('/') {
        if component.starts_with('.') {
            return Err("path component cannot start with '.'".into());
        }
        if component.ends_with(".lock") {
            return Err("path component cannot end with '.lock'".into());
        }
    }
    Ok(())
}

/// A validated Git branch name.
///
/// Branch names follow Git's refname rules (see `git check-ref-format`), and
/// additionally cannot start with `-` or be exactly `@`.
///
/// # Example
///
/// ```
/// use tbd::core::types::BranchName;
///
/// let name = BranchName::new("feature/my-branch").unwrap();
/// assert_eq!(name.as_str(), "feature/my-branch");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new(".hidden").is_err());
/// assert!(BranchName::new("has space").is_err());
/// assert!(BranchName::new("@").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name == "@" {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be '@' (reserved)".into(),
            ));
        }
        if name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '-'".into(),
            ));
        }
        check_refname_rules(&name)
            .map_err(|rule| TypeError::InvalidBranchName(format!("branch name {rule}")))?;
        Ok(Self(name))
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Git object identifier (SHA-1 or SHA-256).
///
/// OIDs are normalized to lowercase for consistency.
///
/// # Example
///
/// ```
/// use tbd::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not a 40 or 64
    /// character hex id.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(
                "object id must be hexadecimal".into(),
            ));
        }
        Ok(Self(oid))
    }

    /// Get an abbreviated form of the OID.
    ///
    /// Returns the first `len` characters, or the full OID if shorter.
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    /// Check whether `prefix` abbreviates this id.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.0.starts_with(&prefix.to_ascii_lowercase())
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which stash slot of a branch a pin ref refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StashSlot {
    /// Changes stashed before a fuse or merge started.
    Fuse,
    /// Changes left behind when switching away from the branch.
    Switch,
}

impl StashSlot {
    fn as_str(self) -> &'static str {
        match self {
            StashSlot::Fuse => "fuse",
            StashSlot::Switch => "switch",
        }
    }
}

/// A validated Git reference name.
///
/// # Example
///
/// ```
/// use tbd::core::types::{BranchName, RefName, StashSlot};
///
/// let branch = BranchName::new("feature/foo").unwrap();
/// assert_eq!(RefName::for_branch(&branch).as_str(), "refs/heads/feature/foo");
/// assert_eq!(
///     RefName::for_branch_state(&branch).as_str(),
///     "refs/tbd/state/feature/foo"
/// );
/// assert_eq!(
///     RefName::for_stash(&branch, StashSlot::Switch).as_str(),
///     "refs/tbd/stash/feature/foo/switch"
/// );
/// assert_eq!(RefName::tracking().as_str(), "refs/tbd/tracking");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Prefix of local branch refs.
    pub const BRANCH_PREFIX: &'static str = "refs/heads/";

    /// Prefix of tag refs.
    pub const TAG_PREFIX: &'static str = "refs/tags/";

    /// Prefix of per-branch state records.
    pub const STATE_PREFIX: &'static str = "refs/tbd/state/";

    /// Prefix of stash pin refs.
    pub const STASH_PREFIX: &'static str = "refs/tbd/stash/";

    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_refname_rules(&name)
            .map_err(|rule| TypeError::InvalidRefName(format!("ref name {rule}")))?;
        Ok(Self(name))
    }

    /// Ref of a local branch (`refs/heads/<branch>`).
    pub fn for_branch(branch: &BranchName) -> Self {
        Self(format!("{}{}", Self::BRANCH_PREFIX, branch))
    }

    /// Ref of a tag (`refs/tags/<name>`).
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if `name` starts with `-` or the
    /// full ref violates Git's refname rules.
    pub fn for_tag(name: &str) -> Result<Self, TypeError> {
        if name.starts_with('-') {
            return Err(TypeError::InvalidRefName(
                "tag name cannot start with '-'".into(),
            ));
        }
        Self::new(format!("{}{}", Self::TAG_PREFIX, name))
    }

    /// Ref holding a branch's state record (`refs/tbd/state/<branch>`).
    pub fn for_branch_state(branch: &BranchName) -> Self {
        Self(format!("{}{}", Self::STATE_PREFIX, branch))
    }

    /// Ref pinning one of a branch's stashes
    /// (`refs/tbd/stash/<branch>/<slot>`).
    pub fn for_stash(branch: &BranchName, slot: StashSlot) -> Self {
        Self(format!("{}{}/{}", Self::STASH_PREFIX, branch, slot.as_str()))
    }

    /// Ref holding the repository's tracking record.
    pub fn tracking() -> Self {
        Self("refs/tbd/tracking".to_string())
    }

    /// Strip a prefix from the ref name and return the remainder.
    pub fn strip_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix)
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A working-copy path relative to the repository root.
///
/// Stored with `/` separators, without `.` or `..` components, and never
/// pointing into `.git`. Ordering is lexicographic, which keeps sets of
/// paths stable when serialized.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use tbd::core::types::RepoPath;
///
/// let root = Path::new("/repo");
/// let p = RepoPath::from_user_path(root, Path::new("/repo/src"), Path::new("../README.md")).unwrap();
/// assert_eq!(p.as_str(), "README.md");
///
/// assert!(RepoPath::new("").is_err());
/// assert!(RepoPath::new(".git/config").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoPath(String);

impl RepoPath {
    /// Create a validated root-relative path.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` for empty, absolute, non-normalized
    /// paths or paths inside `.git`.
    pub fn new(path: impl Into<String>) -> Result<Self, TypeError> {
        let path = path.into();
        if path.is_empty() {
            return Err(TypeError::InvalidPath("path cannot be empty".into()));
        }
        if path.starts_with('/') || path.ends_with('/') {
            return Err(TypeError::InvalidPath(format!(
                "'{path}' must be relative to the repository root"
            )));
        }
        for component in path.split('/') {
            match component {
                "" | "." | ".." => {
                    return Err(TypeError::InvalidPath(format!(
                        "'{path}' is not a normalized path"
                    )))
                }
                ".git" => {
                    return Err(TypeError::InvalidPath(format!(
                        "'{path}' is inside the git directory"
                    )))
                }
                _ => {}
            }
        }
        if path.contains('\0') {
            return Err(TypeError::InvalidPath("path contains NUL".into()));
        }
        Ok(Self(path))
    }

    /// Normalize a path given by the user into a root-relative path.
    ///
    /// `user_path` is interpreted relative to `cwd` unless absolute. `.` and
    /// `..` are resolved lexically; the result must stay inside `root`.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidPath` if the path escapes the repository or
    /// names the root itself.
    pub fn from_user_path(root: &Path, cwd: &Path, user_path: &Path) -> Result<Self, TypeError> {
        let joined = if user_path.is_absolute() {
            user_path.to_path_buf()
        } else {
            cwd.join(user_path)
        };

        let mut parts: Vec<String> = Vec::new();
        for component in joined.components() {
            use std::path::Component;
            match component {
                Component::Prefix(_) | Component::RootDir => parts.clear(),
                Component::CurDir => {}
                Component::ParentDir => {
                    parts.pop();
                }
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            }
        }

        let root_parts: Vec<String> = root
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if parts.len() <= root_parts.len() || parts[..root_parts.len()] != root_parts[..] {
            return Err(TypeError::InvalidPath(format!(
                "'{}' is outside the repository",
                user_path.display()
            )));
        }

        Self::new(parts[root_parts.len()..].join("/"))
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last component of the path.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Check whether this path equals `dir` or lies below it.
    pub fn is_within(&self, dir: &RepoPath) -> bool {
        self.0 == dir.0
            || (self.0.starts_with(dir.as_str()) && self.0.as_bytes().get(dir.0.len()) == Some(&b'/'))
    }

    /// Location of this path below `root` on disk.
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut full = root.to_path_buf();
        for component in self.0.split('/') {
            full.push(component);
        }
        full
    }
}

impl TryFrom<String> for RepoPath {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RepoPath> for String {
    fn from(path: RepoPath) -> Self {
        path.0
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A UTC timestamp in RFC3339 format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
