//! engine::tag
//!
//! Lightweight tags under `refs/tags/`.

use tracing::info;

use super::{Engine, EngineError};
use crate::core::types::{Oid, RefName};
use crate::git::Vcs;

/// A tag as listed by [`Engine::tag_list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    /// Name without the `refs/tags/` prefix.
    pub name: String,
    /// Object the tag points at.
    pub target: Oid,
}

fn tag_ref(name: &str) -> Result<RefName, EngineError> {
    RefName::for_tag(name).map_err(|_| EngineError::InvalidTagName(name.to_string()))
}

impl<'a, V: Vcs + ?Sized> Engine<'a, V> {
    /// Every tag, by name.
    pub fn tag_list(&self) -> Result<Vec<TagInfo>, EngineError> {
        let mut tags: Vec<TagInfo> = self
            .vcs
            .list_refs(RefName::TAG_PREFIX)?
            .into_iter()
            .filter_map(|(refname, target)| {
                let name = refname.strip_prefix(RefName::TAG_PREFIX)?.to_string();
                Some(TagInfo { name, target })
            })
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    /// Tag `commit` (HEAD by default) as `name`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidTagName`] for bad names
    /// - [`EngineError::TagExists`] if the tag exists
    /// - [`EngineError::InvalidCommit`] if `commit` names no commit
    pub fn tag_create(&self, name: &str, commit: Option<&str>) -> Result<Oid, EngineError> {
        let refname = tag_ref(name)?;
        if self.vcs.read_ref(&refname)?.is_some() {
            return Err(EngineError::TagExists(name.to_string()));
        }
        let revision = commit.unwrap_or("HEAD");
        let target = self
            .vcs
            .resolve_revision(revision)?
            .ok_or_else(|| EngineError::InvalidCommit(revision.to_string()))?;

        self.vcs
            .update_ref_cas(&refname, &target, None, &format!("tbd: tag {} at {}", name, revision))?;
        info!(tag = name, at = %target.short(7), "created tag");
        Ok(target)
    }

    /// Delete the tag `name`.
    pub fn tag_delete(&self, name: &str) -> Result<(), EngineError> {
        let refname = tag_ref(name).map_err(|_| EngineError::TagNotFound(name.to_string()))?;
        let target = self
            .vcs
            .read_ref(&refname)?
            .ok_or_else(|| EngineError::TagNotFound(name.to_string()))?;
        self.vcs.delete_ref_cas(&refname, &target)?;
        info!(tag = name, "deleted tag");
        Ok(())
    }
}
