use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use gix::ObjectId;
use gix::bstr::ByteSlice;
use gix::objs::tree::EntryKind;
use thiserror::Error;

use crate::classify::is_interface_path;

#[derive(Debug, Error)]
pub enum HistoryAccessError {
    #[error("failed to open repository {path}: {message}")]
    Open { path: String, message: String },
    #[error("invalid commit id '{0}'")]
    InvalidCommitId(String),
    #[error("object {id} is missing or unreadable: {message}")]
    MissingObject { id: String, message: String },
    #[error("failed to decode object {id}: {message}")]
    Decode { id: String, message: String },
    #[error("revision walk failed: {0}")]
    Walk(String),
}

/// Read-only view of one repository's commit history.
pub struct GitHistory {
    repo: gix::Repository,
    name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TreeEntry {
    id: ObjectId,
    kind: EntryKind,
}

impl TreeEntry {
    fn is_tree(self) -> bool {
        self.kind == EntryKind::Tree
    }
}

impl GitHistory {
    pub fn open(path: &Path) -> Result<Self, HistoryAccessError> {
        let repo = gix::open(path).map_err(|err| HistoryAccessError::Open {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            repo,
            name: repository_name(path),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Non-merge commits reachable from HEAD or any reference, newest first.
    /// `limit` keeps only the most recent ones.
    pub fn list_all_commits(&self, limit: Option<usize>) -> Result<Vec<String>, HistoryAccessError> {
        if limit == Some(0) {
            return Ok(Vec::new());
        }

        let tips = self.tips()?;
        if tips.is_empty() {
            return Ok(Vec::new());
        }

        let walk = self
            .repo
            .rev_walk(tips)
            .sorting(gix::revision::walk::Sorting::ByCommitTime(
                gix::traverse::commit::simple::CommitTimeOrder::NewestFirst,
            ))
            .all()
            .map_err(|err| HistoryAccessError::Walk(format!("failed to start revision walk: {err}")))?;

        let mut commits = Vec::new();
        for entry in walk {
            if limit.is_some_and(|limit| commits.len() >= limit) {
                break;
            }

            let info = entry.map_err(|err| {
                HistoryAccessError::Walk(format!("revision walk entry failed: {err}"))
            })?;
            let Ok(commit) = self.repo.find_commit(info.id) else {
                continue;
            };
            if commit.parent_ids().count() > 1 {
                continue;
            }
            commits.push(commit_hash(info.id));
        }

        Ok(commits)
    }

    /// Subset of [`Self::list_all_commits`] whose change set contains a path
    /// ending in `suffix`. Commits whose change set cannot be resolved are
    /// left out.
    pub fn list_interface_touching_commits(
        &self,
        suffix: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>, HistoryAccessError> {
        let commits = self
            .list_all_commits(limit)?
            .into_iter()
            .filter(|commit| {
                self.change_set(commit).is_ok_and(|paths| {
                    paths.iter().any(|path| is_interface_path(path, suffix))
                })
            })
            .collect();
        Ok(commits)
    }

    /// Paths touched by `commit`: every tracked path for a root commit,
    /// otherwise the paths whose entry differs from the first parent's tree.
    /// A rename contributes both its old and its new path.
    pub fn change_set(&self, commit: &str) -> Result<BTreeSet<String>, HistoryAccessError> {
        let id = ObjectId::from_hex(commit.trim().as_bytes())
            .map_err(|_| HistoryAccessError::InvalidCommitId(commit.to_owned()))?;

        let tree_id = self.commit_tree(id)?;
        let parent_tree = match self.first_parent(id)? {
            Some(parent_id) => Some(self.commit_tree(parent_id)?),
            None => None,
        };

        let mut paths = BTreeSet::new();
        self.diff_trees(parent_tree, Some(tree_id), "", &mut paths)?;
        Ok(paths)
    }

    /// Whether the HEAD tree tracks at least one interface file.
    pub fn has_interface_file(&self, suffix: &str) -> Result<bool, HistoryAccessError> {
        let Ok(head_id) = self.repo.head_id() else {
            return Ok(false);
        };

        let tree_id = self.commit_tree(head_id.detach())?;
        let mut paths = BTreeSet::new();
        self.diff_trees(None, Some(tree_id), "", &mut paths)?;
        Ok(paths.iter().any(|path| is_interface_path(path, suffix)))
    }

    fn tips(&self) -> Result<Vec<ObjectId>, HistoryAccessError> {
        let mut tips = BTreeSet::new();
        if let Ok(head_id) = self.repo.head_id() {
            tips.insert(head_id.detach());
        }

        let platform = self
            .repo
            .references()
            .map_err(|err| HistoryAccessError::Walk(format!("failed to list references: {err}")))?;
        let references = platform
            .all()
            .map_err(|err| HistoryAccessError::Walk(format!("failed to list references: {err}")))?;

        for reference in references {
            let Ok(mut reference) = reference else {
                continue;
            };
            #[allow(deprecated)]
            let Ok(id) = reference.peel_to_id_in_place() else {
                continue;
            };
            let id = id.detach();
            if self.repo.find_commit(id).is_ok() {
                tips.insert(id);
            }
        }

        Ok(tips.into_iter().collect())
    }

    fn commit_tree(&self, id: ObjectId) -> Result<ObjectId, HistoryAccessError> {
        let commit = self
            .repo
            .find_commit(id)
            .map_err(|err| missing_object(id, err))?;
        let tree_id = commit.tree_id().map_err(|err| decode_failure(id, err))?;
        Ok(tree_id.detach())
    }

    fn first_parent(&self, id: ObjectId) -> Result<Option<ObjectId>, HistoryAccessError> {
        let commit = self
            .repo
            .find_commit(id)
            .map_err(|err| missing_object(id, err))?;
        Ok(commit.parent_ids().next().map(|parent| parent.detach()))
    }

    fn tree_entries(&self, id: ObjectId) -> Result<BTreeMap<String, TreeEntry>, HistoryAccessError> {
        let tree = self
            .repo
            .find_tree(id)
            .map_err(|err| missing_object(id, err))?;
        let decoded = tree.decode().map_err(|err| decode_failure(id, err))?;

        Ok(decoded
            .entries
            .iter()
            .map(|entry| {
                (
                    entry.filename.to_str_lossy().into_owned(),
                    TreeEntry {
                        id: entry.oid.to_owned(),
                        kind: entry.mode.kind(),
                    },
                )
            })
            .collect())
    }

    /// Collects every non-tree path whose entry differs between the two
    /// trees. Identical subtrees are not descended into.
    fn diff_trees(
        &self,
        old: Option<ObjectId>,
        new: Option<ObjectId>,
        prefix: &str,
        out: &mut BTreeSet<String>,
    ) -> Result<(), HistoryAccessError> {
        if old == new {
            return Ok(());
        }

        let old_entries = match old {
            Some(id) => self.tree_entries(id)?,
            None => BTreeMap::new(),
        };
        let new_entries = match new {
            Some(id) => self.tree_entries(id)?,
            None => BTreeMap::new(),
        };

        let names = old_entries
            .keys()
            .chain(new_entries.keys())
            .collect::<BTreeSet<_>>();
        for name in names {
            let before = old_entries.get(name).copied();
            let after = new_entries.get(name).copied();
            if before == after {
                continue;
            }

            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };

            let old_subtree = before.filter(|entry| entry.is_tree()).map(|entry| entry.id);
            let new_subtree = after.filter(|entry| entry.is_tree()).map(|entry| entry.id);
            let leaf_changed = before.is_some_and(|entry| !entry.is_tree())
                || after.is_some_and(|entry| !entry.is_tree());

            if old_subtree.is_some() || new_subtree.is_some() {
                self.diff_trees(old_subtree, new_subtree, &path, out)?;
            }
            if leaf_changed {
                out.insert(path);
            }
        }

        Ok(())
    }
}

/// Name a repository is reported under: the last component of `path` as
/// given, so symlinked checkouts keep the name they were discovered by.
/// Paths without one, such as `.`, are resolved first.
pub fn repository_name(path: &Path) -> String {
    if let Some(name) = path.file_name() {
        return name.to_string_lossy().into_owned();
    }
    path.canonicalize()
        .ok()
        .and_then(|resolved| {
            resolved
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| path.display().to_string())
}

fn commit_hash(id: ObjectId) -> String {
    id.to_string().to_ascii_lowercase()
}

fn missing_object(id: ObjectId, err: impl std::fmt::Display) -> HistoryAccessError {
    HistoryAccessError::MissingObject {
        id: commit_hash(id),
        message: err.to_string(),
    }
}

fn decode_failure(id: ObjectId, err: impl std::fmt::Display) -> HistoryAccessError {
    HistoryAccessError::Decode {
        id: commit_hash(id),
        message: err.to_string(),
    }
}
