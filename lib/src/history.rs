// Copyright 2024 The gitdup Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reads the range of commits to duplicate from a [`Backend`].

#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;
use tracing::instrument;

use crate::backend::{Backend, BackendError, CommitId, TreeId};
use crate::commit::Commit;

/// Which of the revisions named by the caller a name was given for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Boundary {
    /// The old base. Excluded from the range along with its ancestors.
    Base,
    /// The tip. Included in the range.
    Tip,
    /// The commit the range is grafted onto.
    NewRoot,
}

impl fmt::Display for Boundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Base => write!(f, "old base"),
            Boundary::Tip => write!(f, "tip"),
            Boundary::NewRoot => write!(f, "new root"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RangeError {
    #[error("Could not resolve {boundary} {name:?} to a commit")]
    BoundaryResolution { boundary: Boundary, name: String },
    #[error("Nothing to duplicate: {tip} is reachable from {base}")]
    Empty { base: CommitId, tip: CommitId },
    #[error(transparent)]
    TreeMismatch(#[from] TreeMismatchError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// The trees of the old base and the new root differ.
#[derive(Debug, Error)]
#[error(
    "The old base {base} has tree {base_tree} but the new root {new_root} has tree \
     {new_root_tree}"
)]
pub struct TreeMismatchError {
    pub base: CommitId,
    pub base_tree: TreeId,
    pub new_root: CommitId,
    pub new_root_tree: TreeId,
}

/// Commits reachable from `tip` and not from `base`.
#[derive(Clone, Debug)]
pub struct DuplicationRange {
    base: CommitId,
    tip: CommitId,
    commits: Vec<Commit>,
}

impl DuplicationRange {
    /// Creates a range from already loaded commits. `commits` must be
    /// non-empty, must contain `tip`, and is expected in the store's native
    /// order (newest first).
    pub fn new(base: CommitId, tip: CommitId, commits: Vec<Commit>) -> Self {
        DuplicationRange { base, tip, commits }
    }

    pub fn base(&self) -> &CommitId {
        &self.base
    }

    pub fn tip(&self) -> &CommitId {
        &self.tip
    }

    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    pub fn into_commits(self) -> Vec<Commit> {
        self.commits
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }
}

/// Resolves a boundary name, mapping "not found" to
/// [`RangeError::BoundaryResolution`].
pub fn resolve_boundary(
    backend: &dyn Backend,
    boundary: Boundary,
    name: &str,
) -> Result<CommitId, RangeError> {
    backend
        .resolve_revision(name)?
        .ok_or_else(|| RangeError::BoundaryResolution {
            boundary,
            name: name.to_owned(),
        })
}

/// Reads the commits in `base_name..tip_name`.
#[instrument(skip(backend))]
pub fn read_range(
    backend: &dyn Backend,
    base_name: &str,
    tip_name: &str,
) -> Result<DuplicationRange, RangeError> {
    let base = resolve_boundary(backend, Boundary::Base, base_name)?;
    let tip = resolve_boundary(backend, Boundary::Tip, tip_name)?;
    read_range_by_id(backend, base, tip)
}

/// Like [`read_range()`], but with both boundaries already resolved.
pub fn read_range_by_id(
    backend: &dyn Backend,
    base: CommitId,
    tip: CommitId,
) -> Result<DuplicationRange, RangeError> {
    let ids = backend.list_range(&base, &tip)?;
    if ids.is_empty() {
        return Err(RangeError::Empty { base, tip });
    }
    tracing::debug!(count = ids.len(), %base, %tip, "listed duplication range");
    let commits = ids
        .iter()
        .map(|id| Commit::load(backend, id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DuplicationRange::new(base, tip, commits))
}

/// Checks that duplicating onto `new_root` doesn't need any content change,
/// i.e. that it has the same tree as `base`.
pub fn check_same_tree(
    backend: &dyn Backend,
    base: &CommitId,
    new_root: &CommitId,
) -> Result<(), RangeError> {
    let base_tree = backend.read_commit(base)?.root_tree;
    let new_root_tree = backend.read_commit(new_root)?.root_tree;
    if base_tree != new_root_tree {
        return Err(TreeMismatchError {
            base: base.clone(),
            base_tree,
            new_root: new_root.clone(),
            new_root_tree,
        }
        .into());
    }
    Ok(())
}
