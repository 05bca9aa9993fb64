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

//! Writes a duplicate of every commit in a range onto a new root.
//!
//! The trees are never touched: a duplicate has the tree, author and message
//! of its original, a committer chosen by [`CommitterPolicy`], and parents
//! chosen by [`ParentPolicy`]. Because the old base and the new root are
//! required to have the same tree, no merge is ever needed.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::mem;

use indexmap::IndexMap;
use itertools::Itertools as _;
use thiserror::Error;
use tracing::instrument;

use crate::backend::{self, Backend, BackendError, CommitId, Signature};
use crate::commit::Commit;
use crate::history::DuplicationRange;
use crate::sequencer::{sequence_topologically, CycleDetectedError};
use crate::verify::{verify_duplicate, VerificationError};

/// Maps original commits to their duplicates. Only commits of the range are
/// ever keys, and every key is inserted once.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemapTable {
    map: IndexMap<CommitId, CommitId>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, original: &CommitId) -> Option<&CommitId> {
        self.map.get(original)
    }

    pub fn contains(&self, original: &CommitId) -> bool {
        self.map.contains_key(original)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over `(original, duplicate)` pairs in the order they were
    /// written.
    pub fn iter(&self) -> impl Iterator<Item = (&CommitId, &CommitId)> {
        self.map.iter()
    }

    fn insert(&mut self, original: CommitId, duplicate: CommitId) -> Result<(), DuplicateError> {
        if self.map.contains_key(&original) {
            return Err(DuplicateError::AlreadyDuplicated { commit_id: original });
        }
        self.map.insert(original, duplicate);
        Ok(())
    }
}

/// Where a parent of a duplicate points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedParent {
    /// The parent was in the range; this is its duplicate.
    Remapped(CommitId),
    /// The parent was the old base, or (when isolating) any commit outside
    /// the range; this is the new root.
    Grafted(CommitId),
    /// The parent is outside the range and is shared with the original
    /// history.
    Shared(CommitId),
}

impl ResolvedParent {
    pub fn id(&self) -> &CommitId {
        match self {
            ResolvedParent::Remapped(id)
            | ResolvedParent::Grafted(id)
            | ResolvedParent::Shared(id) => id,
        }
    }

    pub fn into_id(self) -> CommitId {
        match self {
            ResolvedParent::Remapped(id)
            | ResolvedParent::Grafted(id)
            | ResolvedParent::Shared(id) => id,
        }
    }
}

/// Decides the parents of duplicates.
#[derive(Clone, Debug)]
pub struct ParentPolicy {
    base: CommitId,
    new_root: CommitId,
    isolate: bool,
}

impl ParentPolicy {
    pub fn new(base: CommitId, new_root: CommitId, isolate: bool) -> Self {
        ParentPolicy {
            base,
            new_root,
            isolate,
        }
    }

    /// Resolves one parent slot of an original commit.
    ///
    /// `parent` must not be a commit of the range that is still waiting to be
    /// duplicated; the engine checks that before asking.
    pub fn resolve(&self, parent: &CommitId, table: &RemapTable) -> ResolvedParent {
        if let Some(duplicate) = table.get(parent) {
            ResolvedParent::Remapped(duplicate.clone())
        } else if *parent == self.base {
            ResolvedParent::Grafted(self.new_root.clone())
        } else if self.isolate {
            ResolvedParent::Grafted(self.new_root.clone())
        } else {
            ResolvedParent::Shared(parent.clone())
        }
    }
}

/// Who is recorded as the committer of a duplicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitterPolicy {
    /// Use this signature (normally the current user and time) for every
    /// duplicate.
    Override(Signature),
    /// Copy the committer of the original commit.
    KeepOriginal,
}

impl CommitterPolicy {
    fn committer_for(&self, original: &Commit) -> Signature {
        match self {
            CommitterPolicy::Override(signature) => signature.clone(),
            CommitterPolicy::KeepOriginal => original.committer().clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DuplicateOptions {
    /// The commit the range is grafted onto. Must have the same tree as the
    /// old base.
    pub new_root: CommitId,
    /// Point parents outside the range at `new_root` instead of sharing them.
    pub isolate: bool,
    pub committer: CommitterPolicy,
    /// Read back every duplicate and check it against its original.
    pub verify: bool,
}

/// Reported after each duplicate is written.
#[derive(Clone, Debug)]
pub struct DuplicateProgress<'a> {
    pub processed: usize,
    pub total: usize,
    pub original: &'a CommitId,
    pub duplicate: &'a CommitId,
}

/// Lifecycle of a [`DuplicationEngine`]. There is no way back to an earlier
/// state; a failed run needs a new engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Sequenced,
    /// The number of commits duplicated so far.
    Processing(usize),
    Done,
    Aborted,
}

#[derive(Debug, Error)]
pub enum DuplicateError {
    #[error(transparent)]
    Cycle(#[from] CycleDetectedError),
    #[error("Failed to duplicate commit {commit_id}")]
    Backend {
        commit_id: CommitId,
        source: BackendError,
    },
    #[error(
        "Parent {parent_id} of commit {commit_id} is in the range but has not been duplicated \
         yet"
    )]
    ParentNotDuplicated {
        commit_id: CommitId,
        parent_id: CommitId,
    },
    #[error("Commit {commit_id} was duplicated twice")]
    AlreadyDuplicated { commit_id: CommitId },
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error("Cannot {action} a duplication engine in state {state:?}")]
    InvalidState {
        action: &'static str,
        state: EngineState,
    },
}

/// The tip of the range has no duplicate.
#[derive(Debug, Error)]
#[error("The tip {tip} was not duplicated")]
pub struct IncompleteRangeError {
    pub tip: CommitId,
}

/// Result of a completed run.
#[derive(Clone, Debug)]
pub struct DuplicatedHistory {
    tip: CommitId,
    table: RemapTable,
}

impl DuplicatedHistory {
    pub fn original_tip(&self) -> &CommitId {
        &self.tip
    }

    /// The duplicate of the range's tip. This is the only thing a caller
    /// normally reports.
    pub fn new_tip(&self) -> Result<&CommitId, IncompleteRangeError> {
        self.table.get(&self.tip).ok_or_else(|| IncompleteRangeError {
            tip: self.tip.clone(),
        })
    }

    pub fn remap_table(&self) -> &RemapTable {
        &self.table
    }
}

/// Duplicates one range. Create it, [`sequence`](Self::sequence) a range,
/// then [`run`](Self::run) it.
pub struct DuplicationEngine<'a> {
    backend: &'a dyn Backend,
    options: DuplicateOptions,
    state: EngineState,
    base: Option<CommitId>,
    tip: Option<CommitId>,
    sequence: Vec<Commit>,
    in_range: HashSet<CommitId>,
    table: RemapTable,
}

impl<'a> DuplicationEngine<'a> {
    pub fn new(backend: &'a dyn Backend, options: DuplicateOptions) -> Self {
        DuplicationEngine {
            backend,
            options,
            state: EngineState::Idle,
            base: None,
            tip: None,
            sequence: vec![],
            in_range: HashSet::new(),
            table: RemapTable::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn options(&self) -> &DuplicateOptions {
        &self.options
    }

    /// Duplicates written so far. Still readable after an abort.
    pub fn remap_table(&self) -> &RemapTable {
        &self.table
    }

    /// Orders the range parents-first.
    pub fn sequence(&mut self, range: DuplicationRange) -> Result<(), DuplicateError> {
        self.expect_state(EngineState::Idle, "sequence")?;
        let base = range.base().clone();
        let tip = range.tip().clone();
        let sequence = match sequence_topologically(range.into_commits()) {
            Ok(sequence) => sequence,
            Err(err) => {
                self.state = EngineState::Aborted;
                return Err(err.into());
            }
        };
        self.in_range = sequence.iter().map(|commit| commit.id().clone()).collect();
        self.sequence = sequence;
        self.base = Some(base);
        self.tip = Some(tip);
        self.state = EngineState::Sequenced;
        Ok(())
    }

    /// Writes all duplicates. Stops at the first failure; commits written
    /// before it stay in the store, unreferenced.
    #[instrument(skip_all, fields(total = self.sequence.len(), backend = self.backend.name()))]
    pub fn run(
        &mut self,
        mut observer: Option<&mut dyn FnMut(&DuplicateProgress)>,
    ) -> Result<DuplicatedHistory, DuplicateError> {
        self.expect_state(EngineState::Sequenced, "run")?;
        let (Some(base), Some(tip)) = (self.base.take(), self.tip.take()) else {
            return Err(DuplicateError::InvalidState {
                action: "run",
                state: self.state,
            });
        };
        let policy = ParentPolicy::new(base, self.options.new_root.clone(), self.options.isolate);
        let sequence = mem::take(&mut self.sequence);
        let total = sequence.len();
        self.state = EngineState::Processing(0);
        for (index, original) in sequence.iter().enumerate() {
            let duplicate = match self.duplicate_one(&policy, original) {
                Ok(duplicate) => duplicate,
                Err(err) => {
                    tracing::debug!(commit = %original.id(), ?err, "aborting duplication");
                    self.state = EngineState::Aborted;
                    return Err(err);
                }
            };
            self.state = EngineState::Processing(index + 1);
            if let Some(observer) = observer.as_deref_mut() {
                observer(&DuplicateProgress {
                    processed: index + 1,
                    total,
                    original: original.id(),
                    duplicate: &duplicate,
                });
            }
        }
        self.state = EngineState::Done;
        Ok(DuplicatedHistory {
            tip,
            table: mem::take(&mut self.table),
        })
    }

    fn duplicate_one(
        &mut self,
        policy: &ParentPolicy,
        original: &Commit,
    ) -> Result<CommitId, DuplicateError> {
        let parents: Vec<ResolvedParent> = original
            .parent_ids()
            .iter()
            .map(|parent_id| {
                if self.in_range.contains(parent_id) && !self.table.contains(parent_id) {
                    return Err(DuplicateError::ParentNotDuplicated {
                        commit_id: original.id().clone(),
                        parent_id: parent_id.clone(),
                    });
                }
                Ok(policy.resolve(parent_id, &self.table))
            })
            .try_collect()?;
        let contents = backend::Commit {
            parents: parents.iter().map(|parent| parent.id().clone()).collect(),
            root_tree: original.tree_id().clone(),
            description: original.description().to_owned(),
            author: original.author().clone(),
            committer: self.options.committer.committer_for(original),
            encoding: original.encoding().map(str::to_owned),
        };
        let duplicate =
            self.backend
                .write_commit(contents)
                .map_err(|source| DuplicateError::Backend {
                    commit_id: original.id().clone(),
                    source,
                })?;
        tracing::trace!(original = %original.id(), %duplicate, "duplicated commit");
        self.table.insert(original.id().clone(), duplicate.clone())?;
        if self.options.verify {
            verify_duplicate(
                self.backend,
                original,
                &duplicate,
                &parents,
                &self.options.committer,
            )?;
        }
        Ok(duplicate)
    }

    fn expect_state(
        &self,
        expected: EngineState,
        action: &'static str,
    ) -> Result<(), DuplicateError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DuplicateError::InvalidState {
                action,
                state: self.state,
            })
        }
    }
}

/// Sequences and duplicates `range` in one go.
pub fn duplicate_range(
    backend: &dyn Backend,
    range: DuplicationRange,
    options: DuplicateOptions,
    observer: Option<&mut dyn FnMut(&DuplicateProgress)>,
) -> Result<DuplicatedHistory, DuplicateError> {
    let mut engine = DuplicationEngine::new(backend, options);
    engine.sequence(range)?;
    engine.run(observer)
}
