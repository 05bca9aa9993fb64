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

//! Orders a duplication range so that parents come before their children.

use std::collections::HashMap;

use itertools::Itertools as _;
use thiserror::Error;
use tracing::instrument;

use crate::backend::CommitId;
use crate::commit::Commit;
use crate::dag_walk;

/// The commits handed to the sequencer don't form a DAG.
#[derive(Debug, Error)]
#[error("Commit {commit_id} is part of a cycle in the commit graph")]
pub struct CycleDetectedError {
    /// A commit found on the cycle.
    pub commit_id: CommitId,
}

/// Returns `commits` ordered so that every parent that is itself one of
/// `commits` comes before its child. Other parents don't constrain the order.
///
/// `commits` is expected newest first, as the backend lists a range.
/// Unrelated commits then come out oldest first.
#[instrument(skip_all, fields(count = commits.len()))]
pub fn sequence_topologically(commits: Vec<Commit>) -> Result<Vec<Commit>, CycleDetectedError> {
    let in_range: HashMap<CommitId, Commit> = commits
        .iter()
        .map(|commit| (commit.id().clone(), commit.clone()))
        .collect();
    dag_walk::topo_order_forward_ok(
        commits,
        |commit| commit.id().clone(),
        |commit| {
            commit
                .parent_ids()
                .iter()
                .filter_map(|id| in_range.get(id))
                .cloned()
                .collect_vec()
        },
        |commit| CycleDetectedError {
            commit_id: commit.id().clone(),
        },
    )
}
