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

//! Reads a duplicate back from the store and compares it with its original.

#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

use crate::backend::{Backend, BackendError, CommitId, Signature};
use crate::commit::Commit;
use crate::duplicate::{CommitterPolicy, ResolvedParent};

/// One way a duplicate differs from what was intended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mismatch {
    Tree,
    Author,
    Description,
    Committer,
    ParentCount { expected: usize, actual: usize },
    Parent { index: usize },
    /// A remapped parent does not have the tree of the original parent.
    ParentTree { index: usize },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Tree => write!(f, "tree differs"),
            Mismatch::Author => write!(f, "author differs"),
            Mismatch::Description => write!(f, "message differs"),
            Mismatch::Committer => write!(f, "committer differs"),
            Mismatch::ParentCount { expected, actual } => {
                write!(f, "expected {expected} parents, found {actual}")
            }
            Mismatch::Parent { index } => write!(f, "parent #{index} differs"),
            Mismatch::ParentTree { index } => write!(f, "tree of parent #{index} differs"),
        }
    }
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error(
        "Duplicate {duplicate} of commit {original} does not match: {}",
        mismatches.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(", ")
    )]
    Mismatch {
        original: CommitId,
        duplicate: CommitId,
        mismatches: Vec<Mismatch>,
    },
    #[error("Could not read back duplicated commit")]
    Backend(#[from] BackendError),
}

// Git keeps whole seconds only.
fn same_signature(actual: &Signature, expected: &Signature) -> bool {
    let seconds = |signature: &Signature| signature.timestamp.timestamp.0.div_euclid(1000);
    actual.name == expected.name
        && actual.email == expected.email
        && actual.timestamp.tz_offset == expected.timestamp.tz_offset
        && seconds(actual) == seconds(expected)
}

/// Checks that `duplicate_id` has the contents of `original`, the
/// `expected_parents` in order, and the committer required by `committer`.
pub fn verify_duplicate(
    backend: &dyn Backend,
    original: &Commit,
    duplicate_id: &CommitId,
    expected_parents: &[ResolvedParent],
    committer: &CommitterPolicy,
) -> Result<(), VerificationError> {
    let duplicate = Commit::load(backend, duplicate_id)?;
    let mut mismatches = vec![];
    if duplicate.tree_id() != original.tree_id() {
        mismatches.push(Mismatch::Tree);
    }
    if !same_signature(duplicate.author(), original.author()) {
        mismatches.push(Mismatch::Author);
    }
    if duplicate.description() != original.description()
        || duplicate.encoding() != original.encoding()
    {
        mismatches.push(Mismatch::Description);
    }
    let expected_committer = match committer {
        CommitterPolicy::Override(signature) => signature,
        CommitterPolicy::KeepOriginal => original.committer(),
    };
    if !same_signature(duplicate.committer(), expected_committer) {
        mismatches.push(Mismatch::Committer);
    }

    let actual_parents = duplicate.parent_ids();
    if actual_parents.len() != expected_parents.len() {
        mismatches.push(Mismatch::ParentCount {
            expected: expected_parents.len(),
            actual: actual_parents.len(),
        });
    } else {
        for (index, (expected, actual)) in expected_parents.iter().zip(actual_parents).enumerate() {
            if expected.id() != actual {
                mismatches.push(Mismatch::Parent { index });
                continue;
            }
            if let ResolvedParent::Remapped(remapped) = expected {
                let original_parent = Commit::load(backend, &original.parent_ids()[index])?;
                let remapped_parent = Commit::load(backend, remapped)?;
                if original_parent.tree_id() != remapped_parent.tree_id() {
                    mismatches.push(Mismatch::ParentTree { index });
                }
            }
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(VerificationError::Mismatch {
            original: original.id().clone(),
            duplicate: duplicate_id.clone(),
            mismatches,
        })
    }
}
