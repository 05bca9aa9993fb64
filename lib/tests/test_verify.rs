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

use assert_matches::assert_matches;
use gitdup_lib::backend::{self, Backend, CommitId};
use gitdup_lib::commit::Commit;
use gitdup_lib::duplicate::{CommitterPolicy, ResolvedParent};
use gitdup_lib::verify::{verify_duplicate, Mismatch, VerificationError};
use testutils::test_backend::TestBackend;
use testutils::CommitGraphBuilder;

/// Writes a copy of `original` with `edit` applied.
fn write_copy(
    backend: &TestBackend,
    original: &CommitId,
    edit: impl FnOnce(&mut backend::Commit),
) -> CommitId {
    let mut contents = backend.read_commit(original).unwrap();
    edit(&mut contents);
    backend.write_commit(contents).unwrap()
}

fn mismatches(result: Result<(), VerificationError>) -> Vec<Mismatch> {
    match result {
        Err(VerificationError::Mismatch { mismatches, .. }) => mismatches,
        other => panic!("expected a mismatch, got {other:?}"),
    }
}

#[test]
fn test_verify_matching_duplicate() {
    let backend = TestBackend::new();
    let mut graph = CommitGraphBuilder::new(&backend);
    let base = graph.initial_commit();
    let commit_1 = graph.commit_with_parents(&[&base]);
    let new_root = graph.commit_with_parents(&[]);
    let duplicate = write_copy(&backend, &commit_1, |commit| {
        commit.parents = vec![new_root.clone()];
    });

    let original = Commit::load(&backend, &commit_1).unwrap();
    verify_duplicate(
        &backend,
        &original,
        &duplicate,
        &[ResolvedParent::Grafted(new_root.clone())],
        &CommitterPolicy::KeepOriginal,
    )
    .unwrap();
}

#[test]
fn test_verify_reports_every_mismatch() {
    let backend = TestBackend::new();
    let mut graph = CommitGraphBuilder::new(&backend);
    let base = graph.initial_commit();
    let commit_1 = graph.commit_with_parents(&[&base]);
    let new_root = graph.commit_with_parents(&[]);
    let duplicate = write_copy(&backend, &commit_1, |commit| {
        commit.description = "something else\n".into();
        commit.author.name = "Somebody Else".into();
        commit.parents = vec![new_root.clone(), base.clone()];
    });

    let original = Commit::load(&backend, &commit_1).unwrap();
    let result = verify_duplicate(
        &backend,
        &original,
        &duplicate,
        &[ResolvedParent::Grafted(new_root.clone())],
        &CommitterPolicy::KeepOriginal,
    );
    assert_eq!(
        mismatches(result),
        vec![
            Mismatch::Author,
            Mismatch::Description,
            Mismatch::ParentCount {
                expected: 1,
                actual: 2
            },
        ]
    );
}

#[test]
fn test_verify_parent_slots() {
    let backend = TestBackend::new();
    let mut graph = CommitGraphBuilder::new(&backend);
    let outside = graph.initial_commit();
    let base = graph.commit_with_parents(&[&outside]);
    let commit_1 = graph.commit_with_parents(&[&base]);
    let merge = graph.commit_with_parents(&[&commit_1, &outside]);
    let new_root = graph.commit_with_parents(&[]);
    let other_tree = backend.add_tree("other");
    // Stands in for the duplicate of commit_1, but with the wrong tree
    let bad_parent = graph.commit_with_tree(&[&new_root], other_tree);
    let duplicate = write_copy(&backend, &merge, |commit| {
        commit.parents = vec![bad_parent.clone(), new_root.clone()];
    });

    let original = Commit::load(&backend, &merge).unwrap();
    let result = verify_duplicate(
        &backend,
        &original,
        &duplicate,
        &[
            ResolvedParent::Remapped(bad_parent.clone()),
            ResolvedParent::Shared(outside.clone()),
        ],
        &CommitterPolicy::KeepOriginal,
    );
    assert_eq!(
        mismatches(result),
        vec![
            Mismatch::ParentTree { index: 0 },
            Mismatch::Parent { index: 1 },
        ]
    );
}

#[test]
fn test_verify_committer_override() {
    let backend = TestBackend::new();
    let mut graph = CommitGraphBuilder::new(&backend);
    let base = graph.initial_commit();
    let commit_1 = graph.commit_with_parents(&[&base]);
    let new_root = graph.commit_with_parents(&[]);
    let committer = testutils::user_settings().committer_signature();
    // Kept the original committer although a new one was asked for
    let duplicate = write_copy(&backend, &commit_1, |commit| {
        commit.parents = vec![new_root.clone()];
    });

    let original = Commit::load(&backend, &commit_1).unwrap();
    let result = verify_duplicate(
        &backend,
        &original,
        &duplicate,
        &[ResolvedParent::Grafted(new_root.clone())],
        &CommitterPolicy::Override(committer),
    );
    let err = result.unwrap_err();
    assert_matches!(&err, VerificationError::Mismatch { mismatches, .. }
        if mismatches == &[Mismatch::Committer]);
    let message = err.to_string();
    assert!(message.starts_with("Duplicate "), "{message}");
    assert!(message.ends_with(" does not match: committer differs"), "{message}");
}

#[test]
fn test_verify_missing_duplicate() {
    let backend = TestBackend::new();
    let mut graph = CommitGraphBuilder::new(&backend);
    let base = graph.initial_commit();
    let commit_1 = graph.commit_with_parents(&[&base]);

    let original = Commit::load(&backend, &commit_1).unwrap();
    let result = verify_duplicate(
        &backend,
        &original,
        &CommitId::from_hex("0123456789abcdef0123"),
        &[ResolvedParent::Grafted(base.clone())],
        &CommitterPolicy::KeepOriginal,
    );
    assert_matches!(
        result,
        Err(VerificationError::Backend(
            backend::BackendError::ObjectNotFound { .. }
        ))
    );
}

#[test]
fn test_verify_ignores_sub_second_committer_time() {
    let backend = TestBackend::new();
    let mut graph = CommitGraphBuilder::new(&backend);
    let base = graph.initial_commit();
    let commit_1 = graph.commit_with_parents(&[&base]);
    let new_root = graph.commit_with_parents(&[]);
    let stored = testutils::signature("Dup User", "dup@example.com", 1_000);
    let mut requested = stored.clone();
    requested.timestamp.timestamp.0 += 250;
    let duplicate = write_copy(&backend, &commit_1, |commit| {
        commit.parents = vec![new_root.clone()];
        commit.committer = stored.clone();
    });

    let original = Commit::load(&backend, &commit_1).unwrap();
    verify_duplicate(
        &backend,
        &original,
        &duplicate,
        &[ResolvedParent::Grafted(new_root.clone())],
        &CommitterPolicy::Override(requested),
    )
    .unwrap();
}
