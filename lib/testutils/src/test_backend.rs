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

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Debug, Error, Formatter};
use std::sync::{Mutex, MutexGuard};

use blake2::Blake2b512;
use digest::Digest;
use gitdup_lib::backend::{
    Backend, BackendError, BackendResult, Commit, CommitId, Signature, TreeId,
};
use gitdup_lib::dag_walk;
use gitdup_lib::object_id::ObjectId;

const HASH_LENGTH: usize = 10;

#[derive(Default)]
struct TestBackendData {
    commits: HashMap<CommitId, Commit>,
    trees: HashSet<TreeId>,
    refs: BTreeMap<String, CommitId>,
    writes: usize,
    fail_writes_after: Option<usize>,
}

fn hash_signature(hasher: &mut Blake2b512, signature: &Signature) {
    hash_bytes(hasher, &signature.name);
    hash_bytes(hasher, &signature.email);
    hasher.update(signature.timestamp.timestamp.0.to_le_bytes());
    hasher.update(signature.timestamp.tz_offset.to_le_bytes());
}

fn hash_bytes(hasher: &mut Blake2b512, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn get_hash(commit: &Commit) -> Vec<u8> {
    let mut hasher = Blake2b512::new();
    hasher.update((commit.parents.len() as u64).to_le_bytes());
    for parent in &commit.parents {
        hash_bytes(&mut hasher, parent.as_bytes());
    }
    hash_bytes(&mut hasher, commit.root_tree.as_bytes());
    hash_bytes(&mut hasher, &commit.description);
    hash_signature(&mut hasher, &commit.author);
    hash_signature(&mut hasher, &commit.committer);
    if let Some(encoding) = &commit.encoding {
        hash_bytes(&mut hasher, encoding.as_bytes());
    }
    hasher.finalize()[..HASH_LENGTH].to_vec()
}

/// An in-memory commit store for use in tests. It's meant to be strict, in
/// order to catch bugs where we make the wrong assumptions: a commit can only
/// be written if its tree was registered with [`TestBackend::add_tree()`] and
/// all its parents exist.
pub struct TestBackend {
    data: Mutex<TestBackendData>,
}

impl TestBackend {
    pub fn new() -> Self {
        TestBackend {
            data: Mutex::new(TestBackendData::default()),
        }
    }

    fn locked_data(&self) -> MutexGuard<'_, TestBackendData> {
        self.data.lock().unwrap()
    }

    /// Registers a tree. Trees have no contents here; two trees are equal
    /// iff they were registered under the same name.
    pub fn add_tree(&self, name: &str) -> TreeId {
        let mut hasher = Blake2b512::new();
        hash_bytes(&mut hasher, name.as_bytes());
        let id = TreeId::new(hasher.finalize()[..HASH_LENGTH].to_vec());
        self.locked_data().trees.insert(id.clone());
        id
    }

    pub fn set_ref(&self, name: &str, id: &CommitId) {
        self.locked_data().refs.insert(name.to_owned(), id.clone());
    }

    pub fn refs(&self) -> BTreeMap<String, CommitId> {
        self.locked_data().refs.clone()
    }

    pub fn commit_count(&self) -> usize {
        self.locked_data().commits.len()
    }

    pub fn contains_commit(&self, id: &CommitId) -> bool {
        self.locked_data().commits.contains_key(id)
    }

    /// Makes every write after the next `count` successful ones fail.
    pub fn fail_writes_after(&self, count: usize) {
        let mut data = self.locked_data();
        data.fail_writes_after = Some(data.writes + count);
    }
}

impl Default for TestBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for TestBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.debug_struct("TestBackend").finish_non_exhaustive()
    }
}

fn not_found(id: &CommitId) -> BackendError {
    BackendError::ObjectNotFound {
        object_type: id.object_type(),
        hash: id.hex(),
        source: "no such commit in test backend".into(),
    }
}

impl Backend for TestBackend {
    fn name(&self) -> &str {
        "test"
    }

    fn resolve_revision(&self, name: &str) -> BackendResult<Option<CommitId>> {
        let data = self.locked_data();
        if let Some(id) = data.refs.get(name) {
            return Ok(Some(id.clone()));
        }
        Ok(CommitId::try_from_hex(name).ok().filter(|id| data.commits.contains_key(id)))
    }

    fn list_range(&self, base: &CommitId, tip: &CommitId) -> BackendResult<Vec<CommitId>> {
        let data = self.locked_data();
        for id in [base, tip] {
            if !data.commits.contains_key(id) {
                return Err(not_found(id));
            }
        }
        let ancestors = |start: &CommitId| -> HashSet<CommitId> {
            dag_walk::dfs(
                [start.clone()],
                |id| id.clone(),
                |id| {
                    data.commits
                        .get(id)
                        .map(|commit| commit.parents.clone())
                        .unwrap_or_default()
                },
            )
            .collect()
        };
        let excluded = ancestors(base);
        let mut ids: Vec<CommitId> = ancestors(tip)
            .into_iter()
            .filter(|id| !excluded.contains(id))
            .collect();
        // Newest first, like `git rev-list`
        ids.sort_by(|a, b| {
            let a_time = data.commits[a].committer.timestamp.timestamp;
            let b_time = data.commits[b].committer.timestamp.timestamp;
            b_time.cmp(&a_time).then_with(|| b.cmp(a))
        });
        Ok(ids)
    }

    fn read_commit(&self, id: &CommitId) -> BackendResult<Commit> {
        self.locked_data()
            .commits
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    fn write_commit(&self, contents: Commit) -> BackendResult<CommitId> {
        let mut data = self.locked_data();
        if data
            .fail_writes_after
            .is_some_and(|limit| data.writes >= limit)
        {
            return Err(BackendError::WriteObject {
                object_type: "commit",
                source: "injected write failure".into(),
            });
        }
        if !data.trees.contains(&contents.root_tree) {
            return Err(BackendError::ObjectNotFound {
                object_type: contents.root_tree.object_type(),
                hash: contents.root_tree.hex(),
                source: "no such tree in test backend".into(),
            });
        }
        if let Some(missing) = contents
            .parents
            .iter()
            .find(|parent| !data.commits.contains_key(*parent))
        {
            return Err(not_found(missing));
        }
        let id = CommitId::new(get_hash(&contents));
        data.commits.insert(id.clone(), contents);
        data.writes += 1;
        Ok(id)
    }
}
