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

#![allow(missing_docs)]

use std::cmp::Ordering;
use std::fmt::{Debug, Error, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bstr::BStr;

use crate::backend::{self, Backend, BackendResult, CommitId, Signature, TreeId};

/// A commit read from a [`Backend`], paired with its id.
#[derive(Clone)]
pub struct Commit {
    id: CommitId,
    data: Arc<backend::Commit>,
}

impl Debug for Commit {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.debug_struct("Commit").field("id", &self.id).finish()
    }
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Commit {}

impl Ord for Commit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl PartialOrd for Commit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Commit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Commit {
    pub fn new(id: CommitId, data: Arc<backend::Commit>) -> Self {
        Commit { id, data }
    }

    /// Reads the commit with the given id from `backend`.
    pub fn load(backend: &dyn Backend, id: &CommitId) -> BackendResult<Self> {
        let data = backend.read_commit(id)?;
        Ok(Commit::new(id.clone(), Arc::new(data)))
    }

    pub fn id(&self) -> &CommitId {
        &self.id
    }

    pub fn parent_ids(&self) -> &[CommitId] {
        &self.data.parents
    }

    pub fn tree_id(&self) -> &TreeId {
        &self.data.root_tree
    }

    pub fn description(&self) -> &BStr {
        self.data.description.as_ref()
    }

    /// The encoding of the description and signatures, if not UTF-8.
    pub fn encoding(&self) -> Option<&str> {
        self.data.encoding.as_deref()
    }

    pub fn author(&self) -> &Signature {
        &self.data.author
    }

    pub fn committer(&self) -> &Signature {
        &self.data.committer
    }

    pub fn store_commit(&self) -> &backend::Commit {
        &self.data
    }
}
