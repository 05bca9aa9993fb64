// Copyright 2020 The gitdup Authors
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

use std::fmt::{Debug, Error, Formatter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use bstr::BString;
use itertools::Itertools as _;
use tracing::instrument;

use crate::backend::{
    Backend, BackendError, BackendInitError, BackendResult, Commit, CommitId, MillisSinceEpoch,
    Signature, Timestamp, TreeId,
};
use crate::object_id::ObjectId;

const HASH_LENGTH: usize = 20;

/// A [`Backend`] on top of an existing Git repository.
///
/// Commits are written as loose objects. No reference (not even `HEAD`) is
/// ever created or moved.
pub struct GitBackend {
    repo: Mutex<git2::Repository>,
}

impl GitBackend {
    pub fn name() -> &'static str {
        "git"
    }

    pub fn from_repo(repo: git2::Repository) -> Self {
        GitBackend {
            repo: Mutex::new(repo),
        }
    }

    /// Opens the repository at exactly `path`.
    pub fn open(path: &Path) -> Result<Self, BackendInitError> {
        let repo = git2::Repository::open(path).map_err(|err| BackendInitError(err.into()))?;
        Ok(GitBackend::from_repo(repo))
    }

    /// Opens the repository containing `path`, searching parent directories
    /// like `git` itself does.
    pub fn discover(path: &Path) -> Result<Self, BackendInitError> {
        let repo = git2::Repository::discover(path).map_err(|err| BackendInitError(err.into()))?;
        Ok(GitBackend::from_repo(repo))
    }

    pub fn git_repo(&self) -> MutexGuard<'_, git2::Repository> {
        self.repo.lock().unwrap()
    }
}

impl Debug for GitBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.debug_struct("GitBackend")
            .field("path", &self.git_repo().path())
            .finish()
    }
}

fn signature_from_git(
    signature: &git2::Signature,
    id: &CommitId,
    field: &'static str,
) -> BackendResult<Signature> {
    let when = signature.when();
    let millis = when
        .seconds()
        .checked_mul(1000)
        .ok_or_else(|| BackendError::InvalidField {
            object_type: id.object_type(),
            hash: id.hex(),
            field,
            reason: "timestamp out of range",
        })?;
    Ok(Signature {
        name: signature.name_bytes().into(),
        email: signature.email_bytes().into(),
        timestamp: Timestamp {
            timestamp: MillisSinceEpoch(millis),
            tz_offset: when.offset_minutes(),
        },
    })
}

fn has_header_breaking_byte(bytes: &[u8]) -> bool {
    bytes.iter().any(|b| matches!(b, b'<' | b'>' | b'\n' | b'\0'))
}

/// Appends an `author` or `committer` line the way git writes it. Name and
/// email are copied byte for byte.
fn encode_signature(buf: &mut Vec<u8>, header: &str, signature: &Signature) -> BackendResult<()> {
    if has_header_breaking_byte(&signature.name) || has_header_breaking_byte(&signature.email) {
        return Err(BackendError::WriteObject {
            object_type: "commit",
            source: format!("{header} name or email contains '<', '>', NUL or a newline").into(),
        });
    }
    let seconds = signature.timestamp.timestamp.0.div_euclid(1000);
    let tz_offset = signature.timestamp.tz_offset;
    let sign = if tz_offset < 0 { '-' } else { '+' };
    let tz_offset = tz_offset.unsigned_abs();
    buf.extend_from_slice(header.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(&signature.name);
    buf.extend_from_slice(b" <");
    buf.extend_from_slice(&signature.email);
    buf.extend_from_slice(b"> ");
    let time = format!("{seconds} {sign}{:02}{:02}\n", tz_offset / 60, tz_offset % 60);
    buf.extend_from_slice(time.as_bytes());
    Ok(())
}

/// Serializes a commit object. Only the headers git itself needs are
/// written; the message follows the blank line unchanged.
fn encode_commit(
    contents: &Commit,
    tree: git2::Oid,
    parents: &[git2::Oid],
) -> BackendResult<Vec<u8>> {
    let mut buf = format!("tree {tree}\n").into_bytes();
    for parent in parents {
        buf.extend_from_slice(format!("parent {parent}\n").as_bytes());
    }
    encode_signature(&mut buf, "author", &contents.author)?;
    encode_signature(&mut buf, "committer", &contents.committer)?;
    if let Some(encoding) = &contents.encoding {
        if has_header_breaking_byte(encoding.as_bytes()) {
            return Err(BackendError::WriteObject {
                object_type: "commit",
                source: format!("invalid encoding name {encoding:?}").into(),
            });
        }
        buf.extend_from_slice(format!("encoding {encoding}\n").as_bytes());
    }
    buf.push(b'\n');
    buf.extend_from_slice(&contents.description);
    Ok(buf)
}

fn validate_git_object_id(id: &impl ObjectId) -> Result<git2::Oid, BackendError> {
    if id.as_bytes().len() != HASH_LENGTH {
        return Err(BackendError::InvalidHashLength {
            expected: HASH_LENGTH,
            actual: id.as_bytes().len(),
            object_type: id.object_type(),
            hash: id.hex(),
        });
    }
    git2::Oid::from_bytes(id.as_bytes()).map_err(|err| BackendError::ReadObject {
        object_type: id.object_type(),
        hash: id.hex(),
        source: Box::new(err),
    })
}

fn map_not_found_err(err: git2::Error, id: &impl ObjectId) -> BackendError {
    if err.code() == git2::ErrorCode::NotFound {
        BackendError::ObjectNotFound {
            object_type: id.object_type(),
            hash: id.hex(),
            source: Box::new(err),
        }
    } else {
        BackendError::ReadObject {
            object_type: id.object_type(),
            hash: id.hex(),
            source: Box::new(err),
        }
    }
}

fn to_write_err(err: git2::Error) -> BackendError {
    BackendError::WriteObject {
        object_type: "commit",
        source: Box::new(err),
    }
}

impl Backend for GitBackend {
    fn name(&self) -> &str {
        Self::name()
    }

    fn resolve_revision(&self, name: &str) -> BackendResult<Option<CommitId>> {
        let repo = self.git_repo();
        let to_resolve_err = |err: git2::Error| BackendError::ResolveRevision {
            name: name.to_owned(),
            source: Box::new(err),
        };
        let object = match repo.revparse_single(name) {
            Ok(object) => object,
            Err(err)
                if matches!(
                    err.code(),
                    git2::ErrorCode::NotFound
                        | git2::ErrorCode::InvalidSpec
                        | git2::ErrorCode::UnbornBranch
                ) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(to_resolve_err(err)),
        };
        let commit = match object.peel_to_commit() {
            Ok(commit) => commit,
            // Names a tree or blob
            Err(err)
                if matches!(
                    err.code(),
                    git2::ErrorCode::InvalidSpec | git2::ErrorCode::Peel
                ) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(to_resolve_err(err)),
        };
        Ok(Some(CommitId::from_bytes(commit.id().as_bytes())))
    }

    #[instrument(skip(self))]
    fn list_range(&self, base: &CommitId, tip: &CommitId) -> BackendResult<Vec<CommitId>> {
        let base_oid = validate_git_object_id(base)?;
        let tip_oid = validate_git_object_id(tip)?;
        let to_list_err = |err: git2::Error| BackendError::ListRange {
            base: base.hex(),
            tip: tip.hex(),
            source: Box::new(err),
        };
        let repo = self.git_repo();
        let mut revwalk = repo.revwalk().map_err(to_list_err)?;
        revwalk.set_sorting(git2::Sort::TIME).map_err(to_list_err)?;
        revwalk.push(tip_oid).map_err(to_list_err)?;
        revwalk.hide(base_oid).map_err(to_list_err)?;
        let ids: Vec<CommitId> = revwalk
            .map_ok(|oid| CommitId::from_bytes(oid.as_bytes()))
            .try_collect()
            .map_err(to_list_err)?;
        Ok(ids)
    }

    fn read_commit(&self, id: &CommitId) -> BackendResult<Commit> {
        let oid = validate_git_object_id(id)?;
        let repo = self.git_repo();
        let commit = repo.find_commit(oid).map_err(|err| map_not_found_err(err, id))?;
        let parents = commit
            .parent_ids()
            .map(|oid| CommitId::from_bytes(oid.as_bytes()))
            .collect_vec();
        let root_tree = TreeId::from_bytes(commit.tree_id().as_bytes());
        let description = BString::from(commit.message_raw_bytes());
        let encoding = commit.message_encoding().map(str::to_owned);
        let author = signature_from_git(&commit.author(), id, "author")?;
        let committer = signature_from_git(&commit.committer(), id, "committer")?;
        Ok(Commit {
            parents,
            root_tree,
            description,
            author,
            committer,
            encoding,
        })
    }

    fn write_commit(&self, contents: Commit) -> BackendResult<CommitId> {
        let repo = self.git_repo();
        let tree_oid = validate_git_object_id(&contents.root_tree)?;
        repo.find_tree(tree_oid)
            .map_err(|err| map_not_found_err(err, &contents.root_tree))?;
        let parent_oids: Vec<git2::Oid> = contents
            .parents
            .iter()
            .map(|parent_id| {
                let oid = validate_git_object_id(parent_id)?;
                repo.find_commit(oid)
                    .map(|_| oid)
                    .map_err(|err| map_not_found_err(err, parent_id))
            })
            .try_collect()?;
        let buf = encode_commit(&contents, tree_oid, &parent_oids)?;
        let odb = repo.odb().map_err(to_write_err)?;
        let oid = odb
            .write(git2::ObjectType::Commit, &buf)
            .map_err(to_write_err)?;
        Ok(CommitId::from_bytes(oid.as_bytes()))
    }
}
