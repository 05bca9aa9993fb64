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

use std::fmt::Debug;

use bstr::BString;
use thiserror::Error;

use crate::object_id::id_type;

id_type!(
    /// Identifier of a commit in the backing store.
    pub CommitId
);
id_type!(
    /// Identifier of the root tree of a commit.
    pub TreeId
);

#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct MillisSinceEpoch(pub i64);

#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub timestamp: MillisSinceEpoch,
    // time zone offset in minutes
    pub tz_offset: i32,
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from_datetime(chrono::offset::Local::now())
    }

    pub fn from_datetime<Tz: chrono::TimeZone<Offset = chrono::offset::FixedOffset>>(
        datetime: chrono::DateTime<Tz>,
    ) -> Self {
        Self {
            timestamp: MillisSinceEpoch(datetime.timestamp_millis()),
            tz_offset: datetime.offset().local_minus_utc() / 60,
        }
    }
}

/// Represents a [`Commit`] signature. Name and email are kept as the bytes
/// stored in the object; they are only UTF-8 if the commit's encoding is.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Signature {
    pub name: BString,
    pub email: BString,
    pub timestamp: Timestamp,
}

/// Stored contents of a commit. The id is not part of it; see
/// [`crate::commit::Commit`] for the pair.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Commit {
    /// Parents in their significant order. The first one is the mainline.
    pub parents: Vec<CommitId>,
    pub root_tree: TreeId,
    /// The message exactly as stored, in `encoding`.
    pub description: BString,
    pub author: Signature,
    pub committer: Signature,
    /// Value of the commit's `encoding` header. `None` means UTF-8.
    pub encoding: Option<String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(
        "Invalid hash length for object of type {object_type} (expected {expected} bytes, got \
         {actual} bytes): {hash}"
    )]
    InvalidHashLength {
        expected: usize,
        actual: usize,
        object_type: String,
        hash: String,
    },
    #[error("Invalid {field} in {object_type} {hash}: {reason}")]
    InvalidField {
        object_type: String,
        hash: String,
        field: &'static str,
        reason: &'static str,
    },
    #[error("Object {hash} of type {object_type} not found")]
    ObjectNotFound {
        object_type: String,
        hash: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Error when reading object {hash} of type {object_type}")]
    ReadObject {
        object_type: String,
        hash: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Could not write object of type {object_type}")]
    WriteObject {
        object_type: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Error when resolving revision {name:?}")]
    ResolveRevision {
        name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Error when listing commits in {base}..{tip}")]
    ListRange {
        base: String,
        tip: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Error that may occur during backend initialization.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct BackendInitError(pub Box<dyn std::error::Error + Send + Sync>);

/// Read/write access to an append-only commit store.
///
/// Nothing in this crate ever asks a backend to move a reference. Objects
/// written through [`Backend::write_commit`] stay unreferenced until a caller
/// decides otherwise.
pub trait Backend: Send + Sync + Debug {
    /// A unique name that identifies this backend.
    fn name(&self) -> &str;

    /// Resolves a user-facing revision name (ref name, hex id, or whatever
    /// the store understands) to a commit. Returns `Ok(None)` if nothing
    /// matches.
    fn resolve_revision(&self, name: &str) -> BackendResult<Option<CommitId>>;

    /// Lists the commits reachable from `tip` but not from `base`, in the
    /// store's native order (newest first). Parents outside the range are not
    /// listed.
    fn list_range(&self, base: &CommitId, tip: &CommitId) -> BackendResult<Vec<CommitId>>;

    fn read_commit(&self, id: &CommitId) -> BackendResult<Commit>;

    /// Writes a new commit object and returns its id. Fails with
    /// [`BackendError::ObjectNotFound`] if the tree or any parent does not
    /// exist.
    fn write_commit(&self, contents: Commit) -> BackendResult<CommitId>;
}
