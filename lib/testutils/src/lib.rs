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

use std::env;
use std::fs;
use std::path::Path;
use std::sync::Once;

use gitdup_lib::backend::{
    self, Backend, CommitId, MillisSinceEpoch, Signature, Timestamp, TreeId,
};
use gitdup_lib::settings::UserSettings;
use itertools::Itertools as _;
use tempfile::TempDir;

use crate::test_backend::TestBackend;

pub mod test_backend;

pub fn hermetic_libgit2() {
    // libgit2 respects init.defaultBranch (and possibly other config
    // variables) in the user's config files. Disable access to them to make
    // our tests hermetic.
    //
    // set_search_path is unsafe because it cannot guarantee thread safety (as
    // its documentation states). For the same reason, we wrap these invocations
    // in `call_once`.
    static CONFIGURE_GIT2: Once = Once::new();
    CONFIGURE_GIT2.call_once(|| unsafe {
        git2::opts::set_search_path(git2::ConfigLevel::System, "").unwrap();
        git2::opts::set_search_path(git2::ConfigLevel::Global, "").unwrap();
        git2::opts::set_search_path(git2::ConfigLevel::XDG, "").unwrap();
        git2::opts::set_search_path(git2::ConfigLevel::ProgramData, "").unwrap();
    });

    env::set_var("GIT_CONFIG_SYSTEM", "/dev/null");
    env::set_var("GIT_CONFIG_GLOBAL", "/dev/null");
}

pub fn new_temp_dir() -> TempDir {
    hermetic_libgit2();
    tempfile::Builder::new()
        .prefix("gitdup-test-")
        .tempdir()
        .unwrap()
}

pub fn base_config() -> config::ConfigBuilder<config::builder::DefaultState> {
    config::Config::builder().add_source(config::File::from_str(
        r#"
            user.name = "Test User"
            user.email = "test.user@example.com"
            user.timestamp = "2001-02-03T04:05:06+07:00"
        "#,
        config::FileFormat::Toml,
    ))
}

pub fn user_settings() -> UserSettings {
    let config = base_config().build().unwrap();
    UserSettings::from_config(config).unwrap()
}

/// A signature at `seconds` after the epoch, in UTC.
pub fn signature(name: &str, email: &str, seconds: i64) -> Signature {
    Signature {
        name: name.into(),
        email: email.into(),
        timestamp: Timestamp {
            timestamp: MillisSinceEpoch(seconds * 1000),
            tz_offset: 0,
        },
    }
}

/// Writes commits to a [`TestBackend`] with distinct messages and increasing
/// timestamps.
pub struct CommitGraphBuilder<'backend> {
    backend: &'backend TestBackend,
    tree: TreeId,
    counter: i64,
}

impl<'backend> CommitGraphBuilder<'backend> {
    /// All commits get the same tree unless written with
    /// [`CommitGraphBuilder::commit_with_tree()`].
    pub fn new(backend: &'backend TestBackend) -> Self {
        let tree = backend.add_tree("shared");
        CommitGraphBuilder {
            backend,
            tree,
            counter: 0,
        }
    }

    pub fn tree(&self) -> &TreeId {
        &self.tree
    }

    pub fn initial_commit(&mut self) -> CommitId {
        self.commit_with_parents(&[])
    }

    pub fn commit_with_parents(&mut self, parents: &[&CommitId]) -> CommitId {
        let tree = self.tree.clone();
        self.commit_with_tree(parents, tree)
    }

    pub fn commit_with_tree(&mut self, parents: &[&CommitId], tree: TreeId) -> CommitId {
        self.counter += 1;
        let contents = backend::Commit {
            parents: parents.iter().map(|&id| id.clone()).collect_vec(),
            root_tree: tree,
            description: format!("commit {}\n", self.counter).into(),
            author: signature("Some Author", "author@example.com", self.counter * 10),
            committer: signature("Some Committer", "committer@example.com", self.counter * 10),
            encoding: None,
        };
        self.backend.write_commit(contents).unwrap()
    }
}

/// Creates a non-bare repository with no commits.
pub fn git_init(path: &Path) -> git2::Repository {
    hermetic_libgit2();
    git2::Repository::init(path).unwrap()
}

/// Writes a tree with the given top-level files.
pub fn git_tree(repo: &git2::Repository, files: &[(&str, &str)]) -> git2::Oid {
    let mut builder = repo.treebuilder(None).unwrap();
    for (name, contents) in files {
        let blob = repo.blob(contents.as_bytes()).unwrap();
        builder.insert(name, blob, 0o100644).unwrap();
    }
    builder.write().unwrap()
}

/// Writes a commit without updating any reference. `seconds` is used for both
/// author and committer time.
pub fn git_commit(
    repo: &git2::Repository,
    parents: &[git2::Oid],
    tree: git2::Oid,
    message: &str,
    seconds: i64,
) -> git2::Oid {
    let signature =
        git2::Signature::new("Git User", "git.user@example.com", &git2::Time::new(seconds, 0))
            .unwrap();
    let tree = repo.find_tree(tree).unwrap();
    let parents = parents
        .iter()
        .map(|oid| repo.find_commit(*oid).unwrap())
        .collect_vec();
    let parent_refs = parents.iter().collect_vec();
    repo.commit(None, &signature, &signature, message, &tree, &parent_refs)
        .unwrap()
}

/// Writes `raw` as a commit object as is. Lets tests create commits that
/// libgit2's commit API refuses to write, such as ones in a legacy encoding.
pub fn git_write_raw_commit(repo: &git2::Repository, raw: &[u8]) -> git2::Oid {
    repo.odb()
        .unwrap()
        .write(git2::ObjectType::Commit, raw)
        .unwrap()
}

pub fn git_set_branch(repo: &git2::Repository, name: &str, target: git2::Oid) {
    repo.reference(&format!("refs/heads/{name}"), target, true, "test")
        .unwrap();
}

pub fn git_commit_id(oid: git2::Oid) -> CommitId {
    CommitId::from_bytes(oid.as_bytes())
}

/// Every reference in the repository with its target, sorted by name.
pub fn git_refs(repo: &git2::Repository) -> Vec<(String, Option<git2::Oid>)> {
    repo.references()
        .unwrap()
        .map(|reference| {
            let reference = reference.unwrap();
            (reference.name().unwrap().to_owned(), reference.target())
        })
        .sorted()
        .collect()
}

pub fn assert_no_forgotten_test_files(test_dir: &Path) {
    let runner_path = test_dir.join("runner.rs");
    let runner = fs::read_to_string(&runner_path).unwrap();
    let entries = fs::read_dir(test_dir).unwrap();
    for entry in entries {
        let path = entry.unwrap().path();
        if let Some(ext) = path.extension() {
            let name = path.file_stem().unwrap();
            if ext == "rs" && name != "runner" {
                let search = format!("mod {};", name.to_str().unwrap());
                assert!(
                    runner.contains(&search),
                    "missing `{search}` declaration in {}",
                    runner_path.display()
                );
            }
        }
    }
}
