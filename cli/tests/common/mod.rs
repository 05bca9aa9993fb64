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

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use tempfile::TempDir;

pub struct TestEnvironment {
    _temp_dir: TempDir,
    env_root: PathBuf,
    home_dir: PathBuf,
    config_path: PathBuf,
    env_vars: HashMap<String, String>,
    removed_env_vars: Vec<String>,
    config_file_number: RefCell<i64>,
}

impl Default for TestEnvironment {
    fn default() -> Self {
        testutils::hermetic_libgit2();

        let tmp_dir = testutils::new_temp_dir();
        let env_root = tmp_dir.path().canonicalize().unwrap();
        let home_dir = env_root.join("home");
        std::fs::create_dir(&home_dir).unwrap();
        let config_dir = env_root.join("config");
        std::fs::create_dir(&config_dir).unwrap();
        Self {
            _temp_dir: tmp_dir,
            env_root,
            home_dir,
            config_path: config_dir,
            env_vars: HashMap::new(),
            removed_env_vars: vec![],
            config_file_number: RefCell::new(0),
        }
    }
}

impl TestEnvironment {
    pub fn gitdup_cmd(&self, current_dir: &Path, args: &[&str]) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("git-duplicate").unwrap();
        cmd.current_dir(current_dir);
        cmd.args(args);
        cmd.env_clear();
        cmd.env("RUST_BACKTRACE", "1");
        cmd.env("HOME", self.home_dir.to_str().unwrap());
        cmd.env("GITDUP_CONFIG", self.config_path.to_str().unwrap());
        cmd.env("GITDUP_USER", "Test User");
        cmd.env("GITDUP_EMAIL", "test.user@example.com");
        cmd.env("GITDUP_TIMESTAMP", "2001-02-03T04:05:06+07:00");
        if cfg!(unix) {
            cmd.env("SSL_CERT_FILE", "/dev/null");
        }
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        for key in &self.removed_env_vars {
            cmd.env_remove(key);
        }
        cmd
    }

    /// Run `git-duplicate`, check that it was successful, and return its
    /// `(stdout, stderr)`.
    pub fn gitdup_cmd_ok(&self, current_dir: &Path, args: &[&str]) -> (String, String) {
        let assert = self.gitdup_cmd(current_dir, args).assert().success();
        let stdout = self.normalize_output(&get_stdout_string(&assert));
        let stderr = self.normalize_output(&get_stderr_string(&assert));
        (stdout, stderr)
    }

    /// Run `git-duplicate`, check that it was successful with empty stderr,
    /// and return its stdout
    #[track_caller]
    pub fn gitdup_cmd_success(&self, current_dir: &Path, args: &[&str]) -> String {
        let assert = self
            .gitdup_cmd(current_dir, args)
            .assert()
            .success()
            .stderr("");
        self.normalize_output(&get_stdout_string(&assert))
    }

    /// Run `git-duplicate`, check that it failed with `code` and printed
    /// nothing on stdout, and return its stderr
    #[must_use]
    pub fn gitdup_cmd_failure(&self, current_dir: &Path, args: &[&str], code: i32) -> String {
        let assert = self
            .gitdup_cmd(current_dir, args)
            .assert()
            .code(code)
            .stdout("");
        self.normalize_output(&get_stderr_string(&assert))
    }

    /// Run `git-duplicate` and check that it failed with code 2 (for invalid
    /// usage)
    #[must_use]
    pub fn gitdup_cmd_cli_error(&self, current_dir: &Path, args: &[&str]) -> String {
        self.gitdup_cmd_failure(current_dir, args, 2)
    }

    pub fn env_root(&self) -> &Path {
        &self.env_root
    }

    pub fn add_config(&self, content: &str) {
        // Concatenating two valid TOML files does not (generally) result in a valid
        // TOML file, so we create a new file every time instead.
        let mut config_file_number = self.config_file_number.borrow_mut();
        *config_file_number += 1;
        let config_file_number = *config_file_number;
        std::fs::write(
            self.config_path
                .join(format!("config{config_file_number:04}.toml")),
            content,
        )
        .unwrap();
    }

    pub fn add_env_var(&mut self, key: &str, val: &str) {
        self.env_vars.insert(key.to_string(), val.to_string());
    }

    /// Unsets one of the variables `gitdup_cmd()` sets by default.
    pub fn remove_env_var(&mut self, key: &str) {
        self.removed_env_vars.push(key.to_string());
    }

    pub fn normalize_output(&self, text: &str) -> String {
        let text = text.replace("git-duplicate.exe", "git-duplicate");
        let regex = Regex::new(&format!(
            r"{}(\S+)",
            regex::escape(&self.env_root.display().to_string())
        ))
        .unwrap();
        regex
            .replace_all(&text, |caps: &Captures| {
                format!("$TEST_ENV{}", caps[1].replace('\\', "/"))
            })
            .to_string()
    }
}

#[track_caller]
pub fn get_stdout_string(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stdout.clone()).unwrap()
}

#[track_caller]
pub fn get_stderr_string(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stderr.clone()).unwrap()
}

/// A small history in a fresh repository:
///
/// ```text
/// other: new_root [tree a]
/// main:  two [tree c] -> one [tree b] -> root [tree a]
/// ```
///
/// `HEAD` stays unborn. All commits are by "Git User".
pub struct LinearRepo {
    pub path: PathBuf,
    pub repo: git2::Repository,
    pub root: git2::Oid,
    pub one: git2::Oid,
    pub two: git2::Oid,
    pub new_root: git2::Oid,
}

impl LinearRepo {
    pub fn init(test_env: &TestEnvironment) -> Self {
        let path = test_env.env_root().join("repo");
        let repo = testutils::git_init(&path);
        let tree_a = testutils::git_tree(&repo, &[("file", "a\n")]);
        let tree_b = testutils::git_tree(&repo, &[("file", "b\n")]);
        let tree_c = testutils::git_tree(&repo, &[("file", "c\n"), ("other", "c\n")]);
        let root = testutils::git_commit(&repo, &[], tree_a, "root\n", 100);
        let one = testutils::git_commit(&repo, &[root], tree_b, "one\n", 200);
        let two = testutils::git_commit(&repo, &[one], tree_c, "two\n", 300);
        let new_root = testutils::git_commit(&repo, &[], tree_a, "new root\n", 400);
        testutils::git_set_branch(&repo, "main", two);
        testutils::git_set_branch(&repo, "other", new_root);
        LinearRepo {
            path,
            repo,
            root,
            one,
            two,
            new_root,
        }
    }

    /// Parses the tip printed by `git-duplicate`.
    pub fn parse_tip(&self, stdout: &str) -> git2::Oid {
        let hex = stdout
            .strip_suffix('\n')
            .unwrap_or_else(|| panic!("missing newline in {stdout:?}"));
        git2::Oid::from_str(hex).unwrap()
    }
}
