// Copyright 2022 The gitdup Authors
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
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum ConfigEnvError {
    #[error(transparent)]
    ConfigReadError(#[from] config::ConfigError),
    #[error(
        "Both {} and {} exist. Please consolidate your configs in one of them.",
        .0.display(),
        .1.display()
    )]
    AmbiguousSource(PathBuf, PathBuf),
}

// The struct exists so that we can mock certain global values in unit tests.
#[derive(Clone, Default, Debug)]
struct UnresolvedConfigEnv {
    config_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    gitdup_config: Option<String>,
}

impl UnresolvedConfigEnv {
    fn from_environment() -> Self {
        UnresolvedConfigEnv {
            config_dir: dirs::config_dir(),
            home_dir: dirs::home_dir(),
            gitdup_config: env::var("GITDUP_CONFIG").ok(),
        }
    }

    /// Picks the user config file. `$GITDUP_CONFIG` is used as is, even if
    /// it doesn't exist. The other two locations are only considered when
    /// present.
    fn resolve(self) -> Result<Option<PathBuf>, ConfigEnvError> {
        if let Some(path) = self.gitdup_config {
            return Ok(Some(PathBuf::from(path)));
        }
        let platform_config_path = self
            .config_dir
            .map(|config_dir| config_dir.join("gitdup").join("config.toml"))
            .filter(|path| path.exists());
        let home_config_path = self
            .home_dir
            .map(|home_dir| home_dir.join(".gitdup.toml"))
            .filter(|path| path.exists());
        match (platform_config_path, home_config_path) {
            (Some(platform_config_path), Some(home_config_path)) => Err(
                ConfigEnvError::AmbiguousSource(platform_config_path, home_config_path),
            ),
            (platform_config_path, home_config_path) => {
                Ok(platform_config_path.or(home_config_path))
            }
        }
    }
}

/// Values that the user config should be able to override: the identity from
/// the repository's git config, and `NO_COLOR`.
fn env_base(
    git_config: Option<&git2::Config>,
    var: &impl Fn(&str) -> Option<String>,
) -> Result<config::Config, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(git_config) = git_config {
        if let Ok(value) = git_config.get_string("user.name") {
            builder = builder.set_override("user.name", value)?;
        }
        if let Ok(value) = git_config.get_string("user.email") {
            builder = builder.set_override("user.email", value)?;
        }
    }
    if var("NO_COLOR").is_some() {
        // "User-level configuration files and per-instance command-line arguments
        // should override $NO_COLOR." https://no-color.org/
        builder = builder.set_override("ui.color", "never")?;
    }
    builder.build()
}

/// Environment variables that override config values. The `GITDUP_*`
/// variables win over git's own.
fn env_overrides(
    var: &impl Fn(&str) -> Option<String>,
) -> Result<config::Config, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(value) = var("GIT_COMMITTER_NAME") {
        builder = builder.set_override("user.name", value)?;
    }
    if let Some(value) = var("GIT_COMMITTER_EMAIL") {
        builder = builder.set_override("user.email", value)?;
    }
    if let Some(value) = var("GIT_COMMITTER_DATE") {
        let timestamp = parse_git_date(&value).ok_or_else(|| {
            config::ConfigError::Message(format!("Invalid GIT_COMMITTER_DATE {value:?}"))
        })?;
        builder = builder.set_override("user.timestamp", timestamp)?;
    }
    if let Some(value) = var("GITDUP_USER") {
        builder = builder.set_override("user.name", value)?;
    }
    if let Some(value) = var("GITDUP_EMAIL") {
        builder = builder.set_override("user.email", value)?;
    }
    if let Some(value) = var("GITDUP_TIMESTAMP") {
        builder = builder.set_override("user.timestamp", value)?;
    }
    builder.build()
}

/// Converts a git date to RFC 3339. Accepts RFC 3339, RFC 2822, and git's
/// internal `[@]<seconds> <+hhmm>` form.
fn parse_git_date(value: &str) -> Option<String> {
    let value = value.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Some(datetime.to_rfc3339());
    }
    if let Ok(datetime) = DateTime::parse_from_rfc2822(value) {
        return Some(datetime.to_rfc3339());
    }
    let (seconds, offset) = value.strip_prefix('@').unwrap_or(value).split_once(' ')?;
    let seconds: i64 = seconds.parse().ok()?;
    let (sign, digits) = if let Some(digits) = offset.strip_prefix('+') {
        (1, digits)
    } else {
        (-1, offset.strip_prefix('-')?)
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;
    let datetime = DateTime::from_timestamp(seconds, 0)?.with_timezone(&offset);
    Some(datetime.to_rfc3339())
}

fn config_files(config_path: &Path) -> Vec<PathBuf> {
    if !config_path.is_dir() {
        return vec![config_path.to_owned()];
    }
    let mut files = vec![];
    if let Ok(read_dir) = config_path.read_dir() {
        for dir_entry in read_dir.flatten() {
            let path = dir_entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

fn layered_config(
    git_config: Option<&git2::Config>,
    config_path: Option<&Path>,
    var: &impl Fn(&str) -> Option<String>,
) -> Result<config::Config, ConfigEnvError> {
    let mut config_builder = config::Config::builder().add_source(env_base(git_config, var)?);
    if let Some(config_path) = config_path {
        for file in config_files(config_path) {
            config_builder = config_builder.add_source(
                config::File::from(file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }
    }
    let config = config_builder.add_source(env_overrides(var)?).build()?;
    Ok(config)
}

/// Reads the layered configuration: git identity, then the user config file,
/// then environment overrides.
#[instrument(skip_all)]
pub fn read_config(git_config: Option<&git2::Config>) -> Result<config::Config, ConfigEnvError> {
    let config_path = UnresolvedConfigEnv::from_environment().resolve()?;
    tracing::debug!(?config_path, "reading user config");
    layered_config(git_config, config_path.as_deref(), &|name| env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use anyhow::anyhow;
    use assert_matches::assert_matches;

    use super::*;

    fn fake_env(vars: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        move |name: &str| vars.get(name).map(|value| value.to_string())
    }

    fn write_git_config(dir: &Path, text: &str) -> git2::Config {
        let path = dir.join("gitconfig");
        fs::write(&path, text).unwrap();
        git2::Config::open(&path).unwrap()
    }

    #[test]
    fn test_layers_precedence() {
        let tmp = testutils::new_temp_dir();
        let git_config = write_git_config(
            tmp.path(),
            "[user]\n\tname = Git Name\n\temail = git@example.com\n",
        );
        let user_config = tmp.path().join("config.toml");
        fs::write(&user_config, "user.email = \"file@example.com\"\n").unwrap();
        let var = fake_env(&[("GITDUP_TIMESTAMP", "2001-02-03T04:05:06+07:00")]);

        let config = layered_config(Some(&git_config), Some(&user_config), &var).unwrap();
        assert_eq!(config.get_string("user.name").unwrap(), "Git Name");
        assert_eq!(config.get_string("user.email").unwrap(), "file@example.com");
        assert_eq!(
            config.get_string("user.timestamp").unwrap(),
            "2001-02-03T04:05:06+07:00"
        );
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let tmp = testutils::new_temp_dir();
        let user_config = tmp.path().join("config.toml");
        fs::write(&user_config, "user.name = \"From File\"\n").unwrap();

        let var = fake_env(&[("GIT_COMMITTER_NAME", "Git Committer")]);
        let config = layered_config(None, Some(&user_config), &var).unwrap();
        assert_eq!(config.get_string("user.name").unwrap(), "Git Committer");

        let var = fake_env(&[
            ("GIT_COMMITTER_NAME", "Git Committer"),
            ("GITDUP_USER", "Dup User"),
        ]);
        let config = layered_config(None, Some(&user_config), &var).unwrap();
        assert_eq!(config.get_string("user.name").unwrap(), "Dup User");
    }

    #[test]
    fn test_parse_git_date() {
        assert_eq!(
            parse_git_date("2001-02-03T04:05:06+07:00").as_deref(),
            Some("2001-02-03T04:05:06+07:00")
        );
        assert_eq!(
            parse_git_date("Sat, 3 Feb 2001 04:05:06 +0700").as_deref(),
            Some("2001-02-03T04:05:06+07:00")
        );
        assert_eq!(
            parse_git_date("@981147906 +0700").as_deref(),
            Some("2001-02-03T04:05:06+07:00")
        );
        assert_eq!(
            parse_git_date("981147906 -0130").as_deref(),
            Some("2001-02-02T19:35:06-01:30")
        );
        assert_eq!(parse_git_date("yesterday"), None);
        assert_eq!(parse_git_date("981147906 0700"), None);
        assert_eq!(parse_git_date("981147906 +07"), None);
    }

    #[test]
    fn test_committer_date_env() {
        let var = fake_env(&[("GIT_COMMITTER_DATE", "@981147906 +0700")]);
        let config = layered_config(None, None, &var).unwrap();
        assert_eq!(
            config.get_string("user.timestamp").unwrap(),
            "2001-02-03T04:05:06+07:00"
        );

        let var = fake_env(&[
            ("GIT_COMMITTER_DATE", "@981147906 +0700"),
            ("GITDUP_TIMESTAMP", "2020-01-01T00:00:00+00:00"),
        ]);
        let config = layered_config(None, None, &var).unwrap();
        assert_eq!(
            config.get_string("user.timestamp").unwrap(),
            "2020-01-01T00:00:00+00:00"
        );

        let var = fake_env(&[("GIT_COMMITTER_DATE", "yesterday")]);
        assert_matches!(
            layered_config(None, None, &var),
            Err(ConfigEnvError::ConfigReadError(config::ConfigError::Message(_)))
        );
    }

    #[test]
    fn test_no_color_is_overridden_by_file() {
        let tmp = testutils::new_temp_dir();
        let var = fake_env(&[("NO_COLOR", "1")]);
        let config = layered_config(None, None, &var).unwrap();
        assert_eq!(config.get_string("ui.color").unwrap(), "never");

        let user_config = tmp.path().join("config.toml");
        fs::write(&user_config, "ui.color = \"always\"\n").unwrap();
        let config = layered_config(None, Some(&user_config), &var).unwrap();
        assert_eq!(config.get_string("ui.color").unwrap(), "always");
    }

    #[test]
    fn test_config_directory_files_in_order() {
        let tmp = testutils::new_temp_dir();
        let dir = tmp.path().join("conf.d");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("b.toml"), "user.name = \"Second\"\n").unwrap();
        fs::write(dir.join("a.toml"), "user.name = \"First\"\nui.color = \"never\"\n").unwrap();

        let config = layered_config(None, Some(&dir), &fake_env(&[])).unwrap();
        assert_eq!(config.get_string("user.name").unwrap(), "Second");
        assert_eq!(config.get_string("ui.color").unwrap(), "never");
    }

    #[test]
    fn test_invalid_toml() {
        let tmp = testutils::new_temp_dir();
        let user_config = tmp.path().join("config.toml");
        fs::write(&user_config, "user.name = \n").unwrap();
        assert_matches!(
            layered_config(None, Some(&user_config), &fake_env(&[])),
            Err(ConfigEnvError::ConfigReadError(_))
        );
    }

    #[test]
    fn test_config_path_home_dir_existing() -> anyhow::Result<()> {
        TestCase {
            files: vec!["home/.gitdup.toml"],
            env: UnresolvedConfigEnv {
                home_dir: Some("home".into()),
                ..Default::default()
            },
            want: Some("home/.gitdup.toml"),
        }
        .run()
    }

    #[test]
    fn test_config_path_home_dir_missing() -> anyhow::Result<()> {
        TestCase {
            files: vec![],
            env: UnresolvedConfigEnv {
                home_dir: Some("home".into()),
                ..Default::default()
            },
            want: None,
        }
        .run()
    }

    #[test]
    fn test_config_path_config_dir_existing() -> anyhow::Result<()> {
        TestCase {
            files: vec!["config/gitdup/config.toml"],
            env: UnresolvedConfigEnv {
                config_dir: Some("config".into()),
                ..Default::default()
            },
            want: Some("config/gitdup/config.toml"),
        }
        .run()
    }

    #[test]
    fn test_config_path_gitdup_config_existing() -> anyhow::Result<()> {
        TestCase {
            files: vec!["custom.toml", "home/.gitdup.toml"],
            env: UnresolvedConfigEnv {
                home_dir: Some("home".into()),
                gitdup_config: Some("custom.toml".into()),
                ..Default::default()
            },
            want: Some("custom.toml"),
        }
        .run()
    }

    #[test]
    fn test_config_path_gitdup_config_missing() -> anyhow::Result<()> {
        TestCase {
            files: vec![],
            env: UnresolvedConfigEnv {
                gitdup_config: Some("custom.toml".into()),
                ..Default::default()
            },
            want: Some("custom.toml"),
        }
        .run()
    }

    #[test]
    fn test_config_path_pick_home_dir() -> anyhow::Result<()> {
        TestCase {
            files: vec!["home/.gitdup.toml"],
            env: UnresolvedConfigEnv {
                home_dir: Some("home".into()),
                config_dir: Some("config".into()),
                ..Default::default()
            },
            want: Some("home/.gitdup.toml"),
        }
        .run()
    }

    #[test]
    fn test_config_path_none() -> anyhow::Result<()> {
        TestCase {
            files: vec![],
            env: Default::default(),
            want: None,
        }
        .run()
    }

    #[test]
    fn test_config_path_ambiguous() -> anyhow::Result<()> {
        let tmp = setup_config_fs(&["home/.gitdup.toml", "config/gitdup/config.toml"])?;
        let env = UnresolvedConfigEnv {
            home_dir: Some(tmp.path().join("home")),
            config_dir: Some(tmp.path().join("config")),
            ..Default::default()
        };
        assert_matches!(env.resolve(), Err(ConfigEnvError::AmbiguousSource(_, _)));
        Ok(())
    }

    fn setup_config_fs(files: &[&'static str]) -> anyhow::Result<tempfile::TempDir> {
        let tmp = testutils::new_temp_dir();
        for file in files {
            let path = tmp.path().join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::File::create(path)?;
        }
        Ok(tmp)
    }

    struct TestCase {
        files: Vec<&'static str>,
        env: UnresolvedConfigEnv,
        want: Option<&'static str>,
    }

    impl TestCase {
        fn run(&self) -> anyhow::Result<()> {
            let tmp = setup_config_fs(&self.files)?;
            let root = tmp.path();
            let env = UnresolvedConfigEnv {
                config_dir: self.env.config_dir.as_ref().map(|p| root.join(p)),
                home_dir: self.env.home_dir.as_ref().map(|p| root.join(p)),
                gitdup_config: self
                    .env
                    .gitdup_config
                    .as_ref()
                    .map(|p| root.join(p).to_str().unwrap().to_string()),
            };
            let want = self.want.map(|p| root.join(p));
            let got = env.resolve().map_err(|e| anyhow!("resolve: {e}"))?;
            if got != want {
                return Err(anyhow!("config path: got {got:?}, want {want:?}"));
            }
            Ok(())
        }
    }
}
