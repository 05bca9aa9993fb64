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

use std::env::{self, ArgsOs};
use std::fmt::Debug;
use std::path::Path;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::SystemTime;

use clap::{ArgMatches, Command, FromArgMatches as _};
use gitdup_lib::git_backend::GitBackend;
use gitdup_lib::settings::UserSettings;
use tracing::instrument;
use tracing_chrome::ChromeLayerBuilder;
use tracing_subscriber::prelude::*;

use crate::command_error::{
    cli_error, handle_command_result, internal_error, internal_error_with_message, CommandError,
};
use crate::config::read_config;
use crate::ui::{ProgressChoice, Ui};

#[derive(Clone)]
struct ChromeTracingFlushGuard {
    _inner: Option<Rc<tracing_chrome::FlushGuard>>,
}

impl Debug for ChromeTracingFlushGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self { _inner } = self;
        f.debug_struct("ChromeTracingFlushGuard").finish_non_exhaustive()
    }
}

/// Handle to initialize or change tracing subscription.
#[derive(Clone, Debug)]
pub struct TracingSubscription {
    reload_log_filter: tracing_subscriber::reload::Handle<
        tracing_subscriber::EnvFilter,
        tracing_subscriber::Registry,
    >,
    _chrome_tracing_flush_guard: ChromeTracingFlushGuard,
}

impl TracingSubscription {
    /// Initializes tracing with the default configuration. This should be
    /// called as early as possible.
    pub fn init() -> Self {
        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(tracing::metadata::LevelFilter::ERROR.into())
            .from_env_lossy();
        let (filter, reload_log_filter) = tracing_subscriber::reload::Layer::new(filter);

        let (chrome_tracing_layer, chrome_tracing_flush_guard) =
            match env::var("GITDUP_TRACE") {
                Ok(filename) => {
                    let filename = if filename.is_empty() {
                        format!(
                            "gitdup-trace-{}.json",
                            SystemTime::now()
                                .duration_since(SystemTime::UNIX_EPOCH)
                                .map(|elapsed| elapsed.as_secs())
                                .unwrap_or_default(),
                        )
                    } else {
                        filename
                    };
                    let include_args = env::var("GITDUP_TRACE_INCLUDE_ARGS").is_ok();
                    let (layer, guard) = ChromeLayerBuilder::new()
                        .file(filename)
                        .include_args(include_args)
                        .build();
                    (
                        Some(layer),
                        ChromeTracingFlushGuard {
                            _inner: Some(Rc::new(guard)),
                        },
                    )
                }
                Err(_) => (None, ChromeTracingFlushGuard { _inner: None }),
            };

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::Layer::default()
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .with(chrome_tracing_layer)
            .init();
        TracingSubscription {
            reload_log_filter,
            _chrome_tracing_flush_guard: chrome_tracing_flush_guard,
        }
    }

    pub fn enable_debug_logging(&self) -> Result<(), CommandError> {
        self.reload_log_filter
            .modify(|filter| {
                *filter = tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::metadata::LevelFilter::DEBUG.into())
                    .from_env_lossy();
            })
            .map_err(|err| internal_error_with_message("failed to enable debug logging", err))?;
        tracing::info!("debug logging enabled");
        Ok(())
    }
}

/// Everything a command needs: parsed arguments, settings and the opened
/// repository.
pub struct CommandHelper {
    matches: ArgMatches,
    settings: UserSettings,
    backend: GitBackend,
}

impl CommandHelper {
    pub fn matches(&self) -> &ArgMatches {
        &self.matches
    }

    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    pub fn backend(&self) -> &GitBackend {
        &self.backend
    }
}

/// Duplicate a range of commits onto a new root with an identical tree
///
/// Every commit in OLD_BASE..TIP is copied onto the new root, keeping its
/// tree, author and message, so the history is reproduced without a merge.
/// The id of the new tip is printed on stdout. No reference is moved.
#[derive(clap::Parser, Clone, Debug)]
#[command(name = "git-duplicate")]
pub struct Args {
    #[command(flatten)]
    pub global_args: GlobalArgs,
}

#[derive(clap::Args, Clone, Debug)]
#[command(next_help_heading = "Global Options")]
pub struct GlobalArgs {
    /// Path to the git repository to operate on
    ///
    /// By default, the repository containing the current directory is used.
    #[arg(long, short = 'R', global = true, value_hint = clap::ValueHint::DirPath)]
    pub repository: Option<String>,
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
    /// Show a progress bar on stderr
    ///
    /// By default, progress is shown when stderr is a terminal and
    /// `ui.progress-indicator` is not disabled.
    #[arg(long, global = true, overrides_with = "no_progress")]
    pub progress: bool,
    /// Never show a progress bar
    #[arg(long, global = true, overrides_with = "progress")]
    pub no_progress: bool,
}

impl GlobalArgs {
    pub fn progress_choice(&self) -> ProgressChoice {
        if self.progress {
            ProgressChoice::Always
        } else if self.no_progress {
            ProgressChoice::Never
        } else {
            ProgressChoice::Auto
        }
    }
}

fn string_args(args_os: ArgsOs) -> Result<Vec<String>, CommandError> {
    args_os
        .map(|arg_os| {
            arg_os
                .into_string()
                .map_err(|_| cli_error("Non-utf8 argument"))
        })
        .collect()
}

fn load_backend(cwd: &Path, repository: Option<&str>) -> Result<GitBackend, CommandError> {
    let backend = match repository {
        // Invalid -R path is an error. No search through parent directories.
        Some(path) => GitBackend::open(&cwd.join(path))?,
        None => GitBackend::discover(cwd)?,
    };
    Ok(backend)
}

/// Builder and runner of the `git-duplicate` command.
pub struct CliRunner {
    tracing_subscription: TracingSubscription,
    app: Command,
}

impl CliRunner {
    /// Initializes CLI environment and returns a builder. This should be called
    /// as early as possible.
    pub fn init() -> Self {
        let tracing_subscription = TracingSubscription::init();
        CliRunner {
            tracing_subscription,
            app: crate::commands::default_app(),
        }
    }

    /// Set the version to be displayed by `--version`.
    pub fn version(mut self, version: &str) -> Self {
        self.app = self.app.version(version.to_string());
        self
    }

    #[instrument(skip_all)]
    fn run_internal(self, ui: &mut Ui) -> Result<(), CommandError> {
        let cwd = env::current_dir().map_err(|err| {
            internal_error_with_message("Could not determine current directory", err)
        })?;
        let string_args = string_args(env::args_os())?;
        let matches = self.app.clone().try_get_matches_from(&string_args)?;
        let args = Args::from_arg_matches(&matches).map_err(internal_error)?;
        if args.global_args.debug {
            // TODO: set up debug logging as early as possible
            self.tracing_subscription.enable_debug_logging()?;
        }

        let backend = load_backend(&cwd, args.global_args.repository.as_deref())?;
        let config = {
            let git_repo = backend.git_repo();
            // A broken git config only costs us the identity fallback.
            let git_config = git_repo.config().ok();
            read_config(git_config.as_ref())?
        };
        let settings = UserSettings::from_config(config)?;
        ui.reset(&settings, args.global_args.progress_choice())?;

        let command_helper = CommandHelper {
            matches,
            settings,
            backend,
        };
        crate::commands::run_command(ui, &command_helper)
    }

    #[must_use]
    #[instrument(skip(self))]
    pub fn run(self) -> ExitCode {
        let mut ui = Ui::null();
        let result = self.run_internal(&mut ui);
        handle_command_result(&mut ui, result)
    }
}
