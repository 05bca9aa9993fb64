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

//! Errors reported by `git-duplicate`, and how they map to exit codes.
//!
//! | code | meaning                                      |
//! |------|----------------------------------------------|
//! | 0    | success                                      |
//! | 1    | nothing to duplicate (empty range)           |
//! | 2    | invalid command line                         |
//! | 3    | broken pipe                                  |
//! | 4    | a revision could not be resolved             |
//! | 5    | old base and new root have different trees   |
//! | 6    | reading or writing the repository failed     |
//! | 7    | configuration error                          |
//! | 8    | a duplicate failed verification              |
//! | 9    | the range contains a cycle                   |
//! | 10   | the tip was not duplicated                   |
//! | 255  | any other internal error                     |

use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;
use std::{error, io, iter};

use gitdup_lib::backend::{BackendError, BackendInitError};
use gitdup_lib::duplicate::{DuplicateError, IncompleteRangeError};
use gitdup_lib::history::{Boundary, RangeError, TreeMismatchError};
use gitdup_lib::settings::SettingsError;
use gitdup_lib::verify::VerificationError;
use thiserror::Error;

use crate::config::ConfigEnvError;
use crate::ui::Ui;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandErrorKind {
    /// The range is empty. Not a crash, but nothing was printed either.
    EmptyRange,
    /// Invalid command line. The inner error type may be `clap::Error`.
    Cli,
    BrokenPipe,
    Resolution,
    TreeMismatch,
    Store,
    Config,
    Verification,
    Cycle,
    IncompleteRange,
    Internal,
}

impl CommandErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            CommandErrorKind::EmptyRange => 1,
            CommandErrorKind::Cli => 2,
            CommandErrorKind::BrokenPipe => BROKEN_PIPE_EXIT_CODE,
            CommandErrorKind::Resolution => 4,
            CommandErrorKind::TreeMismatch => 5,
            CommandErrorKind::Store => 6,
            CommandErrorKind::Config => 7,
            CommandErrorKind::Verification => 8,
            CommandErrorKind::Cycle => 9,
            CommandErrorKind::IncompleteRange => 10,
            CommandErrorKind::Internal => 255,
        }
    }

    fn heading(self) -> &'static str {
        match self {
            CommandErrorKind::Config => "Config error: ",
            CommandErrorKind::Cycle
            | CommandErrorKind::IncompleteRange
            | CommandErrorKind::Internal => "Internal error: ",
            _ => "Error: ",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CommandError {
    pub kind: CommandErrorKind,
    pub error: Arc<dyn error::Error + Send + Sync>,
    pub hints: Vec<String>,
}

impl CommandError {
    pub fn new(
        kind: CommandErrorKind,
        err: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        CommandError {
            kind,
            error: Arc::from(err.into()),
            hints: vec![],
        }
    }

    pub fn with_message(
        kind: CommandErrorKind,
        message: impl Into<String>,
        source: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Self::new(kind, ErrorWithMessage::new(message, source))
    }

    /// Returns error with the given plain-text `hint` attached.
    pub fn hinted(mut self, hint: impl Into<String>) -> Self {
        self.add_hint(hint);
        self
    }

    /// Appends plain-text `hint` to the error.
    pub fn add_hint(&mut self, hint: impl Into<String>) {
        self.hints.push(hint.into());
    }
}

/// Wraps error with user-visible message.
#[derive(Debug, Error)]
#[error("{message}")]
struct ErrorWithMessage {
    message: String,
    source: Box<dyn error::Error + Send + Sync>,
}

impl ErrorWithMessage {
    fn new(
        message: impl Into<String>,
        source: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        ErrorWithMessage {
            message: message.into(),
            source: source.into(),
        }
    }
}

pub fn resolution_error(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> CommandError {
    CommandError::new(CommandErrorKind::Resolution, err)
}

pub fn config_error(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> CommandError {
    CommandError::new(CommandErrorKind::Config, err)
}

pub fn config_error_with_message(
    message: impl Into<String>,
    source: impl Into<Box<dyn error::Error + Send + Sync>>,
) -> CommandError {
    CommandError::with_message(CommandErrorKind::Config, message, source)
}

pub fn cli_error(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> CommandError {
    CommandError::new(CommandErrorKind::Cli, err)
}

pub fn store_error(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> CommandError {
    CommandError::new(CommandErrorKind::Store, err)
}

pub fn store_error_with_message(
    message: impl Into<String>,
    source: impl Into<Box<dyn error::Error + Send + Sync>>,
) -> CommandError {
    CommandError::with_message(CommandErrorKind::Store, message, source)
}

pub fn internal_error(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> CommandError {
    CommandError::new(CommandErrorKind::Internal, err)
}

pub fn internal_error_with_message(
    message: impl Into<String>,
    source: impl Into<Box<dyn error::Error + Send + Sync>>,
) -> CommandError {
    CommandError::with_message(CommandErrorKind::Internal, message, source)
}

impl From<io::Error> for CommandError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::BrokenPipe => CommandErrorKind::BrokenPipe,
            _ => CommandErrorKind::Internal,
        };
        CommandError::new(kind, err)
    }
}

impl From<clap::Error> for CommandError {
    fn from(err: clap::Error) -> Self {
        cli_error(err)
    }
}

impl From<config::ConfigError> for CommandError {
    fn from(err: config::ConfigError) -> Self {
        config_error(err)
    }
}

impl From<ConfigEnvError> for CommandError {
    fn from(err: ConfigEnvError) -> Self {
        config_error(err)
    }
}

impl From<SettingsError> for CommandError {
    fn from(err: SettingsError) -> Self {
        config_error(err)
    }
}

impl From<BackendError> for CommandError {
    fn from(err: BackendError) -> Self {
        store_error_with_message("Unexpected error from the repository", err)
    }
}

impl From<BackendInitError> for CommandError {
    fn from(err: BackendInitError) -> Self {
        store_error_with_message("Failed to open the repository", err)
    }
}

impl From<TreeMismatchError> for CommandError {
    fn from(err: TreeMismatchError) -> Self {
        CommandError::new(CommandErrorKind::TreeMismatch, err).hinted(
            "The new root must have the same tree as the old base. Use `--onto` to pick a \
             different new root.",
        )
    }
}

impl From<RangeError> for CommandError {
    fn from(err: RangeError) -> Self {
        match err {
            RangeError::BoundaryResolution { boundary, .. } => {
                let hint = match boundary {
                    Boundary::NewRoot => "The new root defaults to HEAD, which may be unborn.",
                    Boundary::Base | Boundary::Tip => {
                        "Any revision understood by `git rev-parse` can be used."
                    }
                };
                resolution_error(err).hinted(hint)
            }
            RangeError::Empty { .. } => CommandError::new(CommandErrorKind::EmptyRange, err),
            RangeError::TreeMismatch(err) => err.into(),
            RangeError::Backend(err) => err.into(),
        }
    }
}

impl From<VerificationError> for CommandError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::Mismatch { .. } => {
                CommandError::new(CommandErrorKind::Verification, err)
            }
            VerificationError::Backend(_) => store_error(err),
        }
    }
}

impl From<DuplicateError> for CommandError {
    fn from(err: DuplicateError) -> Self {
        match err {
            DuplicateError::Cycle(_) => CommandError::new(CommandErrorKind::Cycle, err),
            DuplicateError::Backend { .. } => store_error(err),
            DuplicateError::Verification(err) => err.into(),
            DuplicateError::ParentNotDuplicated { .. }
            | DuplicateError::AlreadyDuplicated { .. }
            | DuplicateError::InvalidState { .. } => internal_error(err),
        }
    }
}

impl From<IncompleteRangeError> for CommandError {
    fn from(err: IncompleteRangeError) -> Self {
        CommandError::new(CommandErrorKind::IncompleteRange, err)
    }
}

const BROKEN_PIPE_EXIT_CODE: u8 = 3;

pub(crate) fn handle_command_result(ui: &mut Ui, result: Result<(), CommandError>) -> ExitCode {
    try_handle_command_result(ui, result).unwrap_or_else(|_| ExitCode::from(BROKEN_PIPE_EXIT_CODE))
}

fn try_handle_command_result(
    ui: &mut Ui,
    result: Result<(), CommandError>,
) -> io::Result<ExitCode> {
    let Err(cmd_err) = &result else {
        return Ok(ExitCode::SUCCESS);
    };
    let err = &cmd_err.error;
    let hints = &cmd_err.hints;
    match cmd_err.kind {
        CommandErrorKind::Cli => {
            if let Some(err) = err.downcast_ref::<clap::Error>() {
                handle_clap_error(ui, err, hints)
            } else {
                print_error(ui, "Error: ", err.as_ref(), hints)?;
                Ok(ExitCode::from(CommandErrorKind::Cli.exit_code()))
            }
        }
        CommandErrorKind::BrokenPipe => {
            // A broken pipe is not an error, but a signal to exit gracefully.
            Ok(ExitCode::from(BROKEN_PIPE_EXIT_CODE))
        }
        kind => {
            print_error(ui, kind.heading(), err.as_ref(), hints)?;
            Ok(ExitCode::from(kind.exit_code()))
        }
    }
}

fn print_error(
    ui: &Ui,
    heading: &str,
    err: &(dyn error::Error + Send + Sync),
    hints: &[String],
) -> io::Result<()> {
    let mut stderr = ui.stderr();
    ui.write_heading(&mut stderr, heading)?;
    writeln!(stderr, "{err}")?;
    print_error_sources(ui, &mut stderr, err.source())?;
    print_error_hints(ui, &mut stderr, hints)?;
    Ok(())
}

fn print_error_sources(
    ui: &Ui,
    output: &mut impl io::Write,
    source: Option<&(dyn error::Error + 'static)>,
) -> io::Result<()> {
    let Some(err) = source else {
        return Ok(());
    };
    if err.source().is_none() {
        ui.write_heading(output, "Caused by: ")?;
        writeln!(output, "{err}")?;
    } else {
        ui.write_heading(output, "Caused by:")?;
        writeln!(output)?;
        for (i, err) in iter::successors(Some(err), |err| err.source()).enumerate() {
            ui.write_heading(output, &format!("{}: ", i + 1))?;
            writeln!(output, "{err}")?;
        }
    }
    Ok(())
}

fn print_error_hints(ui: &Ui, output: &mut impl io::Write, hints: &[String]) -> io::Result<()> {
    for hint in hints {
        ui.write_hint_heading(output, "Hint: ")?;
        writeln!(output, "{hint}")?;
    }
    Ok(())
}

fn handle_clap_error(ui: &mut Ui, err: &clap::Error, hints: &[String]) -> io::Result<ExitCode> {
    let clap_str = if ui.color() {
        err.render().ansi().to_string()
    } else {
        err.render().to_string()
    };
    // Definitions for exit codes and streams come from
    // https://github.com/clap-rs/clap/blob/master/src/error/mod.rs
    match err.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
            write!(ui.stdout(), "{clap_str}")?;
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }
    let mut stderr = ui.stderr();
    write!(stderr, "{clap_str}")?;
    print_error_hints(ui, &mut stderr, hints)?;
    Ok(ExitCode::from(CommandErrorKind::Cli.exit_code()))
}
