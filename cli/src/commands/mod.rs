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

mod duplicate;

use clap::{Args as _, Command, CommandFactory as _, FromArgMatches as _};
use tracing::instrument;

use crate::cli_util::{Args, CommandHelper};
use crate::command_error::{internal_error, CommandError};
use crate::ui::Ui;

pub fn default_app() -> Command {
    duplicate::DuplicateArgs::augment_args(Args::command())
}

#[instrument(skip_all)]
pub fn run_command(ui: &mut Ui, command_helper: &CommandHelper) -> Result<(), CommandError> {
    let args = duplicate::DuplicateArgs::from_arg_matches(command_helper.matches())
        .map_err(internal_error)?;
    duplicate::cmd_duplicate(ui, command_helper, &args)
}
