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

use std::io::{self, Stderr, Write as _};
use std::time::Instant;

use gitdup_lib::duplicate::{duplicate_range, CommitterPolicy, DuplicateOptions, DuplicateProgress};
use gitdup_lib::history::{check_same_tree, read_range_by_id, resolve_boundary, Boundary};
use tracing::instrument;

use crate::cli_util::CommandHelper;
use crate::command_error::CommandError;
use crate::progress::Progress;
use crate::ui::{ProgressOutput, Ui};

/// Revisions are anything `git rev-parse` understands, e.g. `main~3`, a tag
/// or a full commit id.
#[derive(clap::Args, Clone, Debug)]
pub(crate) struct DuplicateArgs {
    /// The old base; neither it nor its ancestors are duplicated
    #[arg(value_name = "OLD_BASE")]
    pub(crate) old_base: String,
    /// The last commit of the range to duplicate
    #[arg(value_name = "TIP")]
    pub(crate) tip: String,
    /// The new root to graft the range onto
    ///
    /// It must have the same tree as OLD_BASE.
    #[arg(long, value_name = "REV", default_value = "HEAD")]
    pub(crate) onto: String,
    /// Point parents outside the range at the new root instead of sharing
    /// them with the original history
    #[arg(long)]
    pub(crate) isolate: bool,
    /// Keep the original committer instead of recording the current user
    #[arg(long)]
    pub(crate) keep_committer: bool,
    /// Read back every duplicate and check it against its original
    #[arg(long)]
    pub(crate) verify: bool,
    /// Print "<old> -> <new>" on stderr for every duplicated commit
    #[arg(long)]
    pub(crate) verbose: bool,
}

#[instrument(skip_all)]
pub(crate) fn cmd_duplicate(
    ui: &mut Ui,
    command: &CommandHelper,
    args: &DuplicateArgs,
) -> Result<(), CommandError> {
    let backend = command.backend();
    let base = resolve_boundary(backend, Boundary::Base, &args.old_base)?;
    let tip = resolve_boundary(backend, Boundary::Tip, &args.tip)?;
    let new_root = resolve_boundary(backend, Boundary::NewRoot, &args.onto)?;
    let range = read_range_by_id(backend, base, tip)?;
    check_same_tree(backend, range.base(), &new_root)?;

    let committer = if args.keep_committer {
        CommitterPolicy::KeepOriginal
    } else {
        CommitterPolicy::Override(command.settings().committer_signature())
    };
    let options = DuplicateOptions {
        new_root,
        isolate: args.isolate,
        committer,
        verify: args.verify,
    };

    let mut progress = ui
        .progress_output()
        .map(|output| (Progress::new(Instant::now()), output));
    let mut report_result = Ok(());
    let history = {
        let mut observer = |event: &DuplicateProgress| {
            if report_result.is_ok() {
                report_result = report_progress(ui, args.verbose, progress.as_mut(), event);
            }
        };
        duplicate_range(backend, range, options, Some(&mut observer))?
    };
    report_result?;

    let new_tip = history.new_tip()?;
    tracing::debug!(
        count = history.remap_table().len(),
        %new_tip,
        "duplicated range"
    );
    writeln!(ui.stdout(), "{new_tip}")?;
    Ok(())
}

fn report_progress(
    ui: &Ui,
    verbose: bool,
    mut progress: Option<&mut (Progress, ProgressOutput<Stderr>)>,
    event: &DuplicateProgress,
) -> io::Result<()> {
    if verbose {
        if let Some((_, output)) = progress.as_deref_mut() {
            Progress::clear(output)?;
        }
        writeln!(ui.stderr(), "{} -> {}", event.original, event.duplicate)?;
    }
    if let Some((progress, output)) = progress {
        progress.update(Instant::now(), event.processed, event.total, output)?;
    }
    Ok(())
}
