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

use std::io::{self, IsTerminal as _, Stderr, StderrLock, StdoutLock, Write};
use std::str::FromStr;
use std::{env, fmt};

use crossterm::style::Stylize as _;
use gitdup_lib::settings::UserSettings;
use tracing::instrument;

use crate::command_error::{config_error_with_message, CommandError};

/// Terminal output of the command: the new tip on stdout, everything else on
/// stderr.
pub struct Ui {
    color: bool,
    progress_indicator: bool,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ColorChoice {
    Always,
    Never,
    #[default]
    Auto,
}

impl FromStr for ColorChoice {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            "auto" => Ok(ColorChoice::Auto),
            _ => Err("must be one of always, never, or auto"),
        }
    }
}

impl fmt::Display for ColorChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColorChoice::Always => "always",
            ColorChoice::Never => "never",
            ColorChoice::Auto => "auto",
        };
        write!(f, "{s}")
    }
}

fn color_setting(settings: &UserSettings) -> Result<ColorChoice, CommandError> {
    match settings.config().get_string("ui.color") {
        Ok(value) => value
            .parse()
            .map_err(|err| config_error_with_message("Invalid `ui.color`", err)),
        Err(config::ConfigError::NotFound(_)) => Ok(ColorChoice::default()),
        Err(err) => Err(err.into()),
    }
}

fn use_color(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => io::stderr().is_terminal(),
    }
}

/// Whether progress should be shown, given `--progress`/`--no-progress`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ProgressChoice {
    Always,
    Never,
    /// Follow `ui.progress-indicator`, and only on a terminal.
    #[default]
    Auto,
}

impl Ui {
    /// Output with no configuration applied yet, for errors that happen
    /// before the config is loaded.
    pub fn null() -> Ui {
        Ui {
            color: use_color(ColorChoice::Auto),
            progress_indicator: false,
        }
    }

    /// Reconfigures the output from the loaded settings.
    pub fn reset(
        &mut self,
        settings: &UserSettings,
        progress: ProgressChoice,
    ) -> Result<(), CommandError> {
        self.color = use_color(color_setting(settings)?);
        self.progress_indicator = match progress {
            ProgressChoice::Always => true,
            ProgressChoice::Never => false,
            ProgressChoice::Auto => settings.progress_indicator() && io::stderr().is_terminal(),
        };
        Ok(())
    }

    pub fn color(&self) -> bool {
        self.color
    }

    pub fn stdout(&self) -> StdoutLock<'static> {
        io::stdout().lock()
    }

    pub fn stderr(&self) -> StderrLock<'static> {
        io::stderr().lock()
    }

    pub fn use_progress_indicator(&self) -> bool {
        self.progress_indicator
    }

    pub fn progress_output(&self) -> Option<ProgressOutput<Stderr>> {
        self.use_progress_indicator().then(|| ProgressOutput {
            output: io::stderr(),
            term_width: None,
        })
    }

    /// Writes an error heading such as "Error: ", in bold red if colors are
    /// enabled.
    pub fn write_heading(&self, output: &mut impl Write, heading: &str) -> io::Result<()> {
        if self.color {
            write!(output, "{}", heading.bold().red())
        } else {
            write!(output, "{heading}")
        }
    }

    pub fn write_hint_heading(&self, output: &mut impl Write, heading: &str) -> io::Result<()> {
        if self.color {
            write!(output, "{}", heading.bold().cyan())
        } else {
            write!(output, "{heading}")
        }
    }
}

/// Where the progress line is drawn. Generic so tests can capture it.
#[derive(Debug)]
pub struct ProgressOutput<W> {
    output: W,
    term_width: Option<u16>,
}

impl<W: Write> ProgressOutput<W> {
    pub fn for_test(output: W, term_width: u16) -> Self {
        ProgressOutput {
            output,
            term_width: Some(term_width),
        }
    }

    pub fn write_fmt(&mut self, fmt: fmt::Arguments<'_>) -> io::Result<()> {
        self.output.write_fmt(fmt)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }

    pub fn term_width(&self) -> Option<u16> {
        // Terminal can be resized while progress is displayed, so don't cache it.
        self.term_width.or_else(term_width)
    }

    /// Construct a guard object which writes `text` to stderr when dropped.
    /// Useful for restoring terminal state.
    pub fn output_guard(&self, text: String) -> OutputGuard {
        OutputGuard {
            text,
            output: io::stderr(),
        }
    }
}

pub struct OutputGuard {
    text: String,
    output: Stderr,
}

impl Drop for OutputGuard {
    #[instrument(skip_all)]
    fn drop(&mut self) {
        _ = self.output.write_all(self.text.as_bytes());
        _ = self.output.flush();
    }
}

fn term_width() -> Option<u16> {
    if let Some(cols) = env::var("COLUMNS").ok().and_then(|s| s.parse().ok()) {
        Some(cols)
    } else {
        crossterm::terminal::size().ok().map(|(cols, _)| cols)
    }
}
