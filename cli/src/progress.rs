// Copyright 2023 The gitdup Authors
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

use std::io;
use std::time::{Duration, Instant};

use crossterm::terminal::{Clear, ClearType};

use crate::ui::{OutputGuard, ProgressOutput};

/// Rate-limited "Duplicating commits (k/n)" line on a terminal.
pub struct Progress {
    next_print: Instant,
    buffer: String,
    guard: Option<OutputGuard>,
}

impl Progress {
    pub fn new(now: Instant) -> Self {
        Self {
            next_print: now + INITIAL_DELAY,
            buffer: String::new(),
            guard: None,
        }
    }

    pub fn update<W: io::Write>(
        &mut self,
        now: Instant,
        processed: usize,
        total: usize,
        output: &mut ProgressOutput<W>,
    ) -> io::Result<()> {
        use std::fmt::Write as _;

        if processed >= total {
            return Self::clear(output);
        }
        if now < self.next_print {
            return Ok(());
        }
        self.next_print = now + Duration::from_secs(1) / UPDATE_HZ;
        if self.guard.is_none() {
            self.guard = Some(output.output_guard(crossterm::cursor::Show.to_string()));
            _ = write!(output, "{}", crossterm::cursor::Hide);
        }

        self.buffer.clear();
        write!(self.buffer, "\r").unwrap();
        let control_chars = self.buffer.len();
        let digits = total.to_string().len();
        write!(
            self.buffer,
            "Duplicating commits {processed: >digits$}/{total} "
        )
        .unwrap();
        let visible_chars = self.buffer.chars().count() - control_chars;
        let bar_width = output
            .term_width()
            .map(usize::from)
            .unwrap_or(0)
            .saturating_sub(visible_chars + 2);
        self.buffer.push('[');
        draw_progress(processed as f32 / total as f32, &mut self.buffer, bar_width);
        self.buffer.push(']');

        write!(self.buffer, "{}", Clear(ClearType::UntilNewLine)).unwrap();
        write!(output, "{}", self.buffer)?;
        output.flush()?;
        Ok(())
    }

    /// Erases the progress line, e.g. before printing something else to
    /// stderr.
    pub fn clear<W: io::Write>(output: &mut ProgressOutput<W>) -> io::Result<()> {
        write!(output, "\r{}", Clear(ClearType::CurrentLine))?;
        output.flush()
    }
}

fn draw_progress(progress: f32, buffer: &mut String, width: usize) {
    const CHARS: [char; 9] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];
    const RESOLUTION: usize = CHARS.len() - 1;
    let ticks = (width as f32 * progress.clamp(0.0, 1.0) * RESOLUTION as f32).round() as usize;
    let whole = ticks / RESOLUTION;
    for _ in 0..whole {
        buffer.push(CHARS[CHARS.len() - 1]);
    }
    if whole < width {
        let fraction = ticks % RESOLUTION;
        buffer.push(CHARS[fraction]);
    }
    for _ in (whole + 1)..width {
        buffer.push(CHARS[0]);
    }
}

const UPDATE_HZ: u32 = 30;
const INITIAL_DELAY: Duration = Duration::from_millis(250);
